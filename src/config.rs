//! Node configuration
//!
//! Settings come from an optional YAML file overridden by command-line
//! flags and environment variables.

use crate::error::{Error, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(name = "blockforge", about = "Proof-of-work validating node", version)]
pub struct Args {
    /// Configuration file path (YAML)
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address the peer API listens on
    #[clap(short, long, env = "BLOCKFORGE_LISTEN")]
    pub listen: Option<String>,

    /// URL peers use to reach this node (defaults to the listen address)
    #[clap(long, env = "BLOCKFORGE_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Peer to connect to at startup (repeatable)
    #[clap(short, long = "peer", value_name = "URL")]
    pub peers: Vec<String>,

    /// Mine blocks
    #[clap(short, long)]
    pub mine: bool,

    /// Password the mining reward address is derived from
    #[clap(long, env = "BLOCKFORGE_MINER_PASSWORD")]
    pub miner_password: Option<String>,

    /// Number of mining threads (0 = one per CPU)
    #[clap(short, long)]
    pub threads: Option<usize>,

    /// Peer request timeout (e.g. "10s")
    #[clap(long, value_parser = humantime::parse_duration)]
    pub peer_timeout: Option<Duration>,

    /// Log level
    #[clap(long, default_value = "info")]
    pub log_level: String,

    /// Log format (plain, json)
    #[clap(long, default_value = "plain")]
    pub log_format: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Node identity and listen address
    #[serde(default)]
    pub node: NodeConfig,

    /// Mining settings
    #[serde(default)]
    pub mining: MiningConfig,

    /// Peer network settings
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity and listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Address the peer API listens on
    #[serde(default = "default_listen")]
    pub listen: String,

    /// URL peers use to reach this node
    pub public_url: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_url: None,
        }
    }
}

/// Mining settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MiningConfig {
    /// Whether the node mines
    #[serde(default)]
    pub enabled: bool,

    /// Password the reward address is derived from
    pub password: Option<String>,

    /// Worker threads (0 = one per CPU)
    #[serde(default)]
    pub threads: usize,
}

/// Peer network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Peers to connect to at startup
    #[serde(default)]
    pub peers: Vec<String>,

    /// Peer request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peers: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (plain, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "plain".to_string()
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::config(format!("cannot parse {}: {}", path.display(), e)))
    }

    /// Build the effective configuration: the file (when given) with
    /// command-line flags layered on top
    pub fn from_args(args: Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(listen) = args.listen {
            config.node.listen = listen;
        }
        if let Some(public_url) = args.public_url {
            config.node.public_url = Some(public_url);
        }
        if !args.peers.is_empty() {
            config.network.peers.extend(args.peers);
        }
        if args.mine {
            config.mining.enabled = true;
        }
        if let Some(password) = args.miner_password {
            config.mining.password = Some(password);
        }
        if let Some(threads) = args.threads {
            config.mining.threads = threads;
        }
        if let Some(timeout) = args.peer_timeout {
            config.network.timeout_secs = timeout.as_secs().max(1);
        }
        config.logging.level = args.log_level;
        config.logging.format = args.log_format;

        config.validate()?;
        Ok(config)
    }

    /// The URL peers reach this node at
    pub fn public_url(&self) -> String {
        match &self.node.public_url {
            Some(url) => url.clone(),
            None => format!("http://{}/", self.node.listen),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.mining.enabled && self.mining.password.is_none() {
            return Err(Error::config(
                "mining requires a reward address password (--miner-password)",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_args() -> Args {
        Args::parse_from(["blockforge"])
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_args(base_args()).unwrap();
        assert_eq!(config.node.listen, "127.0.0.1:8080");
        assert_eq!(config.network.timeout_secs, 10);
        assert!(!config.mining.enabled);
        assert_eq!(config.public_url(), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::parse_from([
            "blockforge",
            "--listen",
            "0.0.0.0:9000",
            "--peer",
            "http://a:1/",
            "--peer",
            "http://b:2/",
            "--mine",
            "--miner-password",
            "secret",
            "--threads",
            "4",
            "--peer-timeout",
            "30s",
        ]);
        let config = Config::from_args(args).unwrap();
        assert_eq!(config.node.listen, "0.0.0.0:9000");
        assert_eq!(config.network.peers.len(), 2);
        assert!(config.mining.enabled);
        assert_eq!(config.mining.threads, 4);
        assert_eq!(config.network.timeout_secs, 30);
    }

    #[test]
    fn test_mining_requires_password() {
        let args = Args::parse_from(["blockforge", "--mine"]);
        assert!(Config::from_args(args).is_err());
    }

    #[test]
    fn test_file_merged_under_flags() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "node:\n  listen: 10.0.0.1:7000\nnetwork:\n  peers:\n    - http://seed:1/\n  timeout_secs: 5\n"
        )
        .unwrap();

        let mut args = base_args();
        args.config = Some(file.path().to_path_buf());
        args.listen = Some("127.0.0.1:7001".to_string());
        let config = Config::from_args(args).unwrap();

        // The flag wins, file-only values survive.
        assert_eq!(config.node.listen, "127.0.0.1:7001");
        assert_eq!(config.network.peers, vec!["http://seed:1/".to_string()]);
        assert_eq!(config.network.timeout_secs, 5);
    }
}

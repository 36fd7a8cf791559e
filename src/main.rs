//! blockforge node
//!
//! Bootstrap: parse configuration, wire the components, serve the peer
//! API, reconcile against the configured peers, and start mining.

use anyhow::Context;
use blockforge::chain::ChainData;
use blockforge::config::{Args, Config};
use blockforge::core::Address;
use blockforge::crypto::Cryptography;
use blockforge::engine::Engine;
use blockforge::feedback::TracingFeedback;
use blockforge::miner::MinerFactory;
use blockforge::network::api::{self, ApiState};
use blockforge::network::{HttpClientFactory, P2PNetwork};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = Config::from_args(args).context("invalid configuration")?;

    init_logging(&config.logging.level, &config.logging.format);
    info!(version = blockforge::VERSION, "starting blockforge node");

    let crypto = Cryptography::new();
    let feedback = Arc::new(TracingFeedback);

    let chain = Arc::new(Mutex::new(ChainData::new(crypto, feedback.clone())));
    let factory = MinerFactory::new(crypto, feedback.clone());
    let client_factory = Arc::new(HttpClientFactory::new(Duration::from_secs(
        config.network.timeout_secs,
    )));
    let network = P2PNetwork::new(config.public_url(), client_factory, feedback.clone());
    let engine = Arc::new(Engine::new(
        chain,
        network.clone(),
        factory,
        crypto,
        feedback.clone(),
        feedback.clone(),
        feedback.clone(),
    ));

    // Peer API.
    let state = ApiState {
        engine: engine.clone(),
        network: network.clone(),
    };
    let listener = tokio::net::TcpListener::bind(&config.node.listen)
        .await
        .with_context(|| format!("cannot listen on {}", config.node.listen))?;
    info!(listen = %config.node.listen, public_url = %config.public_url(), "peer API up");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api::router(state)).await {
            error!(error = %e, "peer API server failed");
        }
    });

    // Join the network and catch up before mining anything.
    for peer in &config.network.peers {
        match network.connect(peer).await {
            Ok(connected) => info!(%peer, count = connected.len(), "connected"),
            Err(e) => warn!(%peer, error = %e, "initial peer connection failed"),
        }
    }
    if network.peer_count() > 0 {
        if let Err(e) = engine.sync_chain().await {
            warn!(error = %e, "initial chain sync failed");
        }
    }
    engine
        .ensure_genesis()
        .await
        .context("cannot establish genesis block")?;

    if config.mining.enabled {
        let password = config
            .mining
            .password
            .as_deref()
            .context("mining enabled without a password")?;
        let address = Address::from_password(password);
        info!(%address, threads = config.mining.threads, "mining enabled");
        engine
            .clone()
            .start_mining(address, config.mining.threads)
            .await;
    }

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    info!("shutting down");
    engine.stop_mining().await;

    Ok(())
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

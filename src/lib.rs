//! # blockforge
//!
//! The validating node core of a proof-of-work ledger. The node mines
//! blocks by parallel hash search against an adaptively-retargeted
//! difficulty, validates incoming blocks and transactions against
//! deterministic chain rules, and reconciles local chain state against
//! multiple untrusted peers when it falls behind.
//!
//! ## Architecture
//!
//! - [`core`] holds the value types: 256-bit hashes, the compact
//!   `(offset, fraction)` difficulty-target encoding, blocks,
//!   transactions, and the deterministic hashing pre-image layout.
//! - [`miner`] runs the parallel nonce search with a rescalable worker
//!   pool and cooperative cancellation.
//! - [`chain`] owns the append-only chain and the validation state
//!   machine deciding between acceptance, rejection, and resync.
//! - [`sync`] reconciles against peers: corroborated best-chain
//!   selection followed by gap-filling page retrieval.
//! - [`network`] keeps the peer registry and speaks the peer HTTP
//!   protocol on both sides.
//! - [`engine`] wires it all together and drives the mining loop.

#![warn(
    missing_docs,
    rust_2018_idioms,
    unused_lifetimes,
    unused_qualifications,
    clippy::all
)]
#![forbid(unsafe_code)]

pub mod chain;
pub mod config;
pub mod core;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod miner;
pub mod network;
pub mod rules;
pub mod sync;

pub use crate::error::{Error, Result};
pub use chain::{ChainData, ValidationOutcome};
pub use config::Config;
pub use core::{Address, BlockHashed, Hash, HashBits};
pub use engine::Engine;
pub use miner::{Miner, MinerFactory};
pub use network::P2PNetwork;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! # Coubcore - a small replicated proof-of-work ledger
//!
//! A node keeps an append-only chain of blocks on disk, mines new blocks
//! against a retargeting difficulty, and replicates with its peers over TCP.
//!
//! ## Layout
//! - `core/`: blocks, payloads, the ledger, proof-of-work and difficulty
//! - `storage/`: the Sled-backed block store
//! - `network/`: framed JSON messages, peer connections, replication server
//! - `config/`: node settings from TOML and the environment
//! - `utils/`: hashing, timestamps and encoding helpers
//! - `cli/`: command-line parsing for the node binary
//!
//! ## Where to start
//! 1. `core/ledger.rs` for how the chain is stored, validated and replaced
//! 2. `core/proof_of_work.rs` for mining and cancellation
//! 3. `network/server.rs` for how peers register and what each message does

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, GLOBAL_CONFIG};
pub use core::{
    validate_chain, Block, BlockPayload, CancelToken, DifficultyAdjustment, Ledger, ProofOfWork,
    Transaction, TxInput, TxOutput,
};
pub use error::{BlockchainError, Result};
pub use network::{Message, MessageType, Peer, Server, ServerConfig};
pub use storage::BlockStore;
pub use utils::{current_timestamp, sha256_digest, sha256_hex};

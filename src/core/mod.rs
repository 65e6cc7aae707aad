//! Core ledger functionality
//!
//! Blocks and their payloads, the ledger itself, proof-of-work mining
//! with per-block difficulty retargeting, and the transaction shape.

pub mod block;
pub mod difficulty;
pub mod ledger;
pub mod payload;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, GENESIS_DATA, INITIAL_DIFFICULTY, MAX_DIFFICULTY};
pub use difficulty::DifficultyAdjustment;
pub use ledger::{validate_chain, Ledger};
pub use payload::BlockPayload;
pub use proof_of_work::{CancelToken, ProofOfWork};
pub use transaction::{Transaction, TxInput, TxOutput, COINBASE_REWARD};

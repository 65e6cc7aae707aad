//! Data storage and persistence
//!
//! This module owns the durable side of the ledger: one Sled tree of
//! serialized blocks keyed by zero-padded index.

pub mod block_store;

pub use block_store::{block_key, BlockStore, BLOCKS_TREE};

//! Utility functions and helpers
//!
//! Hashing, timestamps and the JSON encoding helpers shared by the
//! ledger and the wire protocol.

pub mod crypto;
pub mod serialization;

pub use crypto::{current_timestamp, sha256_digest, sha256_hex};
pub use serialization::{deserialize, serialize};

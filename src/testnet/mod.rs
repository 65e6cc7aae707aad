//! Shared fixtures for unit tests: temporary ledgers, mined chains and
//! loopback server settings.

pub mod test_utils;

pub use test_utils::*;

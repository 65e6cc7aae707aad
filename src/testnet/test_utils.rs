//! Test utilities for ledger and network tests

use crate::core::{Block, Ledger, ProofOfWork};
use crate::error::{BlockchainError, Result};
use crate::network::ServerConfig;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_temp_dir() -> Result<TempDir> {
    tempfile::tempdir().map_err(|e| BlockchainError::Io(e.to_string()))
}

/// A fresh ledger in its own temporary directory. Keep the `TempDir` alive
/// for as long as the ledger is used.
pub fn create_test_ledger() -> Result<(Ledger, TempDir)> {
    let temp_dir = create_temp_dir()?;
    let ledger = Ledger::open(temp_dir.path().join("ledger"))?;
    Ok((ledger, temp_dir))
}

/// Mine `count` blocks on top of `ledger`
pub fn mine_blocks(ledger: &Ledger, count: usize) -> Result<Vec<Block>> {
    let mut mined = Vec::with_capacity(count);
    for i in 0..count {
        match ProofOfWork::mine_next(ledger, format!("test block {i}"))? {
            Some(block) => mined.push(block),
            None => return Err(BlockchainError::MiningCancelled),
        }
    }
    Ok(mined)
}

/// Server settings for loopback tests: ephemeral port, short timeouts
pub fn test_server_config() -> ServerConfig {
    ServerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        read_timeout: Duration::from_secs(5),
        handshake_timeout: Duration::from_secs(5),
        ..ServerConfig::default()
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_ledger() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        assert_eq!(ledger.length(), 1);
        assert!(ledger.is_valid());
    }

    #[test]
    fn test_mine_blocks() {
        let (ledger, _temp_dir) = create_test_ledger().unwrap();
        let mined = mine_blocks(&ledger, 3).unwrap();
        assert_eq!(mined.len(), 3);
        assert_eq!(ledger.length(), 4);
        assert!(mined.iter().all(ProofOfWork::validate));
    }

    #[test]
    fn test_wait_until() {
        let mut calls = 0;
        assert!(wait_until(Duration::from_secs(1), || {
            calls += 1;
            calls > 2
        }));
        assert!(!wait_until(Duration::from_millis(50), || false));
    }
}

//! Error handling for the node
//!
//! One error type covers the ledger, the proof-of-work engine and the
//! replication protocol. Per-connection errors never leave their connection.

use std::fmt;
use std::io::ErrorKind;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Error types for ledger, mining and replication operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockchainError {
    /// Malformed serialized block or message
    Decode(String),
    /// Unexpected message type during handshake or a bad frame length
    Protocol(String),
    /// No frame arrived within the read deadline
    Timeout(String),
    /// Durable store unavailable or a write failed
    Storage(String),
    /// A block or candidate chain failed validation at `index`
    ChainInvalid { index: u64, reason: String },
    /// The nonce space was exhausted without meeting the target
    OutOfTarget { difficulty: u32 },
    /// The search was abandoned through its cancel token
    MiningCancelled,
    /// Connection-level failures (connect, bind, write)
    Network(String),
    /// The ledger's storage handle has been released
    LedgerClosed,
    /// Configuration errors
    Config(String),
    /// Encoding failures on the way out
    Serialization(String),
    /// File I/O errors
    Io(String),
}

impl fmt::Display for BlockchainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockchainError::Decode(msg) => write!(f, "Decode error: {msg}"),
            BlockchainError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            BlockchainError::Timeout(msg) => write!(f, "Timeout: {msg}"),
            BlockchainError::Storage(msg) => write!(f, "Storage error: {msg}"),
            BlockchainError::ChainInvalid { index, reason } => {
                write!(f, "Invalid chain at index {index}: {reason}")
            }
            BlockchainError::OutOfTarget { difficulty } => {
                write!(
                    f,
                    "Nonce space exhausted without meeting target (difficulty {difficulty})"
                )
            }
            BlockchainError::MiningCancelled => write!(f, "Mining cancelled"),
            BlockchainError::Network(msg) => write!(f, "Network error: {msg}"),
            BlockchainError::LedgerClosed => write!(f, "Ledger storage is closed"),
            BlockchainError::Config(msg) => write!(f, "Configuration error: {msg}"),
            BlockchainError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            BlockchainError::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BlockchainError {}

impl From<std::io::Error> for BlockchainError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            // Read deadlines surface as WouldBlock on Unix and TimedOut on Windows
            ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                BlockchainError::Timeout(err.to_string())
            }
            _ => BlockchainError::Io(err.to_string()),
        }
    }
}

impl From<sled::Error> for BlockchainError {
    fn from(err: sled::Error) -> Self {
        BlockchainError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for BlockchainError {
    fn from(err: serde_json::Error) -> Self {
        BlockchainError::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for BlockchainError {
    fn from(err: toml::de::Error) -> Self {
        BlockchainError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_timeout_maps_to_timeout() {
        let err: BlockchainError = std::io::Error::new(ErrorKind::WouldBlock, "slow").into();
        assert!(matches!(err, BlockchainError::Timeout(_)));

        let err: BlockchainError = std::io::Error::new(ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, BlockchainError::Timeout(_)));
    }

    #[test]
    fn test_other_io_maps_to_io() {
        let err: BlockchainError =
            std::io::Error::new(ErrorKind::UnexpectedEof, "closed").into();
        assert!(matches!(err, BlockchainError::Io(_)));
    }

    #[test]
    fn test_chain_invalid_display_names_index() {
        let err = BlockchainError::ChainInvalid {
            index: 7,
            reason: "hash mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid chain at index 7: hash mismatch");
    }
}

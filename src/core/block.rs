use crate::core::BlockPayload;
use crate::error::{BlockchainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_hex};
use serde::{Deserialize, Serialize};

pub const GENESIS_DATA: &str = "Genesis Block";
pub const INITIAL_DIFFICULTY: u32 = 1;
pub const MAX_DIFFICULTY: u32 = 128;

/// One ledger entry. Field order here is the wire and storage order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    index: u64,
    timestamp: i64,
    previous_hash: String,
    hash: String,
    data: BlockPayload,
    nonce: u64,
    difficulty: u32,
    validator: String,
}

// Everything but `hash`, in the fixed order the content hash is taken over
#[derive(Serialize)]
struct HashPreimage<'a> {
    index: u64,
    timestamp: i64,
    previous_hash: &'a str,
    data: &'a BlockPayload,
    nonce: u64,
    difficulty: u32,
    validator: &'a str,
}

impl Block {
    /// Build a block stamped with the current time, nonce 0 and difficulty 1.
    pub fn new(index: u64, previous_hash: String, data: impl Into<BlockPayload>) -> Block {
        // A clock before 1970 is the only failure; stamp it as the epoch
        let timestamp = current_timestamp().unwrap_or_default();
        Self::with_timestamp(index, timestamp, previous_hash, data)
    }

    pub fn with_timestamp(
        index: u64,
        timestamp: i64,
        previous_hash: String,
        data: impl Into<BlockPayload>,
    ) -> Block {
        let mut block = Block {
            index,
            timestamp,
            previous_hash,
            hash: String::new(),
            data: data.into(),
            nonce: 0,
            difficulty: INITIAL_DIFFICULTY,
            validator: String::new(),
        };
        block.hash = block.compute_hash();
        block
    }

    pub fn genesis() -> Block {
        Block::new(0, String::new(), GENESIS_DATA)
    }

    /// SHA-256 over the canonical JSON of every field except `hash`
    pub fn compute_hash(&self) -> String {
        let preimage = HashPreimage {
            index: self.index,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            data: &self.data,
            nonce: self.nonce,
            difficulty: self.difficulty,
            validator: &self.validator,
        };
        match serialize(&preimage) {
            Ok(bytes) => sha256_hex(&bytes),
            Err(_) => String::new(),
        }
    }

    /// Check this block against its predecessor, naming the first failed rule.
    pub fn check(&self, previous: Option<&Block>) -> Result<()> {
        let invalid = |reason: String| BlockchainError::ChainInvalid {
            index: self.index,
            reason,
        };

        if self.compute_hash() != self.hash {
            return Err(invalid("content hash mismatch".to_string()));
        }

        if let Some(previous) = previous {
            if self.previous_hash != previous.hash {
                return Err(invalid(format!(
                    "previous hash {} does not match {}",
                    self.previous_hash, previous.hash
                )));
            }
            if previous.index.checked_add(1) != Some(self.index) {
                return Err(invalid(format!(
                    "index does not follow predecessor {}",
                    previous.index
                )));
            }
            if self.timestamp <= previous.timestamp {
                return Err(invalid(format!(
                    "timestamp {} is not after {}",
                    self.timestamp, previous.timestamp
                )));
            }
        }

        Ok(())
    }

    pub fn validate(&self, previous: Option<&Block>) -> bool {
        self.check(previous).is_ok()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn get_index(&self) -> u64 {
        self.index
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_previous_hash(&self) -> &str {
        self.previous_hash.as_str()
    }

    pub fn get_hash(&self) -> &str {
        self.hash.as_str()
    }

    pub fn get_data(&self) -> &BlockPayload {
        &self.data
    }

    pub fn get_nonce(&self) -> u64 {
        self.nonce
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_validator(&self) -> &str {
        self.validator.as_str()
    }

    pub(crate) fn set_difficulty(&mut self, difficulty: u32) {
        self.difficulty = difficulty.min(MAX_DIFFICULTY);
    }

    pub(crate) fn set_timestamp(&mut self, timestamp: i64) {
        self.timestamp = timestamp;
    }

    pub(crate) fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
    }

    pub(crate) fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }

    /// Overwrite the payload without rehashing (tamper scenarios only)
    #[cfg(test)]
    pub(crate) fn set_data(&mut self, data: impl Into<BlockPayload>) {
        self.data = data.into();
    }

    #[cfg(test)]
    pub(crate) fn set_index(&mut self, index: u64) {
        self.index = index;
    }

    #[cfg(test)]
    pub(crate) fn set_previous_hash(&mut self, previous_hash: &str) {
        self.previous_hash = previous_hash.to_string();
    }
}

// Durable block storage on Sled
// Blocks live in one tree keyed by their zero-padded index, so sled's
// lexicographic key order is chain order.

use crate::core::Block;
use crate::error::{BlockchainError, Result};
use log::{debug, warn};
use sled::{Batch, Db, Tree};
use std::path::{Path, PathBuf};

pub const BLOCKS_TREE: &str = "blocks";

/// Fixed-width decimal key for a block index
pub fn block_key(index: u64) -> String {
    format!("{index:020}")
}

pub struct BlockStore {
    db: Db,
    blocks: Tree,
    path: PathBuf,
}

impl BlockStore {
    pub fn open(path: impl AsRef<Path>) -> Result<BlockStore> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open database: {e}")))?;
        let blocks = db
            .open_tree(BLOCKS_TREE)
            .map_err(|e| BlockchainError::Storage(format!("Failed to open blocks tree: {e}")))?;

        Ok(BlockStore { db, blocks, path })
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// Every stored block in ascending key order. Undecodable entries are skipped.
    pub fn load_all(&self) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        for entry in self.blocks.iter() {
            let (key, value) = entry
                .map_err(|e| BlockchainError::Storage(format!("Failed to read blocks: {e}")))?;
            match Block::deserialize(value.as_ref()) {
                Ok(block) => blocks.push(block),
                Err(e) => {
                    warn!(
                        "Skipping undecodable block at key {}: {e}",
                        String::from_utf8_lossy(key.as_ref())
                    );
                }
            }
        }
        Ok(blocks)
    }

    pub fn put(&self, block: &Block) -> Result<()> {
        let data = block.serialize()?;
        self.blocks
            .insert(block_key(block.get_index()), data)
            .map_err(|e| BlockchainError::Storage(format!("Failed to persist block: {e}")))?;
        self.flush()
    }

    /// Clear the tree and write `blocks` in one atomic batch
    pub fn rewrite(&self, blocks: &[Block]) -> Result<()> {
        let mut batch = Batch::default();
        for key in self.blocks.iter().keys() {
            let key =
                key.map_err(|e| BlockchainError::Storage(format!("Failed to read keys: {e}")))?;
            batch.remove(key);
        }
        for block in blocks {
            batch.insert(block_key(block.get_index()).as_bytes(), block.serialize()?);
        }

        self.blocks
            .apply_batch(batch)
            .map_err(|e| BlockchainError::Storage(format!("Failed to rewrite chain: {e}")))?;
        debug!("Rewrote {} blocks to {}", blocks.len(), self.path.display());
        self.flush()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| BlockchainError::Storage(format!("Failed to flush database: {e}")))?;
        Ok(())
    }
}

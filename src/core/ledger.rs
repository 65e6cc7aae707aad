// This is the ledger - the authoritative, ordered chain of blocks
// The whole chain is kept in memory and mirrored into a Sled tree.
// One RwLock guards both the in-memory sequence and the store handle, so
// every mutation is atomic with respect to readers and other writers.

use crate::core::{Block, BlockPayload};
use crate::error::{BlockchainError, Result};
use crate::storage::BlockStore;
use crate::utils::current_timestamp;
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

struct LedgerState {
    blocks: Vec<Block>,
    // None once the ledger has been closed
    store: Option<BlockStore>,
}

impl LedgerState {
    fn store(&self) -> Result<&BlockStore> {
        self.store.as_ref().ok_or(BlockchainError::LedgerClosed)
    }

    fn head(&self) -> Result<&Block> {
        self.blocks
            .last()
            .ok_or_else(|| BlockchainError::ChainInvalid {
                index: 0,
                reason: "ledger has no genesis block".to_string(),
            })
    }

    // Persist first so a failed write leaves memory untouched
    fn commit(&mut self, block: Block) -> Result<()> {
        self.store()?.put(&block)?;
        info!(
            "Committed block #{} {} (difficulty {})",
            block.get_index(),
            block.get_hash(),
            block.get_difficulty()
        );
        self.blocks.push(block);
        Ok(())
    }
}

/// Cheaply cloneable handle to the shared chain state
#[derive(Clone)]
pub struct Ledger {
    state: Arc<RwLock<LedgerState>>,
    path: PathBuf,
}

impl Ledger {
    /// Open (or create) the store at `path` and load the chain from it.
    /// An empty store gets a freshly persisted genesis block.
    pub fn open(path: impl AsRef<Path>) -> Result<Ledger> {
        let path = path.as_ref().to_path_buf();
        let store = BlockStore::open(&path)?;

        let mut blocks = store.load_all()?;
        if blocks.is_empty() {
            let genesis = Block::genesis();
            store.put(&genesis)?;
            info!("Created genesis block {}", genesis.get_hash());
            blocks.push(genesis);
        } else {
            info!("Loaded {} blocks from {}", blocks.len(), path.display());
        }

        Ok(Ledger {
            state: Arc::new(RwLock::new(LedgerState {
                blocks,
                store: Some(store),
            })),
            path,
        })
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// Build a block on top of the current head, persist it and return it.
    pub fn append(&self, data: impl Into<BlockPayload>) -> Result<Block> {
        let mut state = self.write();
        let head = state.head()?;
        let index = head
            .get_index()
            .checked_add(1)
            .ok_or_else(|| BlockchainError::ChainInvalid {
                index: head.get_index(),
                reason: "no index left after the head".to_string(),
            })?;
        let timestamp = next_timestamp(head);
        let block = Block::with_timestamp(
            index,
            timestamp,
            head.get_hash().to_string(),
            data,
        );
        state.commit(block.clone())?;
        Ok(block)
    }

    /// Commit a pre-built block as the new head. No validation happens here.
    pub fn append_existing(&self, block: Block) -> Result<()> {
        self.write().commit(block)
    }

    /// Commit `block` only if it validates against the head at commit time.
    pub fn append_checked(&self, block: Block) -> Result<()> {
        let mut state = self.write();
        block.check(Some(state.head()?))?;
        state.commit(block)
    }

    pub fn head(&self) -> Option<Block> {
        self.read().blocks.last().cloned()
    }

    /// The head and its predecessor, read under one lock
    pub fn head_with_parent(&self) -> Option<(Block, Option<Block>)> {
        let state = self.read();
        let (head, rest) = state.blocks.split_last()?;
        Some((head.clone(), rest.last().cloned()))
    }

    pub fn get(&self, index: u64) -> Option<Block> {
        let state = self.read();
        let index = usize::try_from(index).ok()?;
        state.blocks.get(index).cloned()
    }

    pub fn snapshot(&self) -> Vec<Block> {
        self.read().blocks.clone()
    }

    pub fn length(&self) -> usize {
        self.read().blocks.len()
    }

    pub fn is_valid(&self) -> bool {
        let state = self.read();
        match validate_chain(&state.blocks) {
            Ok(()) => true,
            Err(e) => {
                warn!("Chain validation failed: {e}");
                false
            }
        }
    }

    /// Longest valid chain wins; ties and shorter candidates are rejected.
    pub fn replace_chain(&self, candidate: Vec<Block>) -> Result<bool> {
        let mut state = self.write();

        if candidate.len() <= state.blocks.len() {
            info!(
                "Rejected candidate chain of length {} (current length {})",
                candidate.len(),
                state.blocks.len()
            );
            return Ok(false);
        }

        if let Some(first) = candidate.first() {
            if first.get_index() != 0 {
                warn!(
                    "Rejected candidate chain starting at index {}",
                    first.get_index()
                );
                return Ok(false);
            }
        }

        if let Err(e) = validate_chain(&candidate) {
            warn!("Rejected invalid candidate chain: {e}");
            return Ok(false);
        }

        state.store()?.rewrite(&candidate)?;
        info!(
            "Replaced chain: length {} -> {}",
            state.blocks.len(),
            candidate.len()
        );
        state.blocks = candidate;
        Ok(true)
    }

    /// Release the store handle. Later mutations fail with `LedgerClosed`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.write();
        if let Some(store) = state.store.take() {
            store.flush()?;
            info!("Closed ledger at {}", self.path.display());
        }
        Ok(())
    }

    #[cfg(test)]
    fn tamper<F: FnOnce(&mut Block)>(&self, index: usize, f: F) {
        let mut state = self.write();
        if let Some(block) = state.blocks.get_mut(index) {
            f(block);
        }
    }
}

/// Check every adjacent pair from index 1, stopping at the first failure.
pub fn validate_chain(blocks: &[Block]) -> Result<()> {
    if blocks.is_empty() {
        return Err(BlockchainError::ChainInvalid {
            index: 0,
            reason: "chain is empty".to_string(),
        });
    }
    for pair in blocks.windows(2) {
        pair[1].check(Some(&pair[0]))?;
    }
    Ok(())
}

/// Wall-clock now, nudged past `head` so timestamps stay strictly increasing
pub(crate) fn next_timestamp(head: &Block) -> i64 {
    let now = current_timestamp().unwrap_or_default();
    now.max(head.get_timestamp().saturating_add(1))
}

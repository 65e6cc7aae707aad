use crate::core::ledger::next_timestamp;
use crate::core::{Block, BlockPayload, DifficultyAdjustment, Ledger, MAX_DIFFICULTY};
use crate::error::{BlockchainError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{info, warn};
use num_bigint::BigUint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// Nonces tried between two looks at the cancel flag
const CANCEL_CHECK_INTERVAL: u64 = 1024;

/// Shared flag that abandons a running nonce search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ProofOfWork {
    // previous_hash ‖ payload rendering; nonce and difficulty are appended per try
    prefix: Vec<u8>,
    target: BigUint,
    difficulty: u32,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block) -> ProofOfWork {
        let difficulty = block.get_difficulty();
        ProofOfWork {
            prefix: Self::prefix(block),
            target: Self::target_for(difficulty),
            difficulty,
        }
    }

    /// `2^(256 - difficulty)` with difficulty clamped to 128
    pub fn target_for(difficulty: u32) -> BigUint {
        BigUint::from(1u8) << (256 - difficulty.min(MAX_DIFFICULTY))
    }

    fn prefix(block: &Block) -> Vec<u8> {
        let mut data = block.get_previous_hash().as_bytes().to_vec();
        data.extend(block.get_data().to_string().as_bytes());
        data
    }

    fn prepare_data(&self, nonce: u64) -> Vec<u8> {
        let mut data = self.prefix.clone();
        data.extend(format!("{nonce:x}").as_bytes());
        data.extend(format!("{:x}", self.difficulty).as_bytes());
        data
    }

    /// The exact bytes hashed for `nonce`; narrower than the content hash preimage.
    pub fn mining_input(block: &Block, nonce: u64) -> Vec<u8> {
        Self::new_proof_of_work(block).prepare_data(nonce)
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigUint::from_bytes_be(hash) < self.target
    }

    /// Search nonces from 0 upward until one beats the target.
    pub fn run(&self, cancel: &CancelToken) -> Result<(u64, String)> {
        for nonce in 0..=u64::MAX {
            if nonce % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
                return Err(BlockchainError::MiningCancelled);
            }
            let hash = sha256_digest(self.prepare_data(nonce).as_slice());
            if self.meets_target(&hash) {
                return Ok((nonce, HEXLOWER.encode(hash.as_slice())));
            }
        }
        Err(BlockchainError::OutOfTarget {
            difficulty: self.difficulty,
        })
    }

    /// Uncancellable search over `block`'s mining input
    pub fn mine(block: &Block) -> Result<(u64, String)> {
        Self::new_proof_of_work(block).run(&CancelToken::new())
    }

    /// Validate proof-of-work for a block
    pub fn validate(block: &Block) -> bool {
        let pow = Self::new_proof_of_work(block);
        let hash = sha256_digest(pow.prepare_data(block.get_nonce()).as_slice());
        pow.meets_target(&hash)
    }

    pub fn mine_next(ledger: &Ledger, data: impl Into<BlockPayload>) -> Result<Option<Block>> {
        Self::mine_next_with_cancel(ledger, data, &CancelToken::new())
    }

    /// Mine a block on top of the ledger head and commit it.
    ///
    /// No lock is held during the search. Cancellation, nonce exhaustion
    /// and a head that moved while mining all end in `Ok(None)`.
    pub fn mine_next_with_cancel(
        ledger: &Ledger,
        data: impl Into<BlockPayload>,
        cancel: &CancelToken,
    ) -> Result<Option<Block>> {
        let Some((head, parent)) = ledger.head_with_parent() else {
            return Ok(None);
        };
        let difficulty = DifficultyAdjustment::next_difficulty(&head, parent.as_ref());

        let Some(index) = head.get_index().checked_add(1) else {
            warn!("No block produced: head #{} is the last index", head.get_index());
            return Ok(None);
        };
        let mut block = Block::new(index, head.get_hash().to_string(), data);
        block.set_difficulty(difficulty);
        block.set_timestamp(next_timestamp(&head));

        info!(
            "Mining block #{} with difficulty {difficulty}",
            block.get_index()
        );
        let (nonce, digest) = match Self::new_proof_of_work(&block).run(cancel) {
            Ok(found) => found,
            Err(e @ (BlockchainError::MiningCancelled | BlockchainError::OutOfTarget { .. })) => {
                warn!("No block produced for #{}: {e}", block.get_index());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        block.set_nonce(nonce);
        block.set_hash(block.compute_hash());

        if !Self::validate(&block) {
            warn!("Discarding block #{}: proof-of-work does not verify", block.get_index());
            return Ok(None);
        }

        match ledger.append_checked(block.clone()) {
            Ok(()) => {
                info!(
                    "Mined block #{} (nonce {nonce}, pow {digest})",
                    block.get_index()
                );
                Ok(Some(block))
            }
            Err(e @ BlockchainError::ChainInvalid { .. }) => {
                warn!("Discarding stale mined block #{}: {e}", block.get_index());
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

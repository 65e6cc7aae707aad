use crate::core::{Block, MAX_DIFFICULTY};
use log::debug;

// Difficulty adjustment constants
const TARGET_BLOCK_TIME: i64 = 10_000; // 10 seconds in milliseconds
const MIN_DIFFICULTY: u32 = 1;

/// Per-block difficulty retargeting from the spacing of the last two blocks
pub struct DifficultyAdjustment;

impl DifficultyAdjustment {
    /// Step the last block's difficulty up when blocks come faster than the
    /// target spacing and down when they come slower.
    pub fn next_difficulty(last: &Block, previous: Option<&Block>) -> u32 {
        let Some(previous) = previous else {
            return MIN_DIFFICULTY;
        };

        let spacing = last.get_timestamp().saturating_sub(previous.get_timestamp());
        let current = last.get_difficulty();

        let next = if spacing < TARGET_BLOCK_TIME {
            current.saturating_add(1).min(MAX_DIFFICULTY)
        } else if spacing > TARGET_BLOCK_TIME {
            current.saturating_sub(1).max(MIN_DIFFICULTY)
        } else {
            current
        };

        debug!(
            "Difficulty after block #{}: {current} -> {next} (spacing {spacing}ms, target {TARGET_BLOCK_TIME}ms)",
            last.get_index()
        );
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_block(index: u64, timestamp: i64, difficulty: u32) -> Block {
        let mut block = Block::with_timestamp(index, timestamp, "prev".to_string(), "test");
        block.set_difficulty(difficulty);
        block
    }

    #[test]
    fn test_no_previous_block() {
        let last = create_test_block(0, 0, 7);
        assert_eq!(DifficultyAdjustment::next_difficulty(&last, None), 1);
    }

    #[test]
    fn test_fast_blocks_increase() {
        let previous = create_test_block(1, 0, 3);
        let last = create_test_block(2, 5_000, 3);
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&last, Some(&previous)),
            4
        );
    }

    #[test]
    fn test_slow_blocks_decrease() {
        let previous = create_test_block(1, 0, 3);
        let last = create_test_block(2, 20_000, 3);
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&last, Some(&previous)),
            2
        );
    }

    #[test]
    fn test_on_target_unchanged() {
        let previous = create_test_block(1, 0, 3);
        let last = create_test_block(2, 10_000, 3);
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&last, Some(&previous)),
            3
        );
    }

    #[test]
    fn test_difficulty_bounds() {
        let previous = create_test_block(1, 0, MAX_DIFFICULTY);
        let last = create_test_block(2, 1, MAX_DIFFICULTY);
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&last, Some(&previous)),
            MAX_DIFFICULTY
        );

        let previous = create_test_block(1, 0, MIN_DIFFICULTY);
        let last = create_test_block(2, 60_000, MIN_DIFFICULTY);
        assert_eq!(
            DifficultyAdjustment::next_difficulty(&last, Some(&previous)),
            MIN_DIFFICULTY
        );
    }
}

use std::sync::atomic::{AtomicU32, Ordering};
use tracing::trace;

pub const MIN_BATCH_SIZE: u32 = 1;
pub const MAX_BATCH_SIZE: u32 = 10_000;
pub const INITIAL_BATCH_SIZE: u32 = MAX_BATCH_SIZE / 4;

const GROWTH_FACTOR: f64 = 1.5;
const SHRINK_FACTOR: f64 = 0.5;

/// `GetRecords` page size shared by every shard read in one run
///
/// Updates are plain loads and stores, not compare-and-swap: two shards
/// adjusting at once may overwrite each other. That makes this approximate
/// flow control, which is all it needs to be. Adjustments are computed from
/// the size the finished request actually used, never from the current value.
#[derive(Debug)]
pub struct AdaptiveBatchSize {
    current: AtomicU32,
}

impl Default for AdaptiveBatchSize {
    fn default() -> Self {
        Self::new(INITIAL_BATCH_SIZE)
    }
}

impl AdaptiveBatchSize {
    pub fn new(initial: u32) -> Self {
        Self {
            current: AtomicU32::new(initial.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)),
        }
    }

    pub fn current(&self) -> u32 {
        self.current.load(Ordering::Relaxed)
    }

    /// Record a successful request made with `used`; returns the new size
    pub fn grow(&self, used: u32) -> u32 {
        let current = self.current();
        let proposed = (used as f64 * GROWTH_FACTOR).round() as u32;
        let next = current.max(proposed).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        self.current.store(next, Ordering::Relaxed);
        trace!(used, current, next, "Grew batch size");
        next
    }

    /// Record a throttled request made with `used`; returns the new size
    pub fn shrink(&self, used: u32) -> u32 {
        let current = self.current();
        let proposed = (used as f64 * SHRINK_FACTOR).round() as u32;
        let next = current.min(proposed).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
        self.current.store(next, Ordering::Relaxed);
        trace!(used, current, next, "Shrank batch size");
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_value() {
        assert_eq!(AdaptiveBatchSize::default().current(), 2_500);
        assert_eq!(AdaptiveBatchSize::new(0).current(), MIN_BATCH_SIZE);
        assert_eq!(AdaptiveBatchSize::new(50_000).current(), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_growth_never_exceeds_max() {
        let size = AdaptiveBatchSize::default();
        for _ in 0..100 {
            let used = size.current();
            size.grow(used);
            assert!(size.current() <= MAX_BATCH_SIZE);
        }
        assert_eq!(size.current(), MAX_BATCH_SIZE);
    }

    #[test]
    fn test_shrink_never_below_min() {
        let size = AdaptiveBatchSize::default();
        for _ in 0..100 {
            let used = size.current();
            size.shrink(used);
            assert!(size.current() >= MIN_BATCH_SIZE);
        }
        assert_eq!(size.current(), MIN_BATCH_SIZE);
    }

    #[test]
    fn test_rounding_at_the_bottom() {
        let size = AdaptiveBatchSize::new(1);
        assert_eq!(size.shrink(1), 1);
        assert_eq!(size.grow(1), 2);
        assert_eq!(size.grow(3), 5);
    }

    #[test]
    fn test_adjustments_use_size_of_finished_request() {
        let size = AdaptiveBatchSize::new(1000);

        // another shard already shrank the shared value
        size.shrink(1000);
        assert_eq!(size.current(), 500);

        // a stale success with 400 must not pull the size below the current value
        assert_eq!(size.grow(400), 600);

        // a stale throttle with 2000 must not raise it
        assert_eq!(size.shrink(2000), 600);
    }
}

use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Trait defining backoff behavior
pub trait Backoff: Send + Sync {
    /// Delay to wait before retry number `attempt` (1-based)
    fn next_delay(&self, attempt: u32) -> Duration;
}

/// Exponential backoff with additive jitter
///
/// Retry `n` waits `base + U(0, base * jitter_factor)` where
/// `base = initial_delay * multiplier^(n-1)`. There is no cap unless
/// `max_delay` is set.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Option<Duration>,
    multiplier: f64,
    jitter_factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay: None,
            multiplier: 2.0,
            jitter_factor: 1.0,
        }
    }

    /// Create a new builder for ExponentialBackoff
    pub fn builder() -> ExponentialBackoffBuilder {
        ExponentialBackoffBuilder::default()
    }

    /// Delay before jitter for retry `attempt`
    pub fn base_delay(&self, attempt: u32) -> Duration {
        Duration::from_nanos(self.base_nanos(attempt).round() as u64)
    }

    fn base_nanos(&self, attempt: u32) -> f64 {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base = self.initial_delay.as_nanos() as f64 * self.multiplier.powi(exponent);

        match self.max_delay {
            Some(max) => base.min(max.as_nanos() as f64),
            None => base,
        }
    }

    fn calculate_delay(&self, attempt: u32) -> Duration {
        let base = self.base_nanos(attempt);
        if base <= 0.0 {
            return Duration::ZERO;
        }

        let jitter_range = base * self.jitter_factor;
        let jitter = if jitter_range > 0.0 && jitter_range.is_finite() {
            rand::thread_rng().gen_range(0.0..jitter_range)
        } else {
            0.0
        };

        // `as u64` saturates, so runaway growth pins at Duration::from_nanos(u64::MAX)
        let final_delay = Duration::from_nanos((base + jitter).round() as u64);

        trace!(
            attempt = attempt,
            base_delay_ms = base / 1_000_000.0,
            jitter_ms = jitter / 1_000_000.0,
            final_delay_ms = ?final_delay.as_millis(),
            "Calculated backoff delay"
        );

        final_delay
    }
}

impl Backoff for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        self.calculate_delay(attempt)
    }
}

/// Builder for ExponentialBackoff
#[derive(Debug)]
pub struct ExponentialBackoffBuilder {
    initial_delay: Duration,
    max_delay: Option<Duration>,
    multiplier: f64,
    jitter_factor: f64,
}

impl Default for ExponentialBackoffBuilder {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(10),
            max_delay: None,
            multiplier: 2.0,
            jitter_factor: 1.0,
        }
    }
}

impl ExponentialBackoffBuilder {
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Option<Duration>) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            jitter_factor: self.jitter_factor,
        }
    }
}

/// Fixed backoff implementation
#[derive(Debug, Clone)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Backoff for FixedBackoff {
    fn next_delay(&self, attempt: u32) -> Duration {
        trace!(attempt = attempt, delay_ms = ?self.delay.as_millis(), "Fixed backoff delay");
        self.delay
    }
}

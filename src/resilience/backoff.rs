//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

/// Delay before retrying after the `attempt`-th failure (0-indexed).
///
/// `base_ms * 2^attempt`, capped at `max_ms`, plus up to `jitter_percent`
/// of the capped delay.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64, jitter_percent: u8) -> Duration {
    let exponential_base = 2u64.saturating_pow(attempt);
    let delay_ms = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = delay_ms.saturating_mul(u64::from(jitter_percent)) / 100;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(delay_ms + jitter)
}

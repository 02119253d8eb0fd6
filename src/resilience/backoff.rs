//! Exponential backoff with jitter for upstream retries.

use std::time::Duration;

use rand::Rng;

use crate::config::schema::UpstreamConfig;

/// Delay before retry number `attempt` (1-based), doubling from
/// `base_delay_ms`, capped at `max_delay_ms`, plus up to 10% jitter.
pub fn retry_delay(attempt: u32, upstream: &UpstreamConfig) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
    let capped = upstream
        .base_delay_ms
        .saturating_mul(factor)
        .min(upstream.max_delay_ms);

    let jitter_range = capped / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped + jitter)
}

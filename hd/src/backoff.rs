//! Exponential backoff between escalation rounds
//!
//! Delays are in whole minutes. Doubling saturates at the cap and stops
//! after 32 rounds, so the computation is bounded regardless of the attempt
//! count.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Delay in minutes before the escalation that follows `attempt`
///
/// Attempt 0 yields `base`; attempt `n > 0` yields `min(base * 2^n, cap)`.
pub fn next_delay(attempt: u32, base: u32, cap: u32) -> u32 {
    if attempt == 0 {
        return base;
    }

    let mut delay = u64::from(base);
    let cap = u64::from(cap);
    // Any nonzero u32 base reaches a u32 cap within 32 doublings
    for _ in 0..attempt.min(u32::BITS) {
        if delay >= cap {
            break;
        }
        delay *= 2;
    }

    // delay <= max(base, 2 * cap) fits in u64; clamp brings it back into u32
    delay.min(cap) as u32
}

/// Per-persona backoff parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// First delay, in minutes
    pub base: u32,
    /// Maximum delay, in minutes
    pub cap: u32,
}

impl BackoffPolicy {
    pub const fn new(base: u32, cap: u32) -> Self {
        Self { base, cap }
    }

    /// Delay in minutes after `attempt`
    pub fn delay_minutes(&self, attempt: u32) -> u32 {
        next_delay(attempt, self.base, self.cap)
    }

    /// Delay after `attempt` as a chrono duration
    pub fn delay(&self, attempt: u32) -> Duration {
        Duration::minutes(i64::from(self.delay_minutes(attempt)))
    }

    /// First `attempts` delays, for display
    pub fn schedule(&self, attempts: u32) -> Vec<u32> {
        (0..attempts).map(|a| self.delay_minutes(a)).collect()
    }
}

// SPDX-FileCopyrightText: 2026 Botfleet Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retry timing for failed deliveries.

use std::time::Duration;

use botfleet_config::DispatchConfig;
use rand::Rng;

/// Capped exponential backoff with additive jitter.
///
/// After the n-th failed attempt the job waits
/// `min(base * 2^(n-1), cap) + uniform(0..=jitter)`, or the platform's
/// retry hint if that is longer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.backoff_base(),
            cap: config.backoff_max(),
            jitter: config.jitter(),
        }
    }

    /// The exponential part of the delay after `attempts` failures.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1);
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Full delay before the next attempt.
    pub fn delay(&self, attempts: u32, retry_after: Option<Duration>) -> Duration {
        let delay = self.backoff(attempts) + self.sample_jitter();
        match retry_after {
            Some(hint) => delay.max(hint),
            None => delay,
        }
    }

    fn sample_jitter(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

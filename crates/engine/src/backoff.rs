// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exponential backoff with cap and jitter.
//!
//! The jitter spreads a fleet's retries so a recovering cloud is not hit
//! by every device in the same second.

use rand::Rng;
use std::time::Duration;

/// Fraction of the delay randomized in each direction.
const JITTER: f64 = 0.3;

/// Capped exponential backoff: `min(cap, base · 2^(n-1))`, jittered ±30%.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            attempt: 0,
        }
    }

    /// The schedule both sync loops and job status retries use:
    /// 15 s doubling up to 15 min.
    pub fn sync_default() -> Self {
        Self::new(Duration::from_secs(15), Duration::from_secs(900))
    }

    /// Delay before the next retry, advancing the attempt counter.
    pub fn next(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let exact = self.unjittered(self.attempt);
        let factor = rand::thread_rng().gen_range(1.0 - JITTER..=1.0 + JITTER);
        exact.mul_f64(factor)
    }

    /// The deterministic delay for attempt `n` (1-based), before jitter.
    pub fn unjittered(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        let exact = self.base.saturating_mul(1u32 << doublings);
        exact.min(self.cap)
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Reset after a success so the next failure starts over.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

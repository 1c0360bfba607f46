// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registry of loop intervals, rewireable at runtime.
//!
//! Each loop reads its interval at the top of every tick, so a config
//! change takes effect on the next tick without restarting the loop.

use fleetd_core::{AgentSettings, IntervalKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
pub struct Intervals {
    current: Arc<Mutex<HashMap<IntervalKind, Duration>>>,
}

impl Intervals {
    pub fn new(settings: &AgentSettings) -> Self {
        let current = IntervalKind::ALL
            .iter()
            .map(|&kind| (kind, Duration::from_millis(settings.interval_ms(kind))))
            .collect();
        Self {
            current: Arc::new(Mutex::new(current)),
        }
    }

    /// Rewire a timer. Returns false when the value is below the kind's
    /// floor and was rejected.
    pub fn set(&self, kind: IntervalKind, ms: u64) -> bool {
        if ms < kind.floor_ms() {
            tracing::warn!(
                setting = %kind,
                ms,
                floor = kind.floor_ms(),
                "interval below floor, keeping previous value"
            );
            return false;
        }
        let previous = self
            .current
            .lock()
            .insert(kind, Duration::from_millis(ms));
        if previous != Some(Duration::from_millis(ms)) {
            tracing::info!(setting = %kind, ms, "interval rewired");
        }
        true
    }

    pub fn get(&self, kind: IntervalKind) -> Duration {
        self.current
            .lock()
            .get(&kind)
            .copied()
            .unwrap_or(Duration::from_millis(kind.floor_ms()))
    }
}

impl Default for Intervals {
    fn default() -> Self {
        Self::new(&AgentSettings::default())
    }
}

#[cfg(test)]
#[path = "intervals_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection health derived from the two sync operations.
//!
//! Polls and reports are tracked independently; the derived status follows
//! the worse of the two consecutive-failure counters. Transitions are
//! published on the bus; the offline→online edge additionally publishes
//! `connection:restored`, which triggers the queue drain.

use fleetd_core::{Clock, ConnStatus, ConnectionHealth, Event, EventBus};
use fleetd_transport::TransportError;
use parking_lot::Mutex;

/// Which sync operation an outcome belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    Poll,
    Report,
}

const DEGRADED_AFTER: u32 = 2;
const OFFLINE_AFTER: u32 = 3;

#[derive(Default)]
struct OpStats {
    consecutive_failures: u32,
    attempts: u64,
    successes: u64,
    last_success_ms: Option<u64>,
}

impl OpStats {
    fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            1.0
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }
}

struct MonitorInner {
    poll: OpStats,
    report: OpStats,
    status: ConnStatus,
    offline_since_ms: Option<u64>,
}

pub struct ConnectionMonitor<K: Clock> {
    clock: K,
    bus: EventBus,
    inner: Mutex<MonitorInner>,
}

impl<K: Clock> ConnectionMonitor<K> {
    pub fn new(clock: K, bus: EventBus) -> Self {
        Self {
            clock,
            bus,
            inner: Mutex::new(MonitorInner {
                poll: OpStats::default(),
                report: OpStats::default(),
                status: ConnStatus::Online,
                offline_since_ms: None,
            }),
        }
    }

    pub fn mark_success(&self, op: SyncOp) {
        let now_ms = self.clock.epoch_ms();
        let mut events = Vec::new();
        {
            let mut inner = self.inner.lock();
            let stats = match op {
                SyncOp::Poll => &mut inner.poll,
                SyncOp::Report => &mut inner.report,
            };
            stats.attempts += 1;
            stats.successes += 1;
            stats.consecutive_failures = 0;
            stats.last_success_ms = Some(now_ms);

            let both_clear =
                inner.poll.consecutive_failures == 0 && inner.report.consecutive_failures == 0;
            if both_clear && inner.status != ConnStatus::Online {
                let was_offline = inner.status == ConnStatus::Offline;
                inner.status = ConnStatus::Online;
                inner.offline_since_ms = None;
                tracing::info!("connection online");
                events.push(Event::ConnOnline);
                if was_offline {
                    tracing::info!("connection restored after outage");
                    events.push(Event::ConnRestored);
                }
            }
        }
        for event in events {
            self.bus.publish(event);
        }
    }

    pub fn mark_failure(&self, op: SyncOp, err: &TransportError) {
        let now_ms = self.clock.epoch_ms();
        let mut event = None;
        {
            let mut inner = self.inner.lock();
            let stats = match op {
                SyncOp::Poll => &mut inner.poll,
                SyncOp::Report => &mut inner.report,
            };
            stats.attempts += 1;
            stats.consecutive_failures += 1;
            let failures = stats.consecutive_failures;
            tracing::debug!(op = ?op, failures, error = %err, "sync operation failed");

            let worst = inner
                .poll
                .consecutive_failures
                .max(inner.report.consecutive_failures);
            if worst >= OFFLINE_AFTER && inner.status != ConnStatus::Offline {
                inner.status = ConnStatus::Offline;
                inner.offline_since_ms = Some(now_ms);
                tracing::warn!(since_ms = now_ms, "connection offline");
                event = Some(Event::ConnOffline { since_ms: now_ms });
            } else if worst >= DEGRADED_AFTER && inner.status == ConnStatus::Online {
                inner.status = ConnStatus::Degraded;
                tracing::warn!("connection degraded");
                event = Some(Event::ConnDegraded);
            }
        }
        if let Some(event) = event {
            self.bus.publish(event);
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.lock().status == ConnStatus::Online
    }

    pub fn status(&self) -> ConnStatus {
        self.inner.lock().status
    }

    pub fn health(&self) -> ConnectionHealth {
        let inner = self.inner.lock();
        ConnectionHealth {
            status: inner.status,
            poll_success_rate: inner.poll.success_rate(),
            report_success_rate: inner.report.success_rate(),
            last_poll_success_ms: inner.poll.last_success_ms,
            last_report_success_ms: inner.report.last_success_ms,
            offline_since_ms: inner.offline_since_ms,
        }
    }
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;

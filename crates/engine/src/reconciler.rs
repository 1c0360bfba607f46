// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State reconciler: owns target and current state, drives the driver.
//!
//! `set_target` is the single emission point of `target:changed`; rapid
//! target updates collapse because every reconciliation snapshots the
//! freshest target. A guard flag keeps reconciliations from overlapping.

use crate::driver::{ContainerDriver, DriverError};
use crate::intervals::Intervals;
use crate::plan::compute_plan;
use fleetd_core::{CurrentState, DeviceConfig, Event, EventBus, IntervalKind, TargetState};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Consecutive failing ticks before a service is reported unhealthy.
const UNHEALTHY_AFTER_TICKS: u32 = 3;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub actions: usize,
    pub failures: usize,
}

struct ReconInner {
    target: Option<TargetState>,
    current: CurrentState,
    /// Consecutive failing ticks per `(app_id, service_id)`.
    tick_failures: HashMap<(String, String), u32>,
}

pub struct Reconciler<D> {
    driver: Arc<D>,
    bus: EventBus,
    unhealthy_after: u32,
    in_flight: AtomicBool,
    inner: Mutex<ReconInner>,
}

/// Clears the overlap guard when a pass ends, also on early return.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<D: ContainerDriver> Reconciler<D> {
    pub fn new(driver: Arc<D>, bus: EventBus) -> Self {
        Self {
            driver,
            bus,
            unhealthy_after: UNHEALTHY_AFTER_TICKS,
            in_flight: AtomicBool::new(false),
            inner: Mutex::new(ReconInner {
                target: None,
                current: CurrentState::default(),
                tick_failures: HashMap::new(),
            }),
        }
    }

    pub fn with_unhealthy_after(mut self, ticks: u32) -> Self {
        self.unhealthy_after = ticks.max(1);
        self
    }

    /// Atomically replace the in-memory target.
    ///
    /// Any new version is accepted; a downgrade is logged as an anomaly.
    /// Returns false (and emits nothing) when the target is structurally
    /// unchanged.
    pub fn set_target(&self, target: TargetState) -> bool {
        let version = target.version;
        {
            let mut inner = self.inner.lock();
            if inner.target.as_ref() == Some(&target) {
                return false;
            }
            if let Some(previous) = &inner.target {
                if version < previous.version {
                    tracing::warn!(
                        previous = previous.version,
                        new = version,
                        "target version moved backwards"
                    );
                }
            }
            // The device has now seen this version; reports echo it.
            inner.current.version = version;
            inner.target = Some(target);
        }
        tracing::info!(version, "target state accepted");
        self.bus.publish(Event::TargetChanged { version });
        true
    }

    pub fn target_state(&self) -> Option<TargetState> {
        self.inner.lock().target.clone()
    }

    pub fn current_state(&self) -> CurrentState {
        self.inner.lock().current.clone()
    }

    /// Record the config the distributor actually applied, so reports
    /// reflect applied values rather than whatever the target asked for.
    pub fn note_applied_config(&self, config: DeviceConfig) {
        self.inner.lock().current.config = config;
    }

    /// Re-read the driver's observed state into the cached current state.
    pub async fn refresh_current(&self) -> Result<(), DriverError> {
        let apps = self.driver.observe().await?;
        self.inner.lock().current.apps = apps;
        Ok(())
    }

    /// One reconciliation pass. Returns `None` when another pass is in
    /// flight or no target has arrived yet.
    pub async fn reconcile(&self) -> Result<Option<ReconcileSummary>, DriverError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            tracing::debug!("reconciliation already in flight, skipping tick");
            return Ok(None);
        }
        let _guard = InFlightGuard(&self.in_flight);

        let Some(target) = self.inner.lock().target.clone() else {
            return Ok(None);
        };

        let observed = self.driver.observe().await?;
        let plan = compute_plan(&target.apps, &observed);
        if !plan.is_empty() {
            tracing::info!(actions = plan.len(), "applying reconciliation plan");
        }

        let total = plan.len();
        let mut failures = 0usize;
        // A failed pull must not tear down the running container it was
        // meant to replace: every later action for that service is skipped.
        let mut failed_pairs: HashSet<(String, String)> = HashSet::new();

        for action in &plan.actions {
            if let Some((app_id, service_id)) = action.service_ref() {
                if failed_pairs.contains(&(app_id.to_string(), service_id.to_string())) {
                    tracing::debug!(
                        action = %action.log_summary(),
                        "skipping action after earlier failure for this service"
                    );
                    continue;
                }
            }
            if let Err(err) = self.driver.apply(action).await {
                failures += 1;
                tracing::warn!(
                    action = %action.log_summary(),
                    error = %err,
                    "plan action failed, continuing"
                );
                if let Some((app_id, service_id)) = action.service_ref() {
                    failed_pairs.insert((app_id.to_string(), service_id.to_string()));
                }
            }
        }

        // Track consecutive failing ticks per service; healthy services
        // reset their counter.
        let mut unhealthy = Vec::new();
        {
            let mut inner = self.inner.lock();
            inner
                .tick_failures
                .retain(|pair, _| failed_pairs.contains(pair));
            for pair in &failed_pairs {
                let count = inner.tick_failures.entry(pair.clone()).or_insert(0);
                *count += 1;
                if *count == self.unhealthy_after {
                    unhealthy.push((pair.clone(), *count));
                }
            }
        }
        for ((app_id, service_id), count) in unhealthy {
            self.bus.publish(Event::ServiceUnhealthy {
                app_id,
                service_id,
                consecutive_failures: count,
            });
        }

        let observed = self.driver.observe().await?;
        {
            let mut inner = self.inner.lock();
            inner.current.apps = observed;
            inner.current.version = target.version;
        }
        self.bus.publish(Event::ReconcileComplete {
            actions: total,
            failures,
        });

        Ok(Some(ReconcileSummary {
            actions: total,
            failures,
        }))
    }

    /// Reconciliation loop: a pass per interval tick and on every target
    /// change; `current:changed` refreshes the cached observation.
    pub async fn run(self: Arc<Self>, intervals: Intervals, cancel: CancellationToken) {
        let sub = self.bus.subscribe_filtered("reconciler", 64, |e| {
            matches!(e, Event::TargetChanged { .. } | Event::CurrentChanged)
        });
        loop {
            let interval = intervals.get(IntervalKind::Reconciliation);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = self.reconcile().await {
                        tracing::warn!(error = %err, "reconciliation tick failed");
                    }
                }
                event = sub.recv() => match event {
                    Event::TargetChanged { .. } => {
                        if let Err(err) = self.reconcile().await {
                            tracing::warn!(error = %err, "reconciliation after target change failed");
                        }
                    }
                    Event::CurrentChanged => {
                        if let Err(err) = self.refresh_current().await {
                            tracing::debug!(error = %err, "current state refresh failed");
                        }
                    }
                    _ => {}
                },
            }
        }
        tracing::debug!("reconciler loop exited");
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Container driver seam.
//!
//! The engine never talks to a container engine directly; it dispatches
//! plan actions through this trait and observes the result. Real drivers
//! wrap an engine (docker, podman, …) out of tree. [`MemoryDriver`] keeps
//! the observed state in memory: the dry-run driver for agents without a
//! container engine attached, and the workhorse of the tests.

use crate::plan::PlanAction;
use async_trait::async_trait;
use fleetd_core::{AppSpec, Event, EventBus, ServiceStatus};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Container engine failure for a specific action. Surfaced as a
/// per-service health signal, never fatal to the reconciliation loop.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("image pull failed: {0}")]
    PullFailed(String),
    #[error("container action failed: {0}")]
    ActionFailed(String),
    #[error("container engine unavailable: {0}")]
    Unavailable(String),
}

/// What the reconciler requires from a container engine.
#[async_trait]
pub trait ContainerDriver: Send + Sync + 'static {
    /// Engine name, e.g. `docker`.
    fn name(&self) -> &str;

    /// Engine version string.
    fn version(&self) -> &str;

    /// Apply one plan action. Implementations publish `current:changed`
    /// on the bus when the observed state moves.
    async fn apply(&self, action: &PlanAction) -> Result<(), DriverError>;

    /// Snapshot the observed apps.
    async fn observe(&self) -> Result<BTreeMap<String, AppSpec>, DriverError>;

    /// Stream a service's container logs into `sink`.
    async fn attach_logs(
        &self,
        service_id: &str,
        sink: mpsc::Sender<String>,
    ) -> Result<(), DriverError>;
}

type FailRule = Box<dyn Fn(&PlanAction) -> bool + Send + Sync>;

/// In-memory driver: applies actions to an internal app map.
pub struct MemoryDriver {
    bus: EventBus,
    apps: Mutex<BTreeMap<String, AppSpec>>,
    applied: Mutex<Vec<PlanAction>>,
    pulled: Mutex<Vec<String>>,
    fail_when: Mutex<Option<FailRule>>,
    next_container: AtomicU64,
}

impl MemoryDriver {
    pub fn new(bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            bus,
            apps: Mutex::new(BTreeMap::new()),
            applied: Mutex::new(Vec::new()),
            pulled: Mutex::new(Vec::new()),
            fail_when: Mutex::new(None),
            next_container: AtomicU64::new(1),
        })
    }

    /// Actions applied so far, in order.
    pub fn applied(&self) -> Vec<PlanAction> {
        self.applied.lock().clone()
    }

    pub fn clear_applied(&self) {
        self.applied.lock().clear();
    }

    /// Images pulled so far.
    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().clone()
    }

    /// Make matching actions fail until cleared.
    pub fn fail_when(&self, rule: impl Fn(&PlanAction) -> bool + Send + Sync + 'static) {
        *self.fail_when.lock() = Some(Box::new(rule));
    }

    pub fn clear_failures(&self) {
        *self.fail_when.lock() = None;
    }

    /// Replace the observed state wholesale, as an engine restart would.
    pub fn seed(&self, apps: BTreeMap<String, AppSpec>) {
        *self.apps.lock() = apps;
    }

    fn next_container_id(&self) -> String {
        let n = self.next_container.fetch_add(1, Ordering::Relaxed);
        format!("mem-{n:08x}")
    }

    fn apply_to_state(&self, action: &PlanAction) {
        let mut apps = self.apps.lock();
        match action {
            PlanAction::PullImage { image, .. } => {
                self.pulled.lock().push(image.clone());
            }
            PlanAction::CreateApp { app_id, app_name } => {
                apps.entry(app_id.clone())
                    .or_insert_with(|| AppSpec::new(app_id.clone(), app_name.clone()));
            }
            PlanAction::RemoveApp { app_id } => {
                apps.remove(app_id);
            }
            PlanAction::CreateService { app_id, service } => {
                let app = apps
                    .entry(app_id.clone())
                    .or_insert_with(|| AppSpec::new(app_id.clone(), ""));
                let mut svc = service.clone();
                svc.container_id = Some(self.next_container_id());
                svc.status = Some(ServiceStatus::Stopped);
                app.services.insert(svc.service_id.clone(), svc);
            }
            PlanAction::StartService {
                app_id, service_id, ..
            } => {
                if let Some(svc) = apps
                    .get_mut(app_id)
                    .and_then(|a| a.services.get_mut(service_id))
                {
                    svc.status = Some(ServiceStatus::Running);
                }
            }
            PlanAction::StopService {
                app_id, service_id, ..
            } => {
                if let Some(svc) = apps
                    .get_mut(app_id)
                    .and_then(|a| a.services.get_mut(service_id))
                {
                    svc.status = Some(ServiceStatus::Stopped);
                }
            }
            PlanAction::RemoveService {
                app_id, service_id, ..
            } => {
                if let Some(app) = apps.get_mut(app_id) {
                    app.services.remove(service_id);
                }
            }
        }
    }
}

#[async_trait]
impl ContainerDriver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    async fn apply(&self, action: &PlanAction) -> Result<(), DriverError> {
        let failed = self
            .fail_when
            .lock()
            .as_ref()
            .map(|rule| rule(action))
            .unwrap_or(false);
        if failed {
            return Err(match action {
                PlanAction::PullImage { image, .. } => DriverError::PullFailed(image.clone()),
                other => DriverError::ActionFailed(other.log_summary()),
            });
        }

        self.apply_to_state(action);
        self.applied.lock().push(action.clone());
        self.bus.publish(Event::CurrentChanged);
        Ok(())
    }

    async fn observe(&self) -> Result<BTreeMap<String, AppSpec>, DriverError> {
        Ok(self.apps.lock().clone())
    }

    async fn attach_logs(
        &self,
        _service_id: &str,
        _sink: mpsc::Sender<String>,
    ) -> Result<(), DriverError> {
        // Nothing runs, nothing logs
        Ok(())
    }
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;

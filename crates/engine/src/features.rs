// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feature supervisor: runtime enable/disable of optional subsystems.
//!
//! Features declare what they require (broker, cloud, either); the
//! supervisor only starts a feature whose requirement is currently
//! satisfiable and retries pending ones when connectivity returns.
//! Transitions are idempotent and atomic: a feature is running or it is
//! not, never half-started.

use async_trait::async_trait;
use fleetd_core::{Event, EventBus, FeatureHealth, FeatureKind};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("requirement unmet: {0}")]
    RequirementUnmet(&'static str),
    #[error("feature failed: {0}")]
    Failed(String),
}

/// What must be reachable before a feature can start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureRequirement {
    None,
    Broker,
    Cloud,
    /// Either transport suffices, e.g. jobs run over broker or HTTP.
    BrokerOrCloud,
}

impl FeatureRequirement {
    pub fn describe(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Broker => "broker reachable",
            Self::Cloud => "cloud reachable",
            Self::BrokerOrCloud => "broker or cloud reachable",
        }
    }
}

/// A supervised feature lifecycle.
#[async_trait]
pub trait Feature: Send + Sync + 'static {
    fn kind(&self) -> FeatureKind;

    fn requirement(&self) -> FeatureRequirement {
        FeatureRequirement::None
    }

    async fn start(&self) -> Result<(), FeatureError>;

    async fn stop(&self) -> Result<(), FeatureError>;

    fn is_running(&self) -> bool;

    fn health(&self) -> FeatureHealth {
        FeatureHealth {
            running: self.is_running(),
            detail: None,
        }
    }
}

/// Answers whether a requirement is currently satisfied.
pub type RequirementProbe = Arc<dyn Fn(FeatureRequirement) -> bool + Send + Sync>;

struct Registered {
    feature: Arc<dyn Feature>,
    /// Config intent: a feature can be enabled yet not running while its
    /// requirement is unmet.
    enabled: bool,
}

pub struct FeatureSupervisor {
    bus: EventBus,
    probe: RequirementProbe,
    /// Registration order; stop_all walks it in reverse.
    features: Mutex<Vec<Registered>>,
}

impl FeatureSupervisor {
    pub fn new(bus: EventBus, probe: RequirementProbe) -> Self {
        Self {
            bus,
            probe,
            features: Mutex::new(Vec::new()),
        }
    }

    /// A supervisor whose features have no transport requirements (tests).
    pub fn unconstrained(bus: EventBus) -> Self {
        Self::new(bus, Arc::new(|_| true))
    }

    pub fn register(&self, feature: Arc<dyn Feature>) {
        self.features.lock().push(Registered {
            feature,
            enabled: false,
        });
    }

    fn find(&self, kind: FeatureKind) -> Option<Arc<dyn Feature>> {
        self.features
            .lock()
            .iter()
            .find(|r| r.feature.kind() == kind)
            .map(|r| r.feature.clone())
    }

    fn set_enabled_flag(&self, kind: FeatureKind, enabled: bool) -> bool {
        let mut features = self.features.lock();
        match features.iter_mut().find(|r| r.feature.kind() == kind) {
            Some(registered) => {
                registered.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, kind: FeatureKind) -> bool {
        self.features
            .lock()
            .iter()
            .any(|r| r.feature.kind() == kind && r.enabled)
    }

    /// Idempotently apply a config toggle.
    pub async fn set_enabled(&self, kind: FeatureKind, enabled: bool) {
        if !self.set_enabled_flag(kind, enabled) {
            tracing::debug!(feature = %kind, enabled, "no feature registered for toggle");
            return;
        }
        let Some(feature) = self.find(kind) else {
            return;
        };

        if enabled {
            self.try_start(&feature).await;
        } else if feature.is_running() {
            match feature.stop().await {
                Ok(()) => {
                    tracing::info!(feature = %kind, "feature stopped");
                    self.bus.publish(Event::FeatureStopped { feature: kind });
                }
                Err(err) => {
                    tracing::warn!(feature = %kind, error = %err, "feature stop failed");
                    self.bus.publish(Event::FeatureFailed {
                        feature: kind,
                        error: err.to_string(),
                    });
                }
            }
        }
    }

    async fn try_start(&self, feature: &Arc<dyn Feature>) {
        let kind = feature.kind();
        if feature.is_running() {
            return;
        }
        let requirement = feature.requirement();
        if !(self.probe)(requirement) {
            tracing::warn!(
                feature = %kind,
                requirement = requirement.describe(),
                "feature enabled but requirement unmet, deferring start"
            );
            return;
        }
        match feature.start().await {
            Ok(()) => {
                tracing::info!(feature = %kind, "feature started");
                self.bus.publish(Event::FeatureStarted { feature: kind });
            }
            Err(err) => {
                tracing::warn!(feature = %kind, error = %err, "feature start failed");
                self.bus.publish(Event::FeatureFailed {
                    feature: kind,
                    error: err.to_string(),
                });
            }
        }
    }

    /// Start enabled-but-not-running features whose requirement is now
    /// satisfied. Called when connectivity returns.
    pub async fn retry_pending(&self) {
        let pending: Vec<Arc<dyn Feature>> = {
            let features = self.features.lock();
            features
                .iter()
                .filter(|r| r.enabled && !r.feature.is_running())
                .map(|r| r.feature.clone())
                .collect()
        };
        for feature in pending {
            self.try_start(&feature).await;
        }
    }

    /// Stop every running feature, newest registration first.
    pub async fn stop_all(&self) {
        let running: Vec<Arc<dyn Feature>> = {
            let features = self.features.lock();
            features
                .iter()
                .rev()
                .filter(|r| r.feature.is_running())
                .map(|r| r.feature.clone())
                .collect()
        };
        for feature in running {
            let kind = feature.kind();
            if let Err(err) = feature.stop().await {
                tracing::warn!(feature = %kind, error = %err, "feature stop failed during shutdown");
            } else {
                tracing::info!(feature = %kind, "feature stopped");
                self.bus.publish(Event::FeatureStopped { feature: kind });
            }
        }
    }

    /// Per-feature health, attached to state reports.
    pub fn health_snapshots(&self) -> BTreeMap<String, FeatureHealth> {
        self.features
            .lock()
            .iter()
            .map(|r| (r.feature.kind().name().to_string(), r.feature.health()))
            .collect()
    }

    /// Watch connectivity events and retry pending features on recovery.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let sub = self.bus.subscribe_filtered("feature-supervisor", 16, |e| {
            matches!(e, Event::ConnRestored | Event::ConnOnline)
        });
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sub.recv() => self.retry_pending().await,
            }
        }
    }
}

#[cfg(test)]
#[path = "features_tests.rs"]
mod tests;

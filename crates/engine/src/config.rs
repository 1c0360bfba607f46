// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Config distributor: fans target-state config out to its consumers.
//!
//! Every target change is diffed section-by-section against the last
//! applied config. Valid changes are applied and announced on the bus;
//! invalid values are rejected with a log line and the previous applied
//! value stays in force.

use crate::driver::ContainerDriver;
use crate::features::FeatureSupervisor;
use crate::intervals::Intervals;
use crate::reconciler::Reconciler;
use fleetd_core::{
    DeviceConfig, Event, EventBus, FeatureKind, FeatureToggle, IntervalChange, IntervalKind,
    LogLevel,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct ConfigDistributor {
    bus: EventBus,
    intervals: Intervals,
    supervisor: Arc<FeatureSupervisor>,
    applied: Mutex<DeviceConfig>,
}

impl ConfigDistributor {
    pub fn new(bus: EventBus, intervals: Intervals, supervisor: Arc<FeatureSupervisor>) -> Self {
        Self {
            bus,
            intervals,
            supervisor,
            applied: Mutex::new(DeviceConfig::default()),
        }
    }

    /// The config as actually applied (invalid values excluded).
    pub fn applied(&self) -> DeviceConfig {
        self.applied.lock().clone()
    }

    /// Diff `incoming` against the applied config and apply every valid
    /// change.
    pub async fn apply(&self, incoming: &DeviceConfig) {
        let previous = self.applied();

        self.apply_logging(incoming, &previous);
        self.apply_settings(incoming, &previous);
        self.apply_features(incoming, &previous).await;
        self.apply_unknown_sections(incoming, &previous);
    }

    fn apply_logging(&self, incoming: &DeviceConfig, previous: &DeviceConfig) {
        let Some(raw) = incoming.logging_level() else {
            return;
        };
        if previous.logging_level() == Some(raw) {
            return;
        }
        match LogLevel::parse(raw) {
            Some(level) => {
                let mut applied = self.applied.lock();
                applied.sections.insert(
                    "logging".to_string(),
                    serde_json::json!({ "level": level.as_str() }),
                );
                drop(applied);
                tracing::info!(level = %level, "log level changed by config");
                self.bus.publish(Event::LoggingChanged { level });
            }
            None => {
                tracing::warn!(level = raw, "unknown log level in config, keeping previous");
            }
        }
    }

    fn apply_settings(&self, incoming: &DeviceConfig, previous: &DeviceConfig) {
        let mut changed = Vec::new();
        for kind in IntervalKind::ALL {
            let key = kind.setting_key();
            let Some(ms) = incoming.setting_ms(key) else {
                continue;
            };
            if previous.setting_ms(key) == Some(ms) {
                continue;
            }
            if self.intervals.set(kind, ms) {
                changed.push(IntervalChange { kind, ms });
            }
        }
        if changed.is_empty() {
            return;
        }
        {
            let mut applied = self.applied.lock();
            let section = applied
                .sections
                .entry("settings".to_string())
                .or_insert_with(|| serde_json::json!({}));
            if let Some(map) = section.as_object_mut() {
                for change in &changed {
                    map.insert(
                        change.kind.setting_key().to_string(),
                        serde_json::json!(change.ms),
                    );
                }
            }
        }
        self.bus.publish(Event::SettingsChanged { changed });
    }

    async fn apply_features(&self, incoming: &DeviceConfig, previous: &DeviceConfig) {
        let mut toggles = Vec::new();
        for feature in FeatureKind::ALL {
            let key = feature.setting_key();
            let Some(enabled) = incoming.feature_enabled(key) else {
                continue;
            };
            if previous.feature_enabled(key) == Some(enabled) {
                continue;
            }
            self.supervisor.set_enabled(feature, enabled).await;
            toggles.push(FeatureToggle { feature, enabled });
        }
        if toggles.is_empty() {
            return;
        }
        {
            let mut applied = self.applied.lock();
            let section = applied
                .sections
                .entry("features".to_string())
                .or_insert_with(|| serde_json::json!({}));
            if let Some(map) = section.as_object_mut() {
                for toggle in &toggles {
                    map.insert(
                        toggle.feature.setting_key().to_string(),
                        serde_json::json!(toggle.enabled),
                    );
                }
            }
        }
        self.bus.publish(Event::FeaturesChanged { toggles });
    }

    /// Unknown sections are stored verbatim and announced opaquely, so
    /// adapter-specific consumers can react without the core knowing them.
    fn apply_unknown_sections(&self, incoming: &DeviceConfig, previous: &DeviceConfig) {
        for (name, value) in &incoming.sections {
            if matches!(name.as_str(), "logging" | "settings" | "features") {
                continue;
            }
            if previous.section(name) == Some(value) {
                continue;
            }
            self.applied
                .lock()
                .sections
                .insert(name.clone(), value.clone());
            tracing::info!(section = name, "config section changed");
            self.bus.publish(Event::SectionChanged {
                section: name.clone(),
            });
        }
    }
}

/// Distribution loop: on every target change, apply its config and hand
/// the applied snapshot back to the reconciler for reporting.
pub async fn run_distributor<D: ContainerDriver>(
    distributor: Arc<ConfigDistributor>,
    reconciler: Arc<Reconciler<D>>,
    cancel: CancellationToken,
) {
    let sub = distributor
        .bus
        .subscribe_filtered("config-distributor", 16, |e| {
            matches!(e, Event::TargetChanged { .. })
        });
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sub.recv() => {
                let Some(target) = reconciler.target_state() else {
                    continue;
                };
                distributor.apply(&target.config).await;
                reconciler.note_applied_config(distributor.applied());
            }
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

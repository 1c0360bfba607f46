// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Target state, current state and the reports derived from them.
//!
//! The cloud owns target state; the device owns current state. A report is
//! the device's projection of current state onto the wire, diffed against
//! the last successful send so steady state costs no traffic.

use crate::app::AppSpec;
use crate::device_config::DeviceConfig;
use crate::health::FeatureHealth;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

/// Errors decoding cloud wire bodies
#[derive(Debug, Error)]
pub enum WireError {
    #[error("target state body has no entry for this device")]
    MissingDevice,
    #[error("target state body malformed: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Desired device state as defined by the cloud.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TargetState {
    #[serde(default)]
    pub apps: BTreeMap<String, AppSpec>,
    #[serde(default)]
    pub config: DeviceConfig,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub needs_deployment: bool,
}

impl TargetState {
    /// Decode a poll response body: `{ "<uuid>": { apps, config, version, … } }`.
    pub fn from_wire(uuid: &Uuid, body: &serde_json::Value) -> Result<Self, WireError> {
        let entry = body
            .get(uuid.to_string())
            .ok_or(WireError::MissingDevice)?;
        Ok(serde_json::from_value(entry.clone())?)
    }
}

/// Observed device state.
///
/// `version` mirrors the highest target version the device has accepted;
/// it is echoed back in every report so the cloud knows what the device
/// has seen.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CurrentState {
    #[serde(default)]
    pub apps: BTreeMap<String, AppSpec>,
    #[serde(default)]
    pub config: DeviceConfig,
    #[serde(default)]
    pub version: u64,
}

/// System metrics attached to a report at most once per metrics interval.
///
/// All fields optional; the flattened encoding puts them at the top level
/// of the report body per the cloud API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_usage: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_usage: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub top_processes: Vec<ProcessSample>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_interfaces: Vec<String>,
}

impl SystemMetrics {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One process in the top-processes metrics attachment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub name: String,
    pub cpu: f32,
    pub memory: u64,
}

/// Device state report, sent to the cloud when it differs from the last
/// successful send or when metrics are due.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateReport {
    #[serde(default)]
    pub apps: BTreeMap<String, AppSpec>,
    #[serde(default)]
    pub config: DeviceConfig,
    #[serde(default)]
    pub version: u64,
    pub is_online: bool,
    /// Static fields, set only when changed since the last successful send.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_ip: Option<String>,
    #[serde(flatten)]
    pub metrics: SystemMetrics,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub feature_health: BTreeMap<String, FeatureHealth>,
}

impl StateReport {
    /// Build the base report from current state; metrics and static fields
    /// are attached by the sender when due.
    pub fn from_current(current: &CurrentState, is_online: bool) -> Self {
        Self {
            apps: current.apps.clone(),
            config: current.config.clone(),
            version: current.version,
            is_online,
            ..Default::default()
        }
    }

    /// Apps with runtime observations removed, the projection used for
    /// diffing. Container recreations keep the diff empty.
    pub fn stripped_apps(&self) -> BTreeMap<String, AppSpec> {
        self.apps
            .iter()
            .map(|(id, app)| {
                let mut app = app.clone();
                for svc in app.services.values_mut() {
                    *svc = svc.without_runtime();
                }
                (id.clone(), app)
            })
            .collect()
    }

    /// Whether this report warrants a send relative to the last one sent.
    ///
    /// Runtime fields are excluded; metrics never participate (they have
    /// their own due timer); static fields participate by presence since
    /// the sender only sets them on change.
    pub fn differs_from(&self, last: &StateReport) -> bool {
        self.stripped_apps() != last.stripped_apps()
            || self.config != last.config
            || self.version != last.version
            || self.is_online != last.is_online
            || self.os_version.is_some()
            || self.agent_version.is_some()
            || self.local_ip.is_some()
    }

    /// PATCH body: `{ "<uuid>": { …report… } }`.
    pub fn to_wire(&self, uuid: &Uuid) -> serde_json::Value {
        serde_json::json!({ uuid.to_string(): self })
    }

    /// Drop verbose payload before queueing offline: per-service
    /// environment and labels, and the top-processes sample.
    pub fn strip_verbose(mut self) -> Self {
        for app in self.apps.values_mut() {
            for svc in app.services.values_mut() {
                svc.config.environment.clear();
                svc.config.labels.clear();
            }
        }
        self.metrics.top_processes.clear();
        self
    }
}

/// A report parked on disk while the cloud is unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedReport {
    pub report: StateReport,
    pub enqueued_at_ms: u64,
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;

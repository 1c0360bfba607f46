// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device configuration delivered inside target state.
//!
//! A config is a map from section name to section body. The agent
//! recognizes `logging`, `settings` and `features`; unknown sections are
//! preserved verbatim so newer cloud versions can ship config this agent
//! version does not understand yet.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Section map. Recognized sections get typed accessors; everything else
/// rides along untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceConfig {
    pub sections: BTreeMap<String, serde_json::Value>,
}

impl DeviceConfig {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, name: &str) -> Option<&serde_json::Value> {
        self.sections.get(name)
    }

    /// `logging.level`, unvalidated.
    pub fn logging_level(&self) -> Option<&str> {
        self.section("logging")?.get("level")?.as_str()
    }

    /// A `settings.*IntervalMs` value, unvalidated.
    pub fn setting_ms(&self, key: &str) -> Option<u64> {
        self.section("settings")?.get(key)?.as_u64()
    }

    /// A `features.enable*` value.
    pub fn feature_enabled(&self, key: &str) -> Option<bool> {
        self.section("features")?.get(key)?.as_bool()
    }

    /// Section names present in either config, for section-wise diffing.
    pub fn section_names<'a>(&'a self, other: &'a DeviceConfig) -> Vec<&'a str> {
        let mut names: Vec<&str> = self.sections.keys().map(String::as_str).collect();
        for name in other.sections.keys() {
            if !self.sections.contains_key(name) {
                names.push(name);
            }
        }
        names.sort_unstable();
        names
    }
}

/// Log level recognized by `logging.level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The timer a `settings.*IntervalMs` key rewires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalKind {
    Reconciliation,
    TargetPoll,
    Report,
    Metrics,
    JobsPoll,
    ShadowPublish,
}

impl IntervalKind {
    pub const ALL: [IntervalKind; 6] = [
        IntervalKind::Reconciliation,
        IntervalKind::TargetPoll,
        IntervalKind::Report,
        IntervalKind::Metrics,
        IntervalKind::JobsPoll,
        IntervalKind::ShadowPublish,
    ];

    /// The `settings` key carrying this interval.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Self::Reconciliation => "reconciliationIntervalMs",
            Self::TargetPoll => "targetStatePollIntervalMs",
            Self::Report => "deviceReportIntervalMs",
            Self::Metrics => "metricsIntervalMs",
            Self::JobsPoll => "cloudJobsPollingIntervalMs",
            Self::ShadowPublish => "shadowPublishIntervalMs",
        }
    }

    /// Smallest accepted value. Guards against a config typo turning a
    /// timer into a busy loop.
    pub fn floor_ms(&self) -> u64 {
        match self {
            Self::Report => 10_000,
            _ => 1_000,
        }
    }
}

impl fmt::Display for IntervalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.setting_key())
    }
}

/// An applied interval change, carried on the settings-changed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalChange {
    pub kind: IntervalKind,
    pub ms: u64,
}

/// A feature whose lifecycle `features.enable*` toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    RemoteAccess,
    JobEngine,
    CloudJobs,
    SensorPublish,
    ProtocolAdapters,
    Shadow,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 6] = [
        FeatureKind::RemoteAccess,
        FeatureKind::JobEngine,
        FeatureKind::CloudJobs,
        FeatureKind::SensorPublish,
        FeatureKind::ProtocolAdapters,
        FeatureKind::Shadow,
    ];

    /// The `features` key toggling this feature.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Self::RemoteAccess => "enableRemoteAccess",
            Self::JobEngine => "enableJobEngine",
            Self::CloudJobs => "enableCloudJobs",
            Self::SensorPublish => "enableSensorPublish",
            Self::ProtocolAdapters => "enableProtocolAdapters",
            Self::Shadow => "enableShadow",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::RemoteAccess => "remote-access",
            Self::JobEngine => "job-engine",
            Self::CloudJobs => "cloud-jobs",
            Self::SensorPublish => "sensor-publish",
            Self::ProtocolAdapters => "protocol-adapters",
            Self::Shadow => "shadow",
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A feature toggle applied from config, carried on the features-changed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureToggle {
    pub feature: FeatureKind,
    pub enabled: bool,
}

/// Startup defaults for every tunable the config can rewire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub reconciliation_interval_ms: u64,
    pub target_poll_interval_ms: u64,
    pub report_interval_ms: u64,
    pub metrics_interval_ms: u64,
    pub jobs_poll_interval_ms: u64,
    pub shadow_publish_interval_ms: u64,
    /// Timeout on every cloud HTTP request.
    pub api_timeout_ms: u64,
    /// Timeout on a job step handler unless the job document overrides it.
    pub handler_timeout_ms: u64,
    /// Offline queue cap, in queued reports.
    pub queue_cap: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            reconciliation_interval_ms: 30_000,
            target_poll_interval_ms: 60_000,
            report_interval_ms: 10_000,
            metrics_interval_ms: 300_000,
            jobs_poll_interval_ms: 30_000,
            shadow_publish_interval_ms: 60_000,
            api_timeout_ms: 30_000,
            handler_timeout_ms: 60_000,
            queue_cap: 256,
        }
    }
}

impl AgentSettings {
    pub fn interval_ms(&self, kind: IntervalKind) -> u64 {
        match kind {
            IntervalKind::Reconciliation => self.reconciliation_interval_ms,
            IntervalKind::TargetPoll => self.target_poll_interval_ms,
            IntervalKind::Report => self.report_interval_ms,
            IntervalKind::Metrics => self.metrics_interval_ms,
            IntervalKind::JobsPoll => self.jobs_poll_interval_ms,
            IntervalKind::ShadowPublish => self.shadow_publish_interval_ms,
        }
    }
}

#[cfg(test)]
#[path = "device_config_tests.rs"]
mod tests;

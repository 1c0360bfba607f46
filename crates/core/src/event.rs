// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events exchanged between agent components over the bus.
//!
//! Serializes with `{"type": "topic:name", ...fields}` format. Unknown
//! type tags deserialize to `Custom`.

use crate::device_config::{FeatureKind, FeatureToggle, IntervalChange, LogLevel};
use crate::job::{DeliveryMode, JobStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    // -- target / current state --
    #[serde(rename = "target:changed")]
    TargetChanged { version: u64 },

    #[serde(rename = "current:changed")]
    CurrentChanged,

    // -- reconciliation --
    #[serde(rename = "reconcile:complete")]
    ReconcileComplete { actions: usize, failures: usize },

    #[serde(rename = "service:unhealthy")]
    ServiceUnhealthy {
        app_id: String,
        service_id: String,
        consecutive_failures: u32,
    },

    // -- connection --
    #[serde(rename = "connection:online")]
    ConnOnline,

    #[serde(rename = "connection:degraded")]
    ConnDegraded,

    #[serde(rename = "connection:offline")]
    ConnOffline { since_ms: u64 },

    /// Emitted alongside `connection:online` when recovering from offline;
    /// the sync engine drains the offline queue on this.
    #[serde(rename = "connection:restored")]
    ConnRestored,

    // -- config distribution --
    #[serde(rename = "config:logging")]
    LoggingChanged { level: LogLevel },

    #[serde(rename = "config:settings")]
    SettingsChanged { changed: Vec<IntervalChange> },

    #[serde(rename = "config:features")]
    FeaturesChanged { toggles: Vec<FeatureToggle> },

    /// An unrecognized config section changed; carried opaquely for
    /// adapter-specific subscribers.
    #[serde(rename = "config:section")]
    SectionChanged { section: String },

    // -- features --
    #[serde(rename = "feature:started")]
    FeatureStarted { feature: FeatureKind },

    #[serde(rename = "feature:stopped")]
    FeatureStopped { feature: FeatureKind },

    #[serde(rename = "feature:failed")]
    FeatureFailed { feature: FeatureKind, error: String },

    // -- jobs --
    #[serde(rename = "job:received")]
    JobReceived {
        job_id: String,
        version_number: u64,
        execution_number: u64,
    },

    #[serde(rename = "job:status")]
    JobStatusChanged { job_id: String, status: JobStatus },

    #[serde(rename = "jobs:mode")]
    JobsModeChanged { mode: DeliveryMode },

    // -- sync --
    #[serde(rename = "report:queued")]
    ReportQueued { seq: u64 },

    #[serde(rename = "queue:drained")]
    QueueDrained { sent: usize, remaining: usize },

    // -- system --
    #[serde(rename = "system:shutdown")]
    Shutdown,

    /// Catch-all for unknown event types (extensibility)
    #[serde(other, skip_serializing)]
    Custom,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::TargetChanged { .. } => "target:changed",
            Event::CurrentChanged => "current:changed",
            Event::ReconcileComplete { .. } => "reconcile:complete",
            Event::ServiceUnhealthy { .. } => "service:unhealthy",
            Event::ConnOnline => "connection:online",
            Event::ConnDegraded => "connection:degraded",
            Event::ConnOffline { .. } => "connection:offline",
            Event::ConnRestored => "connection:restored",
            Event::LoggingChanged { .. } => "config:logging",
            Event::SettingsChanged { .. } => "config:settings",
            Event::FeaturesChanged { .. } => "config:features",
            Event::SectionChanged { .. } => "config:section",
            Event::FeatureStarted { .. } => "feature:started",
            Event::FeatureStopped { .. } => "feature:stopped",
            Event::FeatureFailed { .. } => "feature:failed",
            Event::JobReceived { .. } => "job:received",
            Event::JobStatusChanged { .. } => "job:status",
            Event::JobsModeChanged { .. } => "jobs:mode",
            Event::ReportQueued { .. } => "report:queued",
            Event::QueueDrained { .. } => "queue:drained",
            Event::Shutdown => "system:shutdown",
            Event::Custom => "custom",
        }
    }

    pub fn log_summary(&self) -> String {
        let t = self.name();
        match self {
            Event::TargetChanged { version } => format!("{t} version={version}"),
            Event::ReconcileComplete { actions, failures } => {
                format!("{t} actions={actions} failures={failures}")
            }
            Event::ServiceUnhealthy {
                app_id,
                service_id,
                consecutive_failures,
            } => format!("{t} app={app_id} service={service_id} failures={consecutive_failures}"),
            Event::ConnOffline { since_ms } => format!("{t} since_ms={since_ms}"),
            Event::LoggingChanged { level } => format!("{t} level={level}"),
            Event::SettingsChanged { changed } => format!("{t} count={}", changed.len()),
            Event::FeaturesChanged { toggles } => format!("{t} count={}", toggles.len()),
            Event::SectionChanged { section } => format!("{t} section={section}"),
            Event::FeatureStarted { feature }
            | Event::FeatureStopped { feature } => format!("{t} feature={feature}"),
            Event::FeatureFailed { feature, error } => {
                format!("{t} feature={feature} error={error}")
            }
            Event::JobReceived {
                job_id,
                version_number,
                execution_number,
            } => format!("{t} job={job_id} v={version_number} x={execution_number}"),
            Event::JobStatusChanged { job_id, status } => {
                format!("{t} job={job_id} status={status}")
            }
            Event::JobsModeChanged { mode } => format!("{t} mode={mode}"),
            Event::ReportQueued { seq } => format!("{t} seq={seq}"),
            Event::QueueDrained { sent, remaining } => {
                format!("{t} sent={sent} remaining={remaining}")
            }
            _ => t.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;

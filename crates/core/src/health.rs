// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection and feature health snapshots

use serde::{Deserialize, Serialize};

/// Derived connectivity status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnStatus {
    Online,
    Degraded,
    Offline,
}

/// Snapshot of connection health as tracked by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub status: ConnStatus,
    /// Lifetime success ratio of target-state polls, 0.0–1.0.
    pub poll_success_rate: f64,
    /// Lifetime success ratio of state reports, 0.0–1.0.
    pub report_success_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_poll_success_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_report_success_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offline_since_ms: Option<u64>,
}

/// Health snapshot of one supervised feature, attached to reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureHealth {
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

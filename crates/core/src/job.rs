// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud job model: deliveries, documents and the status machine.
//!
//! A delivery is uniquely identified by `(job_id, version_number,
//! execution_number)`; duplicates arriving over either transport are
//! discarded. Status transitions are monotone: QUEUED → IN_PROGRESS →
//! one terminal state, never backwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution status of a job. Wire values are SCREAMING_SNAKE per the
/// cloud API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Queued,
    InProgress,
    Succeeded,
    Failed,
    TimedOut,
    Canceled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::TimedOut | Self::Canceled
        )
    }

    /// Monotone transition check: forward only, terminal states absorb.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            Self::Queued => next != Self::Queued,
            Self::InProgress => next.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::InProgress => "IN_PROGRESS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::TimedOut => "TIMED_OUT",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// One step of a job document: a named handler plus its input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStep {
    pub action: StepAction,
}

/// The action a step invokes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepAction {
    /// Handler name, resolved against the handler directory.
    #[serde(rename = "type")]
    pub kind: String,
    /// Handler input, passed through verbatim.
    #[serde(default)]
    pub input: serde_json::Value,
}

/// Ordered list of steps executed sequentially.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobDocument {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub steps: Vec<JobStep>,
}

/// A job delivery as received from either transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionData {
    pub job_id: String,
    #[serde(default)]
    pub device_uuid: String,
    #[serde(default)]
    pub job_document: JobDocument,
    #[serde(default = "default_status")]
    pub status: JobStatus,
    #[serde(default)]
    pub version_number: u64,
    #[serde(default)]
    pub execution_number: u64,
    /// Per-job handler timeout override, seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

fn default_status() -> JobStatus {
    JobStatus::Queued
}

impl JobExecutionData {
    /// The dedupe key: one execution per key, ever.
    pub fn delivery_key(&self) -> (String, u64, u64) {
        (
            self.job_id.clone(),
            self.version_number,
            self.execution_number,
        )
    }
}

/// Status update published to the cloud on start and completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusUpdate {
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_details: Option<String>,
}

impl JobStatusUpdate {
    pub fn in_progress() -> Self {
        Self {
            status: JobStatus::InProgress,
            exit_code: None,
            stdout: None,
            stderr: None,
            status_details: None,
        }
    }
}

/// Which transport currently delivers jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Mqtt,
    Http,
}

impl std::fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Mqtt => "mqtt",
            Self::Http => "http",
        })
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;

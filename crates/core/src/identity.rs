// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Device identity: the stable credentials and versions the agent carries.
//!
//! Identity is established by provisioning before the agent starts; the
//! agent only loads and validates it. A missing or unreadable identity is
//! fatal at startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Errors loading or validating a device identity
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file unreadable: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity file malformed: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("identity missing API key")]
    MissingApiKey,
}

/// Stable identity of this device, loaded once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub uuid: Uuid,
    pub api_key: String,
    /// Broker endpoint, e.g. `mqtt://broker.example.com:1883`.
    /// Absent when the fleet runs HTTP-only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broker_password: Option<String>,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub agent_version: String,
}

impl DeviceIdentity {
    /// Load and validate an identity file (JSON).
    pub fn load(path: &Path) -> Result<Self, IdentityError> {
        let raw = std::fs::read_to_string(path)?;
        let identity: Self = serde_json::from_str(&raw)?;
        identity.validate()?;
        Ok(identity)
    }

    fn validate(&self) -> Result<(), IdentityError> {
        if self.api_key.is_empty() {
            return Err(IdentityError::MissingApiKey);
        }
        Ok(())
    }

    /// Broker client id: `device_{uuid}`.
    pub fn client_id(&self) -> String {
        format!("device_{}", self.uuid)
    }

    /// Topic the cloud publishes job notifications on.
    pub fn jobs_notify_topic(&self) -> String {
        format!("iot/device/{}/jobs/notify-next", self.uuid)
    }

    /// Topic the device publishes state reports on.
    pub fn state_topic(&self) -> String {
        format!("iot/device/{}/state", self.uuid)
    }

    /// Topic the device publishes job status updates on.
    pub fn job_update_topic(&self, job_id: &str) -> String {
        format!("iot/device/{}/jobs/{}/update", self.uuid, job_id)
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;

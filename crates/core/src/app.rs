// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Application and service specifications.
//!
//! An app is a named group of services; a service maps to one container.
//! The config fingerprint hashes only the fields that require a container
//! recreate when changed. Runtime observations (container id, status) are
//! excluded so restarts and recreations do not churn the diff.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Desired or observed application: a group of services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSpec {
    pub app_id: String,
    #[serde(default)]
    pub app_name: String,
    /// Keyed by service id. Order of services within an app is insignificant.
    #[serde(default)]
    pub services: BTreeMap<String, ServiceSpec>,
}

impl AppSpec {
    pub fn new(app_id: impl Into<String>, app_name: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_name: app_name.into(),
            services: BTreeMap::new(),
        }
    }
}

/// One service of an app; maps to a single container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub service_id: String,
    #[serde(default)]
    pub service_name: String,
    pub image_name: String,
    #[serde(default)]
    pub config: ServiceConfig,
    /// Observed container id. Runtime-only; never part of the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    /// Observed container status. Runtime-only; never part of the fingerprint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ServiceStatus>,
}

impl ServiceSpec {
    /// Strip runtime observations, keeping only configuration.
    pub fn without_runtime(&self) -> Self {
        Self {
            container_id: None,
            status: None,
            ..self.clone()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == Some(ServiceStatus::Running)
    }

    /// Fingerprint over the configuration-relevant fields.
    ///
    /// Two services with equal fingerprints can share a container; a
    /// fingerprint change means the container must be recreated.
    pub fn fingerprint(&self) -> String {
        #[derive(Serialize)]
        struct Relevant<'a> {
            image: &'a str,
            ports: Vec<String>,
            volumes: Vec<String>,
            networks: Vec<String>,
            environment: &'a BTreeMap<String, String>,
            network_mode: &'a Option<String>,
            restart: &'a RestartPolicy,
            labels: &'a BTreeMap<String, String>,
        }
        let mut ports = self.config.ports.clone();
        ports.sort();
        let mut volumes = self.config.volumes.clone();
        volumes.sort();
        let mut networks = self.config.networks.clone();
        networks.sort();
        let relevant = Relevant {
            image: &self.image_name,
            ports,
            volumes,
            networks,
            environment: &self.config.environment,
            network_mode: &self.config.network_mode,
            restart: &self.config.restart,
            labels: &self.config.labels,
        };
        // BTreeMap fields keep the canonical JSON stable across rebuilds.
        let canonical = serde_json::to_string(&relevant).unwrap_or_default();
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

/// Container configuration for a service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Port mappings, `"host:container"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    /// Volume mappings, `"volume:/path"`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default)]
    pub restart: RestartPolicy,
    /// Names of services that must be up before this one starts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

/// Container restart policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    Always,
    UnlessStopped,
    OnFailure,
    No,
}

/// Observed container status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Running,
    Stopped,
    Exited,
    Downloading,
    Installing,
}

#[cfg(test)]
#[path = "app_tests.rs"]
mod tests;

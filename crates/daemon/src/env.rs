// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment configuration for the daemon.

use std::path::PathBuf;

/// Paths and endpoints resolved from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEnv {
    /// Cloud API base URL (`FLEETD_API_URL`).
    pub api_url: String,
    /// Directory for the offline queue and ETag cache (`FLEETD_STATE_DIR`).
    pub state_dir: PathBuf,
    /// Device identity file (`FLEETD_IDENTITY`).
    pub identity_path: PathBuf,
    /// Directory of job action handlers (`FLEETD_HANDLER_DIR`).
    pub handler_dir: PathBuf,
    /// Initial log filter (`FLEETD_LOG`), EnvFilter syntax.
    pub log_filter: String,
}

impl AgentEnv {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());
        Self {
            api_url: var("FLEETD_API_URL", "http://127.0.0.1:3000"),
            state_dir: PathBuf::from(var("FLEETD_STATE_DIR", "/var/lib/fleetd")),
            identity_path: PathBuf::from(var("FLEETD_IDENTITY", "/etc/fleetd/identity.json")),
            handler_dir: PathBuf::from(var("FLEETD_HANDLER_DIR", "/usr/lib/fleetd/handlers")),
            log_filter: var("FLEETD_LOG", "info"),
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;

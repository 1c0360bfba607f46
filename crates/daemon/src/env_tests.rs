// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn defaults_apply_when_unset() {
    let env = AgentEnv::from_lookup(|_| None);
    assert_eq!(env.api_url, "http://127.0.0.1:3000");
    assert_eq!(env.state_dir, PathBuf::from("/var/lib/fleetd"));
    assert_eq!(env.identity_path, PathBuf::from("/etc/fleetd/identity.json"));
    assert_eq!(env.log_filter, "info");
}

#[test]
fn environment_overrides_defaults() {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("FLEETD_API_URL", "https://cloud.example"),
        ("FLEETD_STATE_DIR", "/tmp/fleet-state"),
        ("FLEETD_LOG", "fleetd_engine=debug,info"),
    ]);
    let env = AgentEnv::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
    assert_eq!(env.api_url, "https://cloud.example");
    assert_eq!(env.state_dir, PathBuf::from("/tmp/fleet-state"));
    assert_eq!(env.log_filter, "fleetd_engine=debug,info");
    // Untouched keys keep defaults
    assert_eq!(env.handler_dir, PathBuf::from("/usr/lib/fleetd/handlers"));
}

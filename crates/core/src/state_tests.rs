// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::app::{ServiceSpec, ServiceStatus};
use serde_json::json;

fn uuid() -> Uuid {
    Uuid::nil()
}

fn web_service() -> ServiceSpec {
    ServiceSpec {
        service_id: "1".into(),
        service_name: "web".into(),
        image_name: "nginx:1.25".into(),
        config: Default::default(),
        container_id: None,
        status: None,
    }
}

fn current_with_app() -> CurrentState {
    let mut app = AppSpec::new("1001", "edge-app");
    let mut svc = web_service();
    svc.container_id = Some("cafe".into());
    svc.status = Some(ServiceStatus::Running);
    app.services.insert(svc.service_id.clone(), svc);
    CurrentState {
        apps: BTreeMap::from([("1001".to_string(), app)]),
        config: Default::default(),
        version: 2,
    }
}

// ---------------------------------------------------------------------------
// Wire decode
// ---------------------------------------------------------------------------

#[test]
fn target_from_wire_picks_this_device() {
    let body = json!({
        "00000000-0000-0000-0000-000000000000": {
            "apps": {},
            "config": {},
            "version": 7,
        }
    });
    let target = TargetState::from_wire(&uuid(), &body).unwrap();
    assert_eq!(target.version, 7);
    assert!(target.apps.is_empty());
    assert!(!target.needs_deployment);
}

#[test]
fn target_from_wire_missing_device_errors() {
    let body = json!({ "some-other-device": {} });
    assert!(matches!(
        TargetState::from_wire(&uuid(), &body),
        Err(WireError::MissingDevice)
    ));
}

#[test]
fn target_from_wire_parses_apps_and_config() {
    let body = json!({
        "00000000-0000-0000-0000-000000000000": {
            "apps": {
                "1001": {
                    "app_id": "1001",
                    "app_name": "edge-app",
                    "services": {
                        "1": {
                            "service_id": "1",
                            "service_name": "web",
                            "image_name": "nginx:1.25",
                            "config": { "ports": ["8080:80"] }
                        }
                    }
                }
            },
            "config": { "logging": { "level": "debug" } },
            "version": 2,
            "needs_deployment": true,
        }
    });
    let target = TargetState::from_wire(&uuid(), &body).unwrap();
    assert!(target.needs_deployment);
    let app = &target.apps["1001"];
    assert_eq!(app.services["1"].image_name, "nginx:1.25");
    assert_eq!(target.config.logging_level(), Some("debug"));
}

// ---------------------------------------------------------------------------
// Report diffing
// ---------------------------------------------------------------------------

#[test]
fn identical_reports_do_not_differ() {
    let report = StateReport::from_current(&current_with_app(), true);
    assert!(!report.clone().differs_from(&report));
}

#[test]
fn runtime_field_changes_do_not_differ() {
    let current = current_with_app();
    let last = StateReport::from_current(&current, true);

    // Container recreated: new id, same config
    let mut recreated = current.clone();
    if let Some(svc) = recreated
        .apps
        .get_mut("1001")
        .and_then(|a| a.services.get_mut("1"))
    {
        svc.container_id = Some("beef".into());
    }
    let report = StateReport::from_current(&recreated, true);
    assert!(!report.differs_from(&last));
}

#[test]
fn config_change_differs() {
    let current = current_with_app();
    let last = StateReport::from_current(&current, true);
    let mut changed = current.clone();
    if let Some(svc) = changed
        .apps
        .get_mut("1001")
        .and_then(|a| a.services.get_mut("1"))
    {
        svc.config.ports = vec!["8090:80".into()];
    }
    let report = StateReport::from_current(&changed, true);
    assert!(report.differs_from(&last));
}

#[test]
fn version_and_online_flag_differ() {
    let current = current_with_app();
    let last = StateReport::from_current(&current, true);

    let mut bumped = current.clone();
    bumped.version = 3;
    assert!(StateReport::from_current(&bumped, true).differs_from(&last));

    assert!(StateReport::from_current(&current, false).differs_from(&last));
}

#[test]
fn static_fields_differ_by_presence() {
    let current = current_with_app();
    let last = StateReport::from_current(&current, true);
    let mut report = StateReport::from_current(&current, true);
    report.local_ip = Some("10.0.0.17".into());
    assert!(report.differs_from(&last));
}

// ---------------------------------------------------------------------------
// Wire encode and stripping
// ---------------------------------------------------------------------------

#[test]
fn wire_body_is_keyed_by_uuid() {
    let report = StateReport::from_current(&current_with_app(), true);
    let wire = report.to_wire(&uuid());
    let entry = &wire["00000000-0000-0000-0000-000000000000"];
    assert_eq!(entry["version"], 2);
    assert_eq!(entry["is_online"], true);
    // Metrics not due: none of the flattened fields appear
    assert!(entry.get("cpu_usage").is_none());
}

#[test]
fn strip_verbose_drops_env_labels_and_processes() {
    let mut current = current_with_app();
    if let Some(svc) = current
        .apps
        .get_mut("1001")
        .and_then(|a| a.services.get_mut("1"))
    {
        svc.config.environment.insert("SECRETISH".into(), "x".into());
        svc.config.labels.insert("io.fleet".into(), "1".into());
    }
    let mut report = StateReport::from_current(&current, true);
    report.metrics.top_processes = vec![ProcessSample {
        name: "fleetd".into(),
        cpu: 1.5,
        memory: 10_000,
    }];

    let stripped = report.strip_verbose();
    let svc = &stripped.apps["1001"].services["1"];
    assert!(svc.config.environment.is_empty());
    assert!(svc.config.labels.is_empty());
    assert!(stripped.metrics.top_processes.is_empty());
}

#[test]
fn queued_report_round_trips() {
    let queued = QueuedReport {
        report: StateReport::from_current(&current_with_app(), false).strip_verbose(),
        enqueued_at_ms: 1_700_000_000_000,
    };
    let raw = serde_json::to_string(&queued).unwrap();
    let back: QueuedReport = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, queued);
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn sample() -> DeviceIdentity {
    DeviceIdentity {
        uuid: Uuid::nil(),
        api_key: "key-123".into(),
        broker_url: Some("mqtt://broker.local:1883".into()),
        broker_username: None,
        broker_password: None,
        os_version: "balenaOS 5.1".into(),
        agent_version: "0.1.0".into(),
    }
}

#[test]
fn load_round_trips_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    std::fs::write(&path, serde_json::to_string(&sample()).unwrap()).unwrap();
    let loaded = DeviceIdentity::load(&path).unwrap();
    assert_eq!(loaded, sample());
}

#[test]
fn load_rejects_empty_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.json");
    let mut identity = sample();
    identity.api_key = String::new();
    std::fs::write(&path, serde_json::to_string(&identity).unwrap()).unwrap();
    assert!(matches!(
        DeviceIdentity::load(&path),
        Err(IdentityError::MissingApiKey)
    ));
}

#[test]
fn load_missing_file_is_io_error() {
    assert!(matches!(
        DeviceIdentity::load(Path::new("/nonexistent/identity.json")),
        Err(IdentityError::Io(_))
    ));
}

#[test]
fn topics_embed_the_uuid() {
    let identity = sample();
    assert_eq!(
        identity.state_topic(),
        "iot/device/00000000-0000-0000-0000-000000000000/state"
    );
    assert_eq!(
        identity.job_update_topic("j-1"),
        "iot/device/00000000-0000-0000-0000-000000000000/jobs/j-1/update"
    );
    assert!(identity.jobs_notify_topic().ends_with("/jobs/notify-next"));
    assert!(identity.client_id().starts_with("device_"));
}

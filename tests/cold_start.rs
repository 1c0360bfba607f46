// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cold start against an empty fleet registry: the first poll brings an
//! empty target, nothing is deployed, and exactly one report goes out.

use crate::support::Fleet;
use fleetd_core::TargetState;

#[tokio::test]
async fn cold_start_empty_registry() {
    let fleet = Fleet::new();
    fleet.cloud.set_target(
        TargetState {
            version: 1,
            ..Default::default()
        },
        "\"v1\"",
    );

    // First poll accepts the empty target
    assert!(fleet.sync.poll_once().await.unwrap());
    assert_eq!(fleet.reconciler.current_state().version, 1);

    // Reconciliation has nothing to do
    let summary = fleet.reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.actions, 0);
    assert!(fleet.driver.applied().is_empty());

    // One report: empty apps, version 1, online
    assert!(fleet.sync.report_once().await.unwrap());
    let entry = fleet.report_entry(0);
    assert_eq!(entry["apps"], serde_json::json!({}));
    assert_eq!(entry["config"], serde_json::json!({}));
    assert_eq!(entry["version"], 1);
    assert_eq!(entry["is_online"], true);

    fleet.shutdown().await;
}

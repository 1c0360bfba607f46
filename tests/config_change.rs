// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Port-only config change: same image, new port mapping. The service is
//! recreated without a pull and the next report reflects the new config.

use crate::support::{nginx_target, Fleet};

#[tokio::test]
async fn port_change_recreates_without_pull() {
    let fleet = Fleet::new();

    // Converge on v2 with 8080:80 and report it
    fleet.cloud.set_target(nginx_target(2, "8080:80"), "\"v2\"");
    fleet.sync.poll_once().await.unwrap();
    fleet.reconciler.reconcile().await.unwrap();
    fleet.sync.report_once().await.unwrap();
    fleet.driver.clear_applied();

    // v3 changes only the port
    fleet.cloud.set_target(nginx_target(3, "8090:80"), "\"v3\"");
    fleet.sync.poll_once().await.unwrap();
    let summary = fleet.reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.failures, 0);

    let names: Vec<&str> = fleet.driver.applied().iter().map(|a| a.name()).collect();
    assert_eq!(
        names,
        vec![
            "stop_service",
            "remove_service",
            "create_service",
            "start_service"
        ]
    );
    // Same image: no new pull beyond the original deploy
    assert_eq!(fleet.driver.pulled(), vec!["nginx:1.25"]);

    // One more report, reflecting the new port and version
    assert!(fleet.sync.report_once().await.unwrap());
    let entry = fleet.report_entry(1);
    assert_eq!(entry["version"], 3);
    assert_eq!(
        entry["apps"]["1001"]["services"]["1"]["config"]["ports"][0],
        "8090:80"
    );

    fleet.shutdown().await;
}

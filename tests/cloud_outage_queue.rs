// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud outage: both sync operations fail three times, the device goes
//! offline and queues stripped reports; on recovery the queue drains in
//! order, convergence resumes, and the cached ETag still yields a 304.

use crate::support::{nginx_target, Fleet};
use fleetd_core::{ConnStatus, Event};

#[tokio::test]
async fn cloud_outage_queues_then_drains() {
    let fleet = Fleet::new();
    let conn_events = fleet.bus.subscribe_filtered("conn", 32, |e| {
        matches!(
            e,
            Event::ConnOnline | Event::ConnDegraded | Event::ConnOffline { .. } | Event::ConnRestored
        )
    });

    // Healthy start: target accepted, converged, reported
    fleet.cloud.set_target(nginx_target(2, "8080:80"), "\"v2\"");
    fleet.sync.poll_once().await.unwrap();
    fleet.reconciler.reconcile().await.unwrap();
    fleet.sync.report_once().await.unwrap();
    let etag_before = fleet.sync.etag().unwrap();

    // The cloud goes dark: three failures on each operation
    fleet.cloud.fail_next_polls(3);
    fleet.cloud.set_fail_reports(true);
    for _ in 0..3 {
        let _ = fleet.sync.poll_once().await;
        let _ = fleet.sync.report_once().await;
    }
    assert_eq!(fleet.monitor.status(), ConnStatus::Offline);
    assert_eq!(conn_events.try_recv(), Some(Event::ConnDegraded));
    assert!(matches!(
        conn_events.try_recv(),
        Some(Event::ConnOffline { .. })
    ));

    // Offline report attempts were stripped and queued
    assert!(fleet.sync.queue_size().await >= 1);

    // Cloud recovers. A successful poll alone does not clear the report
    // failure streak; the device is online once both operations succeed.
    fleet.cloud.set_fail_reports(false);
    fleet.sync.poll_once().await.unwrap();
    assert_eq!(fleet.monitor.status(), ConnStatus::Offline);
    assert!(fleet.sync.report_once().await.unwrap());
    assert_eq!(conn_events.try_recv(), Some(Event::ConnOnline));
    assert_eq!(conn_events.try_recv(), Some(Event::ConnRestored));

    // The drain empties the queue; each successful send shrinks it
    let reports_before = fleet.cloud.reports().len();
    let sent = fleet.sync.flush_queue().await;
    assert!(sent >= 1);
    assert_eq!(fleet.sync.queue_size().await, 0);
    assert_eq!(fleet.cloud.reports().len(), reports_before + sent);

    // The ETag from the last successful poll is still in use: 304
    assert_eq!(fleet.sync.etag().unwrap(), etag_before);
    assert!(!fleet.sync.poll_once().await.unwrap());

    fleet.shutdown().await;
}

#[tokio::test]
async fn queued_reports_survive_restart_order_intact() {
    use fleetd_core::{CurrentState, QueuedReport, StateReport};
    use fleetd_storage::OfflineQueue;

    let dir = tempfile::tempdir().unwrap();
    {
        let mut queue = OfflineQueue::open(dir.path(), 8).unwrap();
        for version in [1u64, 2, 3] {
            let current = CurrentState {
                version,
                ..Default::default()
            };
            queue
                .enqueue(&QueuedReport {
                    report: StateReport::from_current(&current, false),
                    enqueued_at_ms: version,
                })
                .unwrap();
        }
    }

    // Process restart: a fresh handle sees the same records in order
    let mut reopened = OfflineQueue::open(dir.path(), 8).unwrap();
    assert_eq!(reopened.size(), 3);
    let mut seen = Vec::new();
    let (sent, err) = reopened
        .flush(|queued| {
            seen.push(queued.report.version);
            async { Ok::<(), ()>(()) }
        })
        .await;
    assert_eq!(sent, 3);
    assert!(err.is_none());
    assert_eq!(seen, vec![1, 2, 3]);
}

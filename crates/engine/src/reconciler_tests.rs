// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::driver::MemoryDriver;
use crate::plan::PlanAction;
use fleetd_core::test_support::{app, service, target};
use fleetd_core::ServiceStatus;

fn setup() -> (Arc<Reconciler<MemoryDriver>>, Arc<MemoryDriver>, EventBus) {
    let bus = EventBus::new();
    let driver = MemoryDriver::new(bus.clone());
    let reconciler = Arc::new(Reconciler::new(driver.clone(), bus.clone()));
    (reconciler, driver, bus)
}

fn nginx_target(version: u64) -> TargetState {
    target(
        version,
        vec![app("1001", "edge", vec![service("1", "web", "nginx:1.25")])],
    )
}

#[tokio::test]
async fn set_target_emits_once_and_collapses_duplicates() {
    let (reconciler, _driver, bus) = setup();
    let sub = bus.subscribe("test", 16);

    assert!(reconciler.set_target(nginx_target(2)));
    assert!(!reconciler.set_target(nginx_target(2)));

    assert_eq!(sub.try_recv(), Some(Event::TargetChanged { version: 2 }));
    assert!(sub.try_recv().is_none());
}

#[tokio::test]
async fn accepting_a_target_bumps_current_version() {
    let (reconciler, _driver, _bus) = setup();
    reconciler.set_target(nginx_target(7));
    assert_eq!(reconciler.current_state().version, 7);
}

#[tokio::test]
async fn version_rollback_is_accepted() {
    let (reconciler, _driver, _bus) = setup();
    reconciler.set_target(nginx_target(5));
    assert!(reconciler.set_target(nginx_target(1)));
    assert_eq!(reconciler.current_state().version, 1);
}

#[tokio::test]
async fn reconcile_without_target_is_a_noop() {
    let (reconciler, driver, _bus) = setup();
    assert_eq!(reconciler.reconcile().await.unwrap(), None);
    assert!(driver.applied().is_empty());
}

#[tokio::test]
async fn reconcile_converges_and_second_pass_is_empty() {
    let (reconciler, driver, _bus) = setup();
    reconciler.set_target(nginx_target(2));

    let summary = reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.actions, 4); // pull, create-app, create, start
    assert_eq!(summary.failures, 0);

    let current = reconciler.current_state();
    assert_eq!(current.version, 2);
    assert_eq!(
        current.apps["1001"].services["1"].status,
        Some(ServiceStatus::Running)
    );

    // Applying the same target again produces zero actions
    let summary = reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.actions, 0);
}

#[tokio::test]
async fn reconcile_emits_complete_event() {
    let (reconciler, _driver, bus) = setup();
    let sub = bus.subscribe_filtered("complete", 16, |e| {
        matches!(e, Event::ReconcileComplete { .. })
    });
    reconciler.set_target(nginx_target(2));
    reconciler.reconcile().await.unwrap();
    assert_eq!(
        sub.try_recv(),
        Some(Event::ReconcileComplete {
            actions: 4,
            failures: 0
        })
    );
}

#[tokio::test]
async fn pull_failure_never_deletes_running_container() {
    let (reconciler, driver, _bus) = setup();

    // Converge on nginx:1.25
    reconciler.set_target(nginx_target(2));
    reconciler.reconcile().await.unwrap();
    driver.clear_applied();

    // Upgrade the image, but make the pull fail
    let mut upgraded = nginx_target(3);
    if let Some(svc) = upgraded
        .apps
        .get_mut("1001")
        .and_then(|a| a.services.get_mut("1"))
    {
        svc.image_name = "nginx:1.27".into();
    }
    driver.fail_when(|a| matches!(a, PlanAction::PullImage { .. }));
    reconciler.set_target(upgraded);

    let summary = reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.failures, 1);
    // Nothing after the failed pull touched the service
    assert!(driver.applied().is_empty());
    let current = reconciler.current_state();
    assert_eq!(
        current.apps["1001"].services["1"].status,
        Some(ServiceStatus::Running)
    );
    assert_eq!(current.apps["1001"].services["1"].image_name, "nginx:1.25");
}

#[tokio::test]
async fn retry_succeeds_after_failure_clears() {
    let (reconciler, driver, _bus) = setup();
    reconciler.set_target(nginx_target(2));
    driver.fail_when(|a| matches!(a, PlanAction::PullImage { .. }));

    let summary = reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.failures, 1);

    driver.clear_failures();
    let summary = reconciler.reconcile().await.unwrap().unwrap();
    assert_eq!(summary.failures, 0);
    assert_eq!(
        reconciler.current_state().apps["1001"].services["1"].status,
        Some(ServiceStatus::Running)
    );
}

#[tokio::test]
async fn persistent_failure_emits_service_unhealthy() {
    let bus = EventBus::new();
    let driver = MemoryDriver::new(bus.clone());
    let reconciler =
        Arc::new(Reconciler::new(driver.clone(), bus.clone()).with_unhealthy_after(2));
    let sub = bus.subscribe_filtered("unhealthy", 16, |e| {
        matches!(e, Event::ServiceUnhealthy { .. })
    });

    reconciler.set_target(nginx_target(2));
    driver.fail_when(|a| matches!(a, PlanAction::PullImage { .. }));

    reconciler.reconcile().await.unwrap();
    assert!(sub.try_recv().is_none());
    reconciler.reconcile().await.unwrap();
    assert_eq!(
        sub.try_recv(),
        Some(Event::ServiceUnhealthy {
            app_id: "1001".into(),
            service_id: "1".into(),
            consecutive_failures: 2
        })
    );
}

#[tokio::test]
async fn recovery_resets_the_unhealthy_counter() {
    let bus = EventBus::new();
    let driver = MemoryDriver::new(bus.clone());
    let reconciler =
        Arc::new(Reconciler::new(driver.clone(), bus.clone()).with_unhealthy_after(2));
    let sub = bus.subscribe_filtered("unhealthy", 16, |e| {
        matches!(e, Event::ServiceUnhealthy { .. })
    });

    reconciler.set_target(nginx_target(2));
    driver.fail_when(|a| matches!(a, PlanAction::PullImage { .. }));
    reconciler.reconcile().await.unwrap();

    // Recovers for a tick, then fails again: counter starts over
    driver.clear_failures();
    reconciler.reconcile().await.unwrap();

    // Make the now-running service fail on restart actions
    driver.fail_when(|a| matches!(a, PlanAction::StartService { .. }));
    driver.seed({
        let mut apps = driver.observe().await.unwrap();
        if let Some(svc) = apps.get_mut("1001").and_then(|a| a.services.get_mut("1")) {
            svc.status = Some(ServiceStatus::Exited);
        }
        apps
    });
    reconciler.reconcile().await.unwrap();
    assert!(sub.try_recv().is_none(), "one failing tick is not unhealthy");
}

#[tokio::test]
async fn overlap_guard_skips_concurrent_pass() {
    let (reconciler, _driver, _bus) = setup();
    reconciler.set_target(nginx_target(2));
    reconciler.in_flight.store(true, Ordering::SeqCst);
    assert_eq!(reconciler.reconcile().await.unwrap(), None);
    reconciler.in_flight.store(false, Ordering::SeqCst);
    assert!(reconciler.reconcile().await.unwrap().is_some());
}

#[tokio::test]
async fn current_changed_refresh_tracks_driver() {
    let (reconciler, driver, _bus) = setup();
    driver.seed(
        [(
            "1001".to_string(),
            app("1001", "edge", vec![service("1", "web", "nginx:1.25")]),
        )]
        .into_iter()
        .collect(),
    );
    reconciler.refresh_current().await.unwrap();
    assert!(reconciler.current_state().apps.contains_key("1001"));
}

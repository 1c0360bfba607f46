// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixture: a full agent core wired from fake transports.

use fleetd_core::{DeviceIdentity, EventBus, FakeClock, TargetState};
use fleetd_engine::{
    ConnectionMonitor, Intervals, JobDelivery, JobEngine, JobEngineHandle, MemoryDriver,
    NoMetrics, Reconciler, SyncDeps, SyncEngine,
};
use fleetd_storage::{EtagCache, OfflineQueue};
use fleetd_transport::{FakeBroker, FakeCloud};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub type TestSync = SyncEngine<MemoryDriver, FakeCloud, FakeBroker, NoMetrics, FakeClock>;

pub const DEVICE_KEY: &str = "00000000-0000-0000-0000-000000000000";

pub fn identity() -> DeviceIdentity {
    DeviceIdentity {
        uuid: Uuid::nil(),
        api_key: "secret-key".into(),
        broker_url: Some("mqtt://broker.local:1883".into()),
        broker_username: None,
        broker_password: None,
        os_version: "fleetOS 1.2".into(),
        agent_version: "0.1.0".into(),
    }
}

/// One device's worth of agent core, cloud and broker both scripted.
pub struct Fleet {
    pub bus: EventBus,
    pub clock: FakeClock,
    pub cloud: FakeCloud,
    pub broker: FakeBroker,
    pub driver: Arc<MemoryDriver>,
    pub reconciler: Arc<Reconciler<MemoryDriver>>,
    pub monitor: Arc<ConnectionMonitor<FakeClock>>,
    pub sync: Arc<TestSync>,
    pub delivery: Arc<JobDelivery<FakeBroker, FakeCloud>>,
    pub engine_handle: JobEngineHandle,
    pub cancel: CancellationToken,
    engine_task: tokio::task::JoinHandle<()>,
    pub handler_dir: tempfile::TempDir,
    state_dir: tempfile::TempDir,
}

impl Fleet {
    pub fn new() -> Self {
        let state_dir = tempfile::tempdir().unwrap();
        let handler_dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let clock = FakeClock::new();
        let cloud = FakeCloud::new();
        let broker = FakeBroker::default();
        let driver = MemoryDriver::new(bus.clone());
        let reconciler = Arc::new(Reconciler::new(driver.clone(), bus.clone()));
        let monitor = Arc::new(ConnectionMonitor::new(clock.clone(), bus.clone()));
        let intervals = Intervals::default();

        let (engine, engine_handle) = JobEngine::new(
            Arc::new(broker.clone()),
            Arc::new(cloud.clone()),
            bus.clone(),
            identity(),
            handler_dir.path(),
            Duration::from_millis(500),
        );
        let cancel = CancellationToken::new();
        let engine_task = tokio::spawn(Arc::new(engine).run(cancel.clone()));

        let delivery = JobDelivery::new(
            Arc::new(broker.clone()),
            Arc::new(cloud.clone()),
            bus.clone(),
            identity(),
            intervals.clone(),
            engine_handle.clone(),
        );

        let sync = SyncEngine::new(SyncDeps {
            identity: identity(),
            cloud: Arc::new(cloud.clone()),
            broker: Arc::new(broker.clone()),
            metrics: Arc::new(NoMetrics),
            reconciler: reconciler.clone(),
            monitor: monitor.clone(),
            supervisor: None,
            bus: bus.clone(),
            intervals,
            clock: clock.clone(),
            queue: OfflineQueue::open(state_dir.path().join("queue"), 16).unwrap(),
            etag_cache: EtagCache::new(state_dir.path().join("etag")),
        });

        Self {
            bus,
            clock,
            cloud,
            broker,
            driver,
            reconciler,
            monitor,
            sync,
            delivery,
            engine_handle,
            cancel,
            engine_task,
            handler_dir,
            state_dir,
        }
    }

    /// Install an executable shell script as a job handler.
    pub fn install_handler(&self, name: &str, script: &str) {
        use std::os::unix::fs::PermissionsExt;
        let path = self.handler_dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    /// Wait for the job engine to pick up and finish the submitted job.
    pub async fn wait_jobs_idle(&self) {
        tokio::time::sleep(Duration::from_millis(50)).await;
        for _ in 0..600 {
            if !self.engine_handle.is_busy() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job engine stayed busy");
    }

    /// The body of the i-th report as received by the cloud over HTTP.
    pub fn report_entry(&self, index: usize) -> serde_json::Value {
        self.cloud.reports()[index][DEVICE_KEY].clone()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.engine_task.await;
        drop(self.state_dir);
    }
}

/// Target with one nginx service on the given port.
pub fn nginx_target(version: u64, port: &str) -> TargetState {
    use fleetd_core::test_support::{app, service, target};
    let mut svc = service("1", "web", "nginx:1.25");
    svc.config.ports = vec![port.to_string()];
    target(version, vec![app("1001", "edge", vec![svc])])
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: build every component, run until shutdown, then
//! stop in order: jobs, features, sync, reconciler, driver, broker,
//! logger flush.

use crate::env::AgentEnv;
use crate::jobs_feature::CloudJobsFeature;
use crate::logging::{self, ReloadHandle};
use crate::metrics::SysinfoMetrics;
use fleetd_core::{
    AgentSettings, ConnStatus, DeviceIdentity, EventBus, FeatureKind, SystemClock,
};
use fleetd_engine::{
    run_distributor, ConfigDistributor, ConnectionMonitor, FeatureRequirement, FeatureSupervisor,
    Intervals, JobDelivery, JobEngine, MemoryDriver, Reconciler, RequirementProbe, SyncDeps,
    SyncEngine,
};
use fleetd_storage::{EtagCache, OfflineQueue, QueueError};
use fleetd_transport::{Broker, BrokerConfig, HttpApi, MqttBroker, NoBroker, TransportError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fatal initialization failures; the process exits 1.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cloud endpoint: {0}")]
    Transport(#[from] TransportError),
    #[error("offline queue: {0}")]
    Queue(#[from] QueueError),
}

/// Open the offline queue, degrading to a temp directory when the state
/// dir is unwritable. Loss of persistence is not fatal.
fn open_queue(env: &AgentEnv, cap: usize) -> Result<OfflineQueue, StartupError> {
    match OfflineQueue::open(env.state_dir.join("queue"), cap) {
        Ok(queue) => Ok(queue),
        Err(err) => {
            let fallback = std::env::temp_dir().join("fleetd-queue");
            tracing::warn!(
                error = %err,
                fallback = %fallback.display(),
                "state dir unusable, queueing to temp dir"
            );
            Ok(OfflineQueue::open(fallback, cap)?)
        }
    }
}

/// Run the agent until `shutdown` fires.
pub async fn run(
    env: AgentEnv,
    identity: DeviceIdentity,
    reload: ReloadHandle,
    shutdown: CancellationToken,
) -> Result<(), StartupError> {
    let settings = AgentSettings::default();
    let bus = EventBus::new();
    let clock = SystemClock;
    let intervals = Intervals::new(&settings);
    let cancel = CancellationToken::new();

    // Broker: one shared connection, or a permanent fallback to HTTP
    // when the fleet is provisioned without one.
    let broker_cancel = CancellationToken::new();
    let mut broker_task: Option<JoinHandle<()>> = None;
    let broker_dyn: Arc<dyn Broker> = match &identity.broker_url {
        Some(url) => {
            let mut config = BrokerConfig::new(url.clone(), identity.client_id());
            config.username = identity.broker_username.clone();
            config.password = identity.broker_password.clone();
            let (broker, task) = MqttBroker::connect(config, broker_cancel.clone())?;
            broker_task = Some(task);
            Arc::new(broker)
        }
        None => {
            tracing::info!("no broker configured, HTTP only");
            Arc::new(NoBroker)
        }
    };
    // Components are generic over `B: Broker`; the blanket impl for Arc
    // lets them share the one dynamic handle.
    let broker = Arc::new(broker_dyn);

    let cloud = Arc::new(HttpApi::new(
        env.api_url.clone(),
        identity.clone(),
        Duration::from_millis(settings.api_timeout_ms),
    )?);
    let metrics = Arc::new(SysinfoMetrics::new());

    let driver = MemoryDriver::new(bus.clone());
    let reconciler = Arc::new(Reconciler::new(driver, bus.clone()));
    let monitor = Arc::new(ConnectionMonitor::new(clock.clone(), bus.clone()));

    let probe: RequirementProbe = {
        let broker = broker.clone();
        let monitor = monitor.clone();
        Arc::new(move |requirement| match requirement {
            FeatureRequirement::None => true,
            FeatureRequirement::Broker => broker.is_connected(),
            FeatureRequirement::Cloud => monitor.status() != ConnStatus::Offline,
            FeatureRequirement::BrokerOrCloud => {
                broker.is_connected() || monitor.status() != ConnStatus::Offline
            }
        })
    };
    let supervisor = Arc::new(FeatureSupervisor::new(bus.clone(), probe));

    // Cloud jobs, enabled until config says otherwise
    let (job_engine, engine_handle) = JobEngine::new(
        broker.clone(),
        cloud.clone(),
        bus.clone(),
        identity.clone(),
        env.handler_dir.clone(),
        Duration::from_millis(settings.handler_timeout_ms),
    );
    let delivery = JobDelivery::new(
        broker.clone(),
        cloud.clone(),
        bus.clone(),
        identity.clone(),
        intervals.clone(),
        engine_handle,
    );
    supervisor.register(CloudJobsFeature::new(delivery, Arc::new(job_engine)));
    supervisor.set_enabled(FeatureKind::CloudJobs, true).await;

    let distributor = Arc::new(ConfigDistributor::new(
        bus.clone(),
        intervals.clone(),
        supervisor.clone(),
    ));

    let sync = SyncEngine::new(SyncDeps {
        identity: identity.clone(),
        cloud,
        broker: broker.clone(),
        metrics,
        reconciler: reconciler.clone(),
        monitor,
        supervisor: Some(supervisor.clone()),
        bus: bus.clone(),
        intervals: intervals.clone(),
        clock,
        queue: open_queue(&env, settings.queue_cap)?,
        etag_cache: EtagCache::new(env.state_dir.join("etag")),
    });

    let mut tasks: Vec<JoinHandle<()>> = Vec::new();
    tasks.push(tokio::spawn(
        reconciler.clone().run(intervals.clone(), cancel.clone()),
    ));
    tasks.push(tokio::spawn(run_distributor(
        distributor,
        reconciler,
        cancel.clone(),
    )));
    tasks.push(tokio::spawn(supervisor.clone().run(cancel.clone())));
    tasks.extend(sync.clone().spawn_loops(cancel.clone()));
    tasks.push(tokio::spawn(logging::run_level_listener(
        bus,
        reload,
        cancel.clone(),
    )));

    tracing::info!(device = %identity.uuid, "fleetd agent running");
    shutdown.cancelled().await;
    tracing::info!("shutdown requested");

    // Jobs stop inside the supervisor (latest registration first), then
    // every loop, then a best-effort queue flush, then the broker.
    supervisor.stop_all().await;
    cancel.cancel();
    for task in tasks {
        let abort = task.abort_handle();
        if tokio::time::timeout(Duration::from_secs(5), task).await.is_err() {
            abort.abort();
        }
    }
    sync.flush_queue().await;

    if let Err(err) = broker.disconnect().await {
        tracing::debug!(error = %err, "broker disconnect failed");
    }
    broker_cancel.cancel();
    if let Some(task) = broker_task {
        let _ = tokio::time::timeout(Duration::from_secs(2), task).await;
    }

    tracing::info!("shutdown complete");
    Ok(())
}

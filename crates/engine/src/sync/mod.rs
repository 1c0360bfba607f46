// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud synchronization: the poll loop, the report loop and the queue
//! flush.
//!
//! Polling is ETag-conditional; reporting is diff-minimal with a metrics
//! attachment on its own timer, broker-preferred with HTTP fallback.
//! While the monitor says offline, failed reports are stripped and parked
//! in the durable queue, which drains head-first when the connection is
//! restored.

use crate::backoff::Backoff;
use crate::driver::ContainerDriver;
use crate::features::FeatureSupervisor;
use crate::intervals::Intervals;
use crate::metrics::MetricsSource;
use crate::monitor::{ConnectionMonitor, SyncOp};
use crate::reconciler::Reconciler;
use fleetd_core::{
    Clock, DeviceIdentity, Event, EventBus, IntervalKind, QueuedReport, StateReport,
};
use fleetd_storage::{EtagCache, OfflineQueue};
use fleetd_transport::{Broker, CloudApi, PollOutcome, Qos, TransportError};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fields reported only when changed since the last successful send.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct StaticInfo {
    os_version: String,
    agent_version: String,
    local_ip: Option<String>,
}

struct ReportState {
    last_sent: Option<StateReport>,
    last_metrics_ms: Option<u64>,
    sent_static: Option<StaticInfo>,
}

/// Everything the sync engine is wired to.
pub struct SyncDeps<D, C, B, M, K: Clock> {
    pub identity: DeviceIdentity,
    pub cloud: Arc<C>,
    pub broker: Arc<B>,
    pub metrics: Arc<M>,
    pub reconciler: Arc<Reconciler<D>>,
    pub monitor: Arc<ConnectionMonitor<K>>,
    pub supervisor: Option<Arc<FeatureSupervisor>>,
    pub bus: EventBus,
    pub intervals: Intervals,
    pub clock: K,
    pub queue: OfflineQueue,
    pub etag_cache: EtagCache,
}

pub struct SyncEngine<D, C, B, M, K: Clock> {
    identity: DeviceIdentity,
    cloud: Arc<C>,
    broker: Arc<B>,
    metrics: Arc<M>,
    reconciler: Arc<Reconciler<D>>,
    monitor: Arc<ConnectionMonitor<K>>,
    supervisor: Option<Arc<FeatureSupervisor>>,
    bus: EventBus,
    intervals: Intervals,
    clock: K,
    queue: tokio::sync::Mutex<OfflineQueue>,
    etag_cache: EtagCache,
    etag: Mutex<Option<String>>,
    report: Mutex<ReportState>,
}

impl<D, C, B, M, K> SyncEngine<D, C, B, M, K>
where
    D: ContainerDriver,
    C: CloudApi,
    B: Broker,
    M: MetricsSource,
    K: Clock,
{
    pub fn new(deps: SyncDeps<D, C, B, M, K>) -> Arc<Self> {
        let etag = deps.etag_cache.load();
        if etag.is_some() {
            tracing::debug!("resuming with cached etag");
        }
        Arc::new(Self {
            identity: deps.identity,
            cloud: deps.cloud,
            broker: deps.broker,
            metrics: deps.metrics,
            reconciler: deps.reconciler,
            monitor: deps.monitor,
            supervisor: deps.supervisor,
            bus: deps.bus,
            intervals: deps.intervals,
            clock: deps.clock,
            queue: tokio::sync::Mutex::new(deps.queue),
            etag_cache: deps.etag_cache,
            etag: Mutex::new(etag),
            report: Mutex::new(ReportState {
                last_sent: None,
                last_metrics_ms: None,
                sent_static: None,
            }),
        })
    }

    pub fn etag(&self) -> Option<String> {
        self.etag.lock().clone()
    }

    pub async fn queue_size(&self) -> usize {
        self.queue.lock().await.size()
    }

    // -- poll ----------------------------------------------------------

    /// One conditional target poll. Returns true when a new target was
    /// accepted.
    pub async fn poll_once(&self) -> Result<bool, TransportError> {
        let etag = self.etag();
        match self.cloud.fetch_target(etag.as_deref()).await {
            Ok(PollOutcome::NotModified) => {
                self.monitor.mark_success(SyncOp::Poll);
                tracing::debug!("target state unmodified");
                Ok(false)
            }
            Ok(PollOutcome::Updated { target, etag }) => {
                self.monitor.mark_success(SyncOp::Poll);
                if let Some(etag) = &etag {
                    self.etag_cache.store(etag);
                }
                *self.etag.lock() = etag;
                // set_target collapses structurally identical bodies and
                // is the single emission point of target:changed.
                Ok(self.reconciler.set_target(target))
            }
            Err(err) => {
                self.monitor.mark_failure(SyncOp::Poll, &err);
                Err(err)
            }
        }
    }

    // -- report --------------------------------------------------------

    fn current_static(&self) -> StaticInfo {
        StaticInfo {
            os_version: self.identity.os_version.clone(),
            agent_version: self.identity.agent_version.clone(),
            local_ip: self.metrics.local_ip(),
        }
    }

    /// Build the candidate report and decide whether metrics are due.
    async fn build_report(&self) -> (StateReport, bool, StaticInfo) {
        let current = self.reconciler.current_state();
        let mut report = StateReport::from_current(&current, self.monitor.is_online());

        let info = self.current_static();
        let metrics_due = {
            let state = self.report.lock();
            let sent = state.sent_static.clone().unwrap_or_default();
            if !info.os_version.is_empty() && info.os_version != sent.os_version {
                report.os_version = Some(info.os_version.clone());
            }
            if !info.agent_version.is_empty() && info.agent_version != sent.agent_version {
                report.agent_version = Some(info.agent_version.clone());
            }
            if info.local_ip.is_some() && info.local_ip != sent.local_ip {
                report.local_ip = info.local_ip.clone();
            }

            let interval_ms = self.intervals.get(IntervalKind::Metrics).as_millis() as u64;
            match state.last_metrics_ms {
                Some(last) => self.clock.epoch_ms().saturating_sub(last) >= interval_ms,
                None => true,
            }
        };

        if metrics_due {
            report.metrics = self.metrics.sample().await;
        }
        if let Some(supervisor) = &self.supervisor {
            report.feature_health = supervisor.health_snapshots();
        }
        (report, metrics_due, info)
    }

    /// One report tick: diff against the last successful send, transmit
    /// when the diff is non-empty or metrics are due. Returns true when a
    /// report went out.
    pub async fn report_once(&self) -> Result<bool, TransportError> {
        let (report, metrics_due, info) = self.build_report().await;

        let should_send = metrics_due
            || match &self.report.lock().last_sent {
                Some(last) => report.differs_from(last),
                None => true,
            };
        if !should_send {
            return Ok(false);
        }

        match self.send_report_body(&report).await {
            Ok(()) => {
                self.monitor.mark_success(SyncOp::Report);
                let mut state = self.report.lock();
                if metrics_due {
                    state.last_metrics_ms = Some(self.clock.epoch_ms());
                }
                state.sent_static = Some(info);
                state.last_sent = Some(report);
                Ok(true)
            }
            Err(err) => {
                self.monitor.mark_failure(SyncOp::Report, &err);
                if self.monitor.status() == fleetd_core::ConnStatus::Offline {
                    self.enqueue_offline(report).await;
                }
                Err(err)
            }
        }
    }

    /// Park a stripped report in the durable queue.
    async fn enqueue_offline(&self, report: StateReport) {
        let queued = QueuedReport {
            report: report.strip_verbose(),
            enqueued_at_ms: self.clock.epoch_ms(),
        };
        match self.queue.lock().await.enqueue(&queued) {
            Ok(seq) => {
                tracing::info!(seq, "report queued while offline");
                self.bus.publish(Event::ReportQueued { seq });
            }
            Err(err) => {
                // Degrade: keep running without persistence
                tracing::warn!(error = %err, "offline queue unavailable, report lost");
            }
        }
    }

    /// Broker-preferred transmit with HTTP fallback.
    async fn send_report_body(&self, report: &StateReport) -> Result<(), TransportError> {
        if self.broker.is_connected() {
            let payload = serde_json::to_vec(report)?;
            match self
                .broker
                .publish(&self.identity.state_topic(), payload, Qos::AtLeastOnce, false)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!(error = %err, "broker report failed, falling back to HTTP");
                }
            }
        }
        self.cloud
            .send_report(&report.to_wire(&self.identity.uuid))
            .await
    }

    // -- queue flush ---------------------------------------------------

    /// Drain the offline queue head-first; the first failure stops the
    /// drain and preserves the remainder in order.
    pub async fn flush_queue(&self) -> usize {
        let mut queue = self.queue.lock().await;
        if queue.is_empty() {
            return 0;
        }
        let (sent, err) = queue
            .flush(|queued| async move { self.send_report_body(&queued.report).await })
            .await;
        let remaining = queue.size();
        drop(queue);

        if let Some(err) = err {
            tracing::warn!(error = %err, sent, remaining, "queue drain stopped on send failure");
        } else {
            tracing::info!(sent, "offline queue drained");
        }
        self.bus.publish(Event::QueueDrained { sent, remaining });
        sent
    }

    // -- loops ---------------------------------------------------------

    async fn run_poll_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = Backoff::sync_default();
        loop {
            let delay = match self.poll_once().await {
                Ok(_) => {
                    backoff.reset();
                    self.intervals.get(IntervalKind::TargetPoll)
                }
                Err(err) => {
                    let delay = backoff.next();
                    tracing::warn!(
                        error = %err,
                        retry_in_s = delay.as_secs(),
                        "target poll failed"
                    );
                    delay
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!("poll loop exited");
    }

    async fn run_report_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = Backoff::sync_default();
        loop {
            let delay = match self.report_once().await {
                Ok(_) => {
                    backoff.reset();
                    self.intervals.get(IntervalKind::Report)
                }
                Err(err) => {
                    let delay = backoff.next();
                    tracing::warn!(
                        error = %err,
                        retry_in_s = delay.as_secs(),
                        "state report failed"
                    );
                    delay
                }
            };
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!("report loop exited");
    }

    /// Drain the queue whenever the monitor announces a restored
    /// connection.
    async fn run_flush_loop(self: Arc<Self>, cancel: CancellationToken) {
        let sub = self
            .bus
            .subscribe_filtered("sync-flush", 8, |e| matches!(e, Event::ConnRestored));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sub.recv() => {
                    self.flush_queue().await;
                }
            }
        }
        tracing::debug!("flush loop exited");
    }

    /// Spawn the three sync tasks.
    pub fn spawn_loops(self: Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().run_poll_loop(cancel.clone())),
            tokio::spawn(self.clone().run_report_loop(cancel.clone())),
            tokio::spawn(self.run_flush_loop(cancel)),
        ]
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;

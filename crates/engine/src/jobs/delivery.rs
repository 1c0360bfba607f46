// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job delivery: broker push preferred, HTTP polling as fallback.
//!
//! A coordinator checks broker connectivity every few seconds and flips
//! the delivery mode; HTTP polling pauses while the broker is primary.
//! Whatever the transport, a delivery is deduplicated against the last
//! accepted `(job_id, version, execution)` and dropped while a job is
//! executing; the primary re-notifies and the poller re-picks.

use crate::intervals::Intervals;
use crate::jobs::engine::JobEngineHandle;
use fleetd_core::{
    DeliveryMode, DeviceIdentity, Event, EventBus, IntervalKind, JobDocument, JobExecutionData,
    JobStatus,
};
use fleetd_transport::{Broker, CloudApi, MessageHandler, Qos, TransportError};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// How often the coordinator re-evaluates which transport is primary.
const MODE_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Broker notification wire: `{ "execution": { camelCase… } }`.
#[derive(Debug, Deserialize)]
struct NotifyWire {
    execution: ExecutionWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecutionWire {
    job_id: String,
    #[serde(default, alias = "thingName")]
    device_uuid: String,
    #[serde(default)]
    job_document: JobDocument,
    #[serde(default)]
    status: Option<JobStatus>,
    #[serde(default)]
    version_number: u64,
    #[serde(default)]
    execution_number: u64,
    #[serde(default)]
    timeout_seconds: Option<u64>,
}

impl From<ExecutionWire> for JobExecutionData {
    fn from(wire: ExecutionWire) -> Self {
        JobExecutionData {
            job_id: wire.job_id,
            device_uuid: wire.device_uuid,
            job_document: wire.job_document,
            status: wire.status.unwrap_or(JobStatus::Queued),
            version_number: wire.version_number,
            execution_number: wire.execution_number,
            timeout_seconds: wire.timeout_seconds,
            created_at: None,
        }
    }
}

fn parse_notification(payload: &[u8]) -> Result<JobExecutionData, serde_json::Error> {
    let wire: NotifyWire = serde_json::from_slice(payload)?;
    Ok(wire.execution.into())
}

pub struct JobDelivery<B, C> {
    broker: Arc<B>,
    cloud: Arc<C>,
    bus: EventBus,
    identity: DeviceIdentity,
    intervals: Intervals,
    engine: JobEngineHandle,
    mode: Mutex<DeliveryMode>,
    last_accepted: Mutex<Option<(String, u64, u64)>>,
    incoming_tx: mpsc::Sender<JobExecutionData>,
    incoming_rx: tokio::sync::Mutex<mpsc::Receiver<JobExecutionData>>,
}

impl<B: Broker, C: CloudApi> JobDelivery<B, C> {
    pub fn new(
        broker: Arc<B>,
        cloud: Arc<C>,
        bus: EventBus,
        identity: DeviceIdentity,
        intervals: Intervals,
        engine: JobEngineHandle,
    ) -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::channel(8);
        let initial = if broker.is_connected() {
            DeliveryMode::Mqtt
        } else {
            DeliveryMode::Http
        };
        Arc::new(Self {
            broker,
            cloud,
            bus,
            identity,
            intervals,
            engine,
            mode: Mutex::new(initial),
            last_accepted: Mutex::new(None),
            incoming_tx,
            incoming_rx: tokio::sync::Mutex::new(incoming_rx),
        })
    }

    pub fn mode(&self) -> DeliveryMode {
        *self.mode.lock()
    }

    /// Subscribe to the notify-next topic. The handler only parses and
    /// hands off; dedupe and busy checks happen on the delivery task.
    pub async fn start(&self) -> Result<(), TransportError> {
        let tx = self.incoming_tx.clone();
        let handler: MessageHandler = Arc::new(move |msg| {
            match parse_notification(&msg.payload) {
                Ok(job) => {
                    if tx.try_send(job).is_err() {
                        tracing::warn!("job notification dropped, delivery queue full");
                    }
                }
                Err(err) => {
                    tracing::warn!(error = %err, "unparseable job notification")
                }
            }
        });
        self.broker
            .subscribe(
                &self.identity.jobs_notify_topic(),
                Qos::AtLeastOnce,
                handler,
            )
            .await
    }

    pub async fn stop(&self) -> Result<(), TransportError> {
        self.broker
            .unsubscribe(&self.identity.jobs_notify_topic())
            .await
    }

    /// Delivery loop: broker hand-offs, fallback polling, and the mode
    /// coordinator.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = match self.incoming_rx.try_lock() {
            Ok(rx) => rx,
            Err(_) => {
                tracing::warn!("job delivery already running");
                return;
            }
        };
        let mut mode_check = tokio::time::interval(MODE_CHECK_INTERVAL);
        loop {
            let poll_in = self.intervals.get(IntervalKind::JobsPoll);
            tokio::select! {
                _ = cancel.cancelled() => break,
                job = rx.recv() => match job {
                    Some(job) => self.deliver(job, DeliveryMode::Mqtt).await,
                    None => break,
                },
                _ = mode_check.tick() => self.check_mode(),
                _ = tokio::time::sleep(poll_in), if self.mode() == DeliveryMode::Http => {
                    self.poll_once().await;
                }
            }
        }
        tracing::debug!("job delivery loop exited");
    }

    /// Re-evaluate which transport is primary. An in-flight job is never
    /// interrupted by a mode flip.
    pub fn check_mode(&self) {
        let new_mode = if self.broker.is_connected() {
            DeliveryMode::Mqtt
        } else {
            DeliveryMode::Http
        };
        let mut mode = self.mode.lock();
        if *mode != new_mode {
            tracing::info!(from = %*mode, to = %new_mode, "job delivery mode changed");
            *mode = new_mode;
            drop(mode);
            self.bus.publish(Event::JobsModeChanged { mode: new_mode });
        }
    }

    /// One fallback poll against the cloud jobs endpoint.
    pub async fn poll_once(&self) {
        match self.cloud.next_job().await {
            Ok(Some(job)) => self.deliver(job, DeliveryMode::Http).await,
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "jobs poll failed"),
        }
    }

    /// Accept (or discard) one delivery, whichever transport carried it.
    pub async fn deliver(&self, job: JobExecutionData, via: DeliveryMode) {
        if self.is_duplicate(&job) {
            tracing::debug!(job = %job.job_id, via = %via, "duplicate delivery discarded");
            return;
        }
        if self.engine.is_busy() {
            // The primary will re-notify and the poller re-picks it.
            tracing::debug!(job = %job.job_id, via = %via, "job engine busy, delivery ignored");
            return;
        }

        *self.last_accepted.lock() = Some(job.delivery_key());
        tracing::info!(
            job = %job.job_id,
            via = %via,
            version = job.version_number,
            execution = job.execution_number,
            "job accepted"
        );
        self.bus.publish(Event::JobReceived {
            job_id: job.job_id.clone(),
            version_number: job.version_number,
            execution_number: job.execution_number,
        });
        if !self.engine.submit(job).await {
            tracing::warn!("job engine gone, delivery dropped");
        }
    }

    /// A delivery matches the last accepted one when the job id matches
    /// and the version/execution pair matches. A zero pair (the HTTP poll
    /// path carries no execution numbers) matches any pair on the other
    /// side.
    fn is_duplicate(&self, job: &JobExecutionData) -> bool {
        let last = self.last_accepted.lock();
        let Some((last_id, last_version, last_execution)) = last.as_ref() else {
            return false;
        };
        if *last_id != job.job_id {
            return false;
        }
        let incoming = (job.version_number, job.execution_number);
        let accepted = (*last_version, *last_execution);
        incoming == accepted || incoming == (0, 0) || accepted == (0, 0)
    }
}

#[cfg(test)]
#[path = "delivery_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job engine: executes one job document at a time.
//!
//! Steps resolve to executables in the handler directory and run as
//! subprocesses with a timeout. The first failing step aborts the
//! document. Status updates go broker-first with HTTP fallback and are
//! retried with the sync backoff until delivered; a job is never
//! discarded because its status could not be reported.

use crate::backoff::Backoff;
use fleetd_core::{
    DeviceIdentity, Event, EventBus, JobExecutionData, JobStatus, JobStatusUpdate, JobStep,
};
use fleetd_transport::{Broker, CloudApi, Qos};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Longest stdout/stderr snippet carried in a status update.
const OUTPUT_SNIPPET_MAX: usize = 4096;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("no handler for action type {0:?}")]
    HandlerNotFound(String),
    #[error("handler input encode failed: {0}")]
    Input(#[from] serde_json::Error),
    #[error("handler IO: {0}")]
    Io(#[from] std::io::Error),
}

/// What a step's subprocess produced.
struct StepOutcome {
    exit_code: Option<i32>,
    stdout: String,
    stderr: String,
    timed_out: bool,
}

/// Query/submit side handed to the delivery path.
#[derive(Clone)]
pub struct JobEngineHandle {
    tx: mpsc::Sender<JobExecutionData>,
    busy: Arc<AtomicBool>,
}

impl JobEngineHandle {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    /// Hand a job to the engine. Returns false when the engine has shut
    /// down.
    pub async fn submit(&self, job: JobExecutionData) -> bool {
        self.tx.send(job).await.is_ok()
    }
}

pub struct JobEngine<B, C> {
    broker: Arc<B>,
    cloud: Arc<C>,
    bus: EventBus,
    identity: DeviceIdentity,
    handler_dir: PathBuf,
    default_timeout: Duration,
    busy: Arc<AtomicBool>,
    rx: tokio::sync::Mutex<mpsc::Receiver<JobExecutionData>>,
}

impl<B: Broker, C: CloudApi> JobEngine<B, C> {
    pub fn new(
        broker: Arc<B>,
        cloud: Arc<C>,
        bus: EventBus,
        identity: DeviceIdentity,
        handler_dir: impl Into<PathBuf>,
        default_timeout: Duration,
    ) -> (Self, JobEngineHandle) {
        let (tx, rx) = mpsc::channel(4);
        let busy = Arc::new(AtomicBool::new(false));
        let handle = JobEngineHandle {
            tx,
            busy: busy.clone(),
        };
        (
            Self {
                broker,
                cloud,
                bus,
                identity,
                handler_dir: handler_dir.into(),
                default_timeout,
                busy,
                rx: tokio::sync::Mutex::new(rx),
            },
            handle,
        )
    }

    /// Executor loop: one job at a time, in arrival order. The receiver
    /// lock keeps a second run from executing concurrently and releases
    /// on cancellation, so a stopped feature can start the loop again.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut rx = match self.rx.try_lock() {
            Ok(rx) => rx,
            Err(_) => {
                tracing::warn!("job engine already running");
                return;
            }
        };
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = rx.recv() => job,
            };
            match job {
                Some(job) => self.execute(job, &cancel).await,
                None => break,
            }
        }
        tracing::debug!("job engine exited");
    }

    async fn execute(&self, job: JobExecutionData, cancel: &CancellationToken) {
        self.busy.store(true, Ordering::Relaxed);
        let job_id = job.job_id.clone();
        tracing::info!(
            job = %job_id,
            steps = job.job_document.steps.len(),
            "job execution started"
        );

        self.bus.publish(Event::JobStatusChanged {
            job_id: job_id.clone(),
            status: JobStatus::InProgress,
        });
        self.report_status(&job_id, &JobStatusUpdate::in_progress(), cancel)
            .await;

        let timeout = job
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);
        let update = self.run_document(&job, timeout, cancel).await;

        tracing::info!(job = %job_id, status = %update.status, "job execution finished");
        self.bus.publish(Event::JobStatusChanged {
            job_id: job_id.clone(),
            status: update.status,
        });
        self.report_status(&job_id, &update, cancel).await;
        self.busy.store(false, Ordering::Relaxed);
    }

    /// Run steps in order; the first failure determines the terminal
    /// status and carries that step's outputs.
    async fn run_document(
        &self,
        job: &JobExecutionData,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> JobStatusUpdate {
        let mut last_ok: Option<StepOutcome> = None;
        for (index, step) in job.job_document.steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return JobStatusUpdate {
                    status: JobStatus::Canceled,
                    exit_code: None,
                    stdout: None,
                    stderr: None,
                    status_details: Some("agent shutting down".to_string()),
                };
            }
            let kind = step.action.kind.clone();
            match self.run_step(job, index, step, timeout).await {
                Ok(outcome) if outcome.timed_out => {
                    tracing::warn!(job = %job.job_id, step = index, action = %kind, "step timed out");
                    return JobStatusUpdate {
                        status: JobStatus::TimedOut,
                        exit_code: outcome.exit_code,
                        stdout: none_if_empty(outcome.stdout),
                        stderr: none_if_empty(outcome.stderr),
                        status_details: Some(format!(
                            "step {index} ({kind}) exceeded {}s timeout",
                            timeout.as_secs()
                        )),
                    };
                }
                Ok(outcome) if outcome.exit_code != Some(0) => {
                    tracing::warn!(
                        job = %job.job_id,
                        step = index,
                        action = %kind,
                        exit_code = ?outcome.exit_code,
                        "step failed"
                    );
                    return JobStatusUpdate {
                        status: JobStatus::Failed,
                        exit_code: outcome.exit_code,
                        stdout: none_if_empty(outcome.stdout),
                        stderr: none_if_empty(outcome.stderr),
                        status_details: Some(format!("step {index} ({kind}) failed")),
                    };
                }
                Ok(outcome) => last_ok = Some(outcome),
                Err(err) => {
                    tracing::warn!(job = %job.job_id, step = index, action = %kind, error = %err, "step unrunnable");
                    return JobStatusUpdate {
                        status: JobStatus::Failed,
                        exit_code: None,
                        stdout: None,
                        stderr: None,
                        status_details: Some(format!("step {index} ({kind}): {err}")),
                    };
                }
            }
        }

        JobStatusUpdate {
            status: JobStatus::Succeeded,
            exit_code: Some(0),
            stdout: last_ok.and_then(|o| none_if_empty(o.stdout)),
            stderr: None,
            status_details: None,
        }
    }

    /// Resolve the handler executable and run it with the step input on
    /// stdin. A handler exceeding the timeout is killed.
    async fn run_step(
        &self,
        job: &JobExecutionData,
        index: usize,
        step: &JobStep,
        timeout: Duration,
    ) -> Result<StepOutcome, JobError> {
        let kind = &step.action.kind;
        // Handler names are plain file names; anything path-like is refused.
        if kind.is_empty() || kind.contains('/') || kind.contains("..") {
            return Err(JobError::HandlerNotFound(kind.clone()));
        }
        let path = self.handler_dir.join(kind);
        if !path.is_file() {
            return Err(JobError::HandlerNotFound(kind.clone()));
        }

        let input = serde_json::to_vec(&step.action.input)?;
        let mut child = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .env("FLEETD_DEVICE_UUID", self.identity.uuid.to_string())
            .env("FLEETD_JOB_ID", &job.job_id)
            .env("FLEETD_STEP_INDEX", index.to_string())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // The handler may exit without reading stdin; that is not an
            // error of ours.
            let _ = stdin.write_all(&input).await;
        }

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(read_capped(stdout));
        let stderr_task = tokio::spawn(read_capped(stderr));

        let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => (status.code(), false),
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                (None, true)
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();
        Ok(StepOutcome {
            exit_code,
            stdout,
            stderr,
            timed_out,
        })
    }

    /// Publish a status update, broker preferred, HTTP as fallback.
    /// Retries with the sync backoff until one transport takes it.
    async fn report_status(
        &self,
        job_id: &str,
        update: &JobStatusUpdate,
        cancel: &CancellationToken,
    ) {
        let mut backoff = Backoff::sync_default();
        loop {
            if self.try_send_status(job_id, update).await {
                return;
            }
            let delay = backoff.next();
            tracing::warn!(
                job = %job_id,
                status = %update.status,
                retry_in_s = delay.as_secs(),
                "job status update failed on both transports"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn try_send_status(&self, job_id: &str, update: &JobStatusUpdate) -> bool {
        if self.broker.is_connected() {
            let topic = self.identity.job_update_topic(job_id);
            match serde_json::to_vec(update) {
                Ok(payload) => {
                    match self
                        .broker
                        .publish(&topic, payload, Qos::AtLeastOnce, false)
                        .await
                    {
                        Ok(()) => return true,
                        Err(err) => {
                            tracing::debug!(error = %err, "broker status publish failed, trying HTTP")
                        }
                    }
                }
                Err(err) => tracing::warn!(error = %err, "status update encode failed"),
            }
        }
        match self.cloud.update_job_status(job_id, update).await {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(error = %err, "HTTP status update failed");
                false
            }
        }
    }
}

#[cfg(test)]
impl<B: Broker, C: CloudApi> JobEngine<B, C> {
    /// Tests that exercise delivery without an executor task take the
    /// receiving end directly.
    pub(crate) fn into_rx(self) -> mpsc::Receiver<JobExecutionData> {
        self.rx.into_inner()
    }
}

#[cfg(test)]
impl JobEngineHandle {
    pub(crate) fn busy_flag(&self) -> &Arc<AtomicBool> {
        &self.busy
    }
}

fn none_if_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

/// Read a child pipe to its end, keeping at most the snippet cap.
async fn read_capped<R>(pipe: Option<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    use tokio::io::AsyncReadExt;
    let Some(mut pipe) = pipe else {
        return String::new();
    };
    let mut raw = Vec::new();
    let _ = pipe.read_to_end(&mut raw).await;
    let mut text = String::from_utf8_lossy(&raw).into_owned();
    if text.len() > OUTPUT_SNIPPET_MAX {
        let mut cut = OUTPUT_SNIPPET_MAX;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
    }
    text
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

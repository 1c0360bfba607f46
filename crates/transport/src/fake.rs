// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake transports for engine and spec tests.
//!
//! `FakeBroker` records publishes and lets tests inject incoming
//! messages; `FakeCloud` serves a scripted target state and records
//! everything the device sends.

use crate::broker::{Broker, IncomingMessage, MessageHandler, Qos};
use crate::error::TransportError;
use crate::http::{CloudApi, PollOutcome};
use async_trait::async_trait;
use fleetd_core::{JobExecutionData, JobStatusUpdate, TargetState};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory broker with settable connectivity.
#[derive(Clone, Default)]
pub struct FakeBroker {
    inner: Arc<FakeBrokerInner>,
}

#[derive(Default)]
struct FakeBrokerInner {
    connected: AtomicBool,
    fail_publish: AtomicBool,
    published: Mutex<Vec<(String, Vec<u8>)>>,
    subscriptions: Mutex<HashMap<String, (Qos, MessageHandler)>>,
}

impl FakeBroker {
    pub fn connected() -> Self {
        let broker = Self::default();
        broker.set_connected(true);
        broker
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::Relaxed);
    }

    /// Make subsequent publishes fail even while "connected".
    pub fn set_fail_publish(&self, fail: bool) {
        self.inner.fail_publish.store(fail, Ordering::Relaxed);
    }

    /// Everything published so far, as `(topic, payload)`.
    pub fn published(&self) -> Vec<(String, Vec<u8>)> {
        self.inner.published.lock().clone()
    }

    pub fn published_on(&self, topic: &str) -> Vec<Vec<u8>> {
        self.inner
            .published
            .lock()
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.inner.subscriptions.lock().keys().cloned().collect();
        topics.sort();
        topics
    }

    /// Deliver a message to the registered handler, as the dispatch task
    /// would.
    pub fn inject(&self, topic: &str, payload: Vec<u8>) {
        let handler = {
            let subs = self.inner.subscriptions.lock();
            subs.get(topic).map(|(_, h)| h.clone())
        };
        if let Some(handler) = handler {
            handler(IncomingMessage {
                topic: topic.to_string(),
                payload,
            });
        }
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        _qos: Qos,
        _retain: bool,
    ) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        if self.inner.fail_publish.load(Ordering::Relaxed) {
            return Err(TransportError::PublishTimeout);
        }
        self.inner
            .published
            .lock()
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        qos: Qos,
        handler: MessageHandler,
    ) -> Result<(), TransportError> {
        self.inner
            .subscriptions
            .lock()
            .insert(topic.to_string(), (qos, handler));
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.inner.subscriptions.lock().remove(topic);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Relaxed)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.set_connected(false);
        Ok(())
    }
}

/// Scripted cloud: serves a target, records reports and job updates.
#[derive(Clone, Default)]
pub struct FakeCloud {
    inner: Arc<Mutex<FakeCloudState>>,
}

#[derive(Default)]
struct FakeCloudState {
    target: Option<(TargetState, String)>,
    poll_failures_remaining: u32,
    report_failures_remaining: u32,
    fail_reports: bool,
    fail_status_updates: bool,
    reports: Vec<serde_json::Value>,
    next_jobs: VecDeque<JobExecutionData>,
    status_updates: Vec<(String, JobStatusUpdate)>,
    poll_count: u64,
    report_count: u64,
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this target under this ETag from now on.
    pub fn set_target(&self, target: TargetState, etag: impl Into<String>) {
        self.inner.lock().target = Some((target, etag.into()));
    }

    /// Fail the next `n` polls with a network error.
    pub fn fail_next_polls(&self, n: u32) {
        self.inner.lock().poll_failures_remaining = n;
    }

    /// Fail the next `n` report sends with a network error.
    pub fn fail_next_reports(&self, n: u32) {
        self.inner.lock().report_failures_remaining = n;
    }

    /// Fail every report send until cleared.
    pub fn set_fail_reports(&self, fail: bool) {
        self.inner.lock().fail_reports = fail;
    }

    pub fn set_fail_status_updates(&self, fail: bool) {
        self.inner.lock().fail_status_updates = fail;
    }

    /// Queue a job for the next-job poll.
    pub fn push_job(&self, job: JobExecutionData) {
        self.inner.lock().next_jobs.push_back(job);
    }

    pub fn reports(&self) -> Vec<serde_json::Value> {
        self.inner.lock().reports.clone()
    }

    pub fn status_updates(&self) -> Vec<(String, JobStatusUpdate)> {
        self.inner.lock().status_updates.clone()
    }

    pub fn poll_count(&self) -> u64 {
        self.inner.lock().poll_count
    }

    pub fn report_count(&self) -> u64 {
        self.inner.lock().report_count
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn fetch_target(&self, etag: Option<&str>) -> Result<PollOutcome, TransportError> {
        let mut state = self.inner.lock();
        state.poll_count += 1;
        if state.poll_failures_remaining > 0 {
            state.poll_failures_remaining -= 1;
            return Err(TransportError::NetworkUnreachable("fake outage".into()));
        }
        match &state.target {
            Some((target, current_etag)) => {
                if etag == Some(current_etag.as_str()) {
                    Ok(PollOutcome::NotModified)
                } else {
                    Ok(PollOutcome::Updated {
                        target: target.clone(),
                        etag: Some(current_etag.clone()),
                    })
                }
            }
            None => Err(TransportError::HttpStatus(404)),
        }
    }

    async fn send_report(&self, body: &serde_json::Value) -> Result<(), TransportError> {
        let mut state = self.inner.lock();
        state.report_count += 1;
        if state.report_failures_remaining > 0 {
            state.report_failures_remaining -= 1;
            return Err(TransportError::NetworkUnreachable("fake outage".into()));
        }
        if state.fail_reports {
            return Err(TransportError::NetworkUnreachable("fake outage".into()));
        }
        state.reports.push(body.clone());
        Ok(())
    }

    async fn next_job(&self) -> Result<Option<JobExecutionData>, TransportError> {
        Ok(self.inner.lock().next_jobs.pop_front())
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        update: &JobStatusUpdate,
    ) -> Result<(), TransportError> {
        let mut state = self.inner.lock();
        if state.fail_status_updates {
            return Err(TransportError::NetworkUnreachable("fake outage".into()));
        }
        state
            .status_updates
            .push((job_id.to_string(), update.clone()));
        Ok(())
    }
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud jobs packaged as a supervised feature.
//!
//! Starting spawns the delivery and executor tasks under a private
//! cancellation token; stopping cancels them and waits a bounded grace
//! period for the in-flight job.

use async_trait::async_trait;
use fleetd_core::FeatureKind;
use fleetd_engine::{Feature, FeatureError, FeatureRequirement, JobDelivery, JobEngine};
use fleetd_transport::{Broker, CloudApi};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct CloudJobsFeature<B, C> {
    delivery: Arc<JobDelivery<B, C>>,
    engine: Arc<JobEngine<B, C>>,
    running: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<B: Broker, C: CloudApi> CloudJobsFeature<B, C> {
    pub fn new(delivery: Arc<JobDelivery<B, C>>, engine: Arc<JobEngine<B, C>>) -> Arc<Self> {
        Arc::new(Self {
            delivery,
            engine,
            running: AtomicBool::new(false),
            cancel: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl<B: Broker, C: CloudApi> Feature for CloudJobsFeature<B, C> {
    fn kind(&self) -> FeatureKind {
        FeatureKind::CloudJobs
    }

    fn requirement(&self) -> FeatureRequirement {
        FeatureRequirement::BrokerOrCloud
    }

    async fn start(&self) -> Result<(), FeatureError> {
        if self.running.swap(true, Ordering::Relaxed) {
            return Ok(());
        }
        if let Err(err) = self.delivery.start().await {
            // Broker subscribe failure is not fatal: HTTP polling covers
            // delivery until the broker returns.
            tracing::warn!(error = %err, "jobs notify subscription failed, relying on polling");
        }
        let cancel = CancellationToken::new();
        let tasks = vec![
            tokio::spawn(self.delivery.clone().run(cancel.clone())),
            tokio::spawn(self.engine.clone().run(cancel.clone())),
        ];
        *self.cancel.lock() = Some(cancel);
        *self.tasks.lock() = tasks;
        Ok(())
    }

    async fn stop(&self) -> Result<(), FeatureError> {
        if !self.running.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        if let Some(cancel) = self.cancel.lock().take() {
            cancel.cancel();
        }
        if let Err(err) = self.delivery.stop().await {
            tracing::debug!(error = %err, "jobs notify unsubscribe failed");
        }
        // The executor finishes its in-flight job before observing the
        // cancellation; wait for it, bounded.
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                tracing::warn!("jobs task did not stop within grace period, aborting");
                abort.abort();
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[path = "jobs_feature_tests.rs"]
mod tests;

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam for system metrics attached to reports.
//!
//! The daemon supplies a sysinfo-backed implementation; tests and
//! metrics-less builds use [`NoMetrics`].

use async_trait::async_trait;
use fleetd_core::state::SystemMetrics;

#[async_trait]
pub trait MetricsSource: Send + Sync + 'static {
    /// Sample the host. Called at most once per metrics interval.
    async fn sample(&self) -> SystemMetrics;

    /// The device's primary local IP, if determinable.
    fn local_ip(&self) -> Option<String> {
        None
    }
}

/// No metrics: reports never carry a metrics attachment.
#[derive(Default, Clone)]
pub struct NoMetrics;

#[async_trait]
impl MetricsSource for NoMetrics {
    async fn sample(&self) -> SystemMetrics {
        SystemMetrics::default()
    }
}

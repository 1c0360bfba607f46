// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! sysinfo-backed metrics source.
//!
//! Sampling is blocking work and runs on the blocking pool. The System
//! handle is kept across samples so CPU usage has a previous measurement
//! to diff against.

use async_trait::async_trait;
use fleetd_core::state::{ProcessSample, SystemMetrics};
use fleetd_engine::MetricsSource;
use parking_lot::Mutex;
use std::sync::Arc;
use sysinfo::{Components, Disks, Networks, System};

const TOP_PROCESSES: usize = 5;

pub struct SysinfoMetrics {
    system: Arc<Mutex<System>>,
}

impl SysinfoMetrics {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_blocking(system: &Mutex<System>) -> SystemMetrics {
    let mut metrics = SystemMetrics::default();
    {
        let mut sys = system.lock();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        sys.refresh_processes(sysinfo::ProcessesToUpdate::All, true);

        metrics.cpu_usage = Some(sys.global_cpu_usage());
        metrics.memory_total = Some(sys.total_memory());
        metrics.memory_usage = Some(sys.used_memory());

        let mut processes: Vec<ProcessSample> = sys
            .processes()
            .values()
            .map(|p| ProcessSample {
                name: p.name().to_string_lossy().into_owned(),
                cpu: p.cpu_usage(),
                memory: p.memory(),
            })
            .collect();
        processes.sort_by(|a, b| b.cpu.partial_cmp(&a.cpu).unwrap_or(std::cmp::Ordering::Equal));
        processes.truncate(TOP_PROCESSES);
        metrics.top_processes = processes;
    }

    metrics.uptime = Some(System::uptime());

    let disks = Disks::new_with_refreshed_list();
    let (total, available) = disks
        .list()
        .iter()
        .fold((0u64, 0u64), |(total, available), disk| {
            (total + disk.total_space(), available + disk.available_space())
        });
    if total > 0 {
        metrics.storage_total = Some(total);
        metrics.storage_usage = Some(total - available);
    }

    let components = Components::new_with_refreshed_list();
    metrics.temperature = components
        .iter()
        .filter_map(|c| c.temperature())
        .fold(None, |max: Option<f32>, t| {
            Some(max.map_or(t, |m| m.max(t)))
        });

    let networks = Networks::new_with_refreshed_list();
    let mut interfaces: Vec<String> = networks.iter().map(|(name, _)| name.clone()).collect();
    interfaces.sort();
    metrics.network_interfaces = interfaces;

    metrics
}

/// Source address the kernel would use toward a public host; no traffic
/// is sent.
fn detect_local_ip() -> Option<String> {
    let socket = std::net::UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("8.8.8.8:53").ok()?;
    Some(socket.local_addr().ok()?.ip().to_string())
}

#[async_trait]
impl MetricsSource for SysinfoMetrics {
    async fn sample(&self) -> SystemMetrics {
        let system = self.system.clone();
        tokio::task::spawn_blocking(move || sample_blocking(&system))
            .await
            .unwrap_or_default()
    }

    fn local_ip(&self) -> Option<String> {
        detect_local_ip()
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;

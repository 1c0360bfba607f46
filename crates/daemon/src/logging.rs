// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tracing setup with a runtime-reloadable level.
//!
//! The config distributor publishes `config:logging` when the cloud
//! changes `logging.level`; a small listener task applies it through the
//! subscriber's reload handle.

use fleetd_core::{Event, EventBus};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};
use tokio_util::sync::CancellationToken;

pub type ReloadHandle = reload::Handle<EnvFilter, Registry>;

/// Install the global subscriber. `filter` uses EnvFilter syntax.
pub fn init(filter: &str) -> ReloadHandle {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .init();
    handle
}

/// Apply `config:logging` events to the reload handle.
pub async fn run_level_listener(bus: EventBus, handle: ReloadHandle, cancel: CancellationToken) {
    let sub = bus.subscribe_filtered("log-level", 8, |e| matches!(e, Event::LoggingChanged { .. }));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = sub.recv() => {
                if let Event::LoggingChanged { level } = event {
                    match handle.reload(EnvFilter::new(level.as_str())) {
                        Ok(()) => tracing::info!(level = %level, "log level applied"),
                        Err(err) => tracing::warn!(error = %err, "log level reload failed"),
                    }
                }
            }
        }
    }
}

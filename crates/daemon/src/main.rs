// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleetd: device-side fleet agent.

use fleetd_core::DeviceIdentity;
use fleetd_daemon::{env::AgentEnv, lifecycle, logging};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const EXIT_OK: i32 = 0;
const EXIT_FATAL: i32 = 1;
const EXIT_INTERRUPT: i32 = 130;
const EXIT_TERMINATE: i32 = 143;

#[tokio::main]
async fn main() {
    let env = AgentEnv::from_env();
    let reload = logging::init(&env.log_filter);

    let identity = match DeviceIdentity::load(&env.identity_path) {
        Ok(identity) => identity,
        Err(err) => {
            tracing::error!(
                path = %env.identity_path.display(),
                error = %err,
                "device identity unavailable, cannot start"
            );
            std::process::exit(EXIT_FATAL);
        }
    };

    let shutdown = CancellationToken::new();
    let exit_code = Arc::new(AtomicI32::new(EXIT_OK));
    spawn_signal_watcher(shutdown.clone(), exit_code.clone());

    match lifecycle::run(env, identity, reload, shutdown).await {
        Ok(()) => std::process::exit(exit_code.load(Ordering::Relaxed)),
        Err(err) => {
            tracing::error!(error = %err, "fatal initialization failure");
            std::process::exit(EXIT_FATAL);
        }
    }
}

fn spawn_signal_watcher(shutdown: CancellationToken, exit_code: Arc<AtomicI32>) {
    tokio::spawn(async move {
        let code = wait_for_signal().await;
        exit_code.store(code, Ordering::Relaxed);
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(err) => {
            tracing::warn!(error = %err, "cannot watch SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return EXIT_INTERRUPT;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
            EXIT_INTERRUPT
        }
        _ = term.recv() => {
            tracing::info!("terminate received");
            EXIT_TERMINATE
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> i32 {
    let _ = tokio::signal::ctrl_c().await;
    EXIT_INTERRUPT
}

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleetd-engine: the control loops that keep a device converged.
//!
//! The reconciler drives the container driver toward the cloud's target
//! state; the sync engine carries state both ways; the job subsystem
//! executes cloud jobs; the config distributor and feature supervisor
//! reshape all of it at runtime.

pub mod backoff;
pub mod config;
pub mod driver;
pub mod features;
pub mod intervals;
pub mod jobs;
pub mod metrics;
pub mod monitor;
pub mod plan;
pub mod reconciler;
pub mod sync;

pub use backoff::Backoff;
pub use config::{run_distributor, ConfigDistributor};
pub use driver::{ContainerDriver, DriverError, MemoryDriver};
pub use features::{
    Feature, FeatureError, FeatureRequirement, FeatureSupervisor, RequirementProbe,
};
pub use intervals::Intervals;
pub use jobs::{JobDelivery, JobEngine, JobEngineHandle, JobError};
pub use metrics::{MetricsSource, NoMetrics};
pub use monitor::{ConnectionMonitor, SyncOp};
pub use plan::{compute_plan, Plan, PlanAction};
pub use reconciler::{ReconcileSummary, Reconciler};
pub use sync::{SyncDeps, SyncEngine};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleetd daemon library: environment, logging and lifecycle wiring for
//! the `fleetd` binary.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod env;
pub mod jobs_feature;
pub mod lifecycle;
pub mod logging;
pub mod metrics;

pub use env::AgentEnv;
pub use jobs_feature::CloudJobsFeature;
pub use lifecycle::{run, StartupError};
pub use metrics::SysinfoMetrics;

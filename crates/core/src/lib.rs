// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleetd-core: data model and in-process plumbing for the fleetd agent

pub mod app;
pub mod bus;
pub mod clock;
pub mod device_config;
pub mod event;
pub mod health;
pub mod identity;
pub mod job;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use app::{AppSpec, RestartPolicy, ServiceConfig, ServiceSpec, ServiceStatus};
pub use bus::{EventBus, Subscription};
pub use clock::{Clock, FakeClock, SystemClock};
pub use device_config::{
    AgentSettings, DeviceConfig, FeatureKind, FeatureToggle, IntervalChange, IntervalKind,
    LogLevel,
};
pub use event::Event;
pub use health::{ConnStatus, ConnectionHealth, FeatureHealth};
pub use identity::{DeviceIdentity, IdentityError};
pub use job::{
    DeliveryMode, JobDocument, JobExecutionData, JobStatus, JobStatusUpdate, JobStep, StepAction,
};
pub use state::{CurrentState, QueuedReport, StateReport, TargetState};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleetd-transport: the agent's two links to the cloud.
//!
//! One shared pub/sub broker connection and one HTTP client, both behind
//! traits so the engine can be driven by fakes in tests.

pub mod broker;
pub mod error;
pub mod http;

pub use broker::{Broker, BrokerConfig, IncomingMessage, MessageHandler, MqttBroker, NoBroker, Qos};
pub use error::TransportError;
pub use http::{CloudApi, HttpApi, PollOutcome};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeBroker, FakeCloud};

// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! fleetd-storage: what the agent persists between restarts.
//!
//! The offline queue holds stripped state reports while the cloud is
//! unreachable; the ETag cache lets a restarted agent poll conditionally
//! right away.

pub mod etag;
pub mod queue;

pub use etag::EtagCache;
pub use queue::{OfflineQueue, QueueError};

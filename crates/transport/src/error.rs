// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Transport failure taxonomy.
//!
//! Callers branch on kind, not message: transient failures feed backoff,
//! auth failures pause the feature, protocol errors are logged and the
//! loop continues.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("cloud returned HTTP {0}")]
    HttpStatus(u16),

    #[error("authentication rejected (HTTP {0})")]
    Auth(u16),

    #[error("broker not connected")]
    NotConnected,

    #[error("broker publish timed out")]
    PublishTimeout,

    #[error("broker refused subscription to {0}")]
    SubscribeDenied(String),

    #[error("payload encode/decode failed: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("wire body invalid: {0}")]
    Wire(#[from] fleetd_core::state::WireError),

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// Transient failures are retried with backoff and never fatal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout
                | Self::NetworkUnreachable(_)
                | Self::NotConnected
                | Self::PublishTimeout
        ) || matches!(self, Self::HttpStatus(code) if *code >= 500)
    }

    /// 401/403: credentials need refreshing before retrying.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    /// Classify an HTTP status code into Auth / HttpStatus.
    pub fn from_status(code: u16) -> Self {
        match code {
            401 | 403 => Self::Auth(code),
            other => Self::HttpStatus(other),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

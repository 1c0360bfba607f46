// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cloud HTTP client: conditional target polls, gzip report patches,
//! job polling and job status updates.
//!
//! Every request carries `X-Device-API-Key`. A 304 on the target poll is
//! surfaced as a value, not an error.

use crate::error::TransportError;
use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use fleetd_core::{DeviceIdentity, JobExecutionData, JobStatusUpdate, TargetState};
use std::io::Write;
use std::time::Duration;

const API_KEY_HEADER: &str = "X-Device-API-Key";

/// Outcome of a conditional target-state poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// 304: the cached target is still current.
    NotModified,
    /// 200: a (possibly unchanged-in-content) target body with its ETag.
    Updated {
        target: TargetState,
        etag: Option<String>,
    },
}

/// The cloud HTTP surface the engine depends on.
#[async_trait]
pub trait CloudApi: Send + Sync + 'static {
    /// Conditional GET of target state with `If-None-Match`.
    async fn fetch_target(&self, etag: Option<&str>) -> Result<PollOutcome, TransportError>;

    /// PATCH a state report body (already keyed by device uuid).
    async fn send_report(&self, body: &serde_json::Value) -> Result<(), TransportError>;

    /// Poll for the next pending job, if any.
    async fn next_job(&self) -> Result<Option<JobExecutionData>, TransportError>;

    /// PATCH a job status update.
    async fn update_job_status(
        &self,
        job_id: &str,
        update: &JobStatusUpdate,
    ) -> Result<(), TransportError>;
}

/// reqwest-backed [`CloudApi`].
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    identity: DeviceIdentity,
}

impl HttpApi {
    pub fn new(
        base_url: impl Into<String>,
        identity: DeviceIdentity,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            identity,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::NetworkUnreachable(err.to_string())
        }
    }

    fn gzip(body: &serde_json::Value) -> Result<Vec<u8>, TransportError> {
        let raw = serde_json::to_vec(body)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(&raw)
            .and_then(|_| encoder.finish())
            .map_err(|e| TransportError::NetworkUnreachable(format!("gzip encode: {e}")))
    }
}

#[async_trait]
impl CloudApi for HttpApi {
    async fn fetch_target(&self, etag: Option<&str>) -> Result<PollOutcome, TransportError> {
        let url = self.url(&format!("/api/v1/device/{}/state", self.identity.uuid));
        let mut request = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.identity.api_key);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag);
        }

        let response = request.send().await.map_err(Self::classify)?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(PollOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16()));
        }

        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body: serde_json::Value = response.json().await.map_err(Self::classify)?;
        let target = TargetState::from_wire(&self.identity.uuid, &body)?;
        Ok(PollOutcome::Updated { target, etag })
    }

    async fn send_report(&self, body: &serde_json::Value) -> Result<(), TransportError> {
        let url = self.url("/api/v1/device/state");
        let compressed = Self::gzip(body)?;
        let response = self
            .client
            .patch(&url)
            .header(API_KEY_HEADER, &self.identity.api_key)
            .header(reqwest::header::CONTENT_ENCODING, "gzip")
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(compressed)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16()));
        }
        Ok(())
    }

    async fn next_job(&self) -> Result<Option<JobExecutionData>, TransportError> {
        let url = self.url(&format!(
            "/api/v1/devices/{}/jobs/next",
            self.identity.uuid
        ));
        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.identity.api_key)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if status == reqwest::StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16()));
        }

        let text = response.text().await.map_err(Self::classify)?;
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "null" || trimmed == "{}" {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(trimmed)?))
    }

    async fn update_job_status(
        &self,
        job_id: &str,
        update: &JobStatusUpdate,
    ) -> Result<(), TransportError> {
        let url = self.url(&format!(
            "/api/v1/devices/{}/jobs/{}/status",
            self.identity.uuid, job_id
        ));
        let response = self
            .client
            .patch(&url)
            .header(API_KEY_HEADER, &self.identity.api_key)
            .json(update)
            .send()
            .await
            .map_err(Self::classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::from_status(status.as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;

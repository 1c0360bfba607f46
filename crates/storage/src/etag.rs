// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted ETag of the last successful target-state poll.
//!
//! Best-effort: a lost or unreadable cache only costs one unconditional
//! poll after restart, so failures are logged and swallowed.

use std::path::PathBuf;

pub struct EtagCache {
    path: PathBuf,
}

impl EtagCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Option<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => {
                let etag = raw.trim();
                (!etag.is_empty()).then(|| etag.to_string())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                tracing::warn!(error = %err, "etag cache unreadable");
                None
            }
        }
    }

    pub fn store(&self, etag: &str) {
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(err) = std::fs::write(&self.path, etag) {
            tracing::warn!(error = %err, "failed to persist etag");
        }
    }

    pub fn clear(&self) {
        if self.path.exists() {
            if let Err(err) = std::fs::remove_file(&self.path) {
                tracing::warn!(error = %err, "failed to clear etag cache");
            }
        }
    }
}

#[cfg(test)]
#[path = "etag_tests.rs"]
mod tests;

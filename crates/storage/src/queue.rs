// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable FIFO of reports awaiting transmission.
//!
//! One JSON file per record, named by a zero-padded sequence number so
//! lexicographic directory order is arrival order. Restarts resume from
//! whatever is on disk. Delivery is at-least-once; the cloud treats
//! reports as idempotent upserts, so duplicates are harmless.

use fleetd_core::QueuedReport;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue IO failed: {0}")]
    DurableIo(#[from] std::io::Error),
    #[error("queue record corrupt: {0}")]
    Corrupt(String),
}

/// Bounded on-disk FIFO of [`QueuedReport`]s.
pub struct OfflineQueue {
    dir: PathBuf,
    cap: usize,
    next_seq: u64,
}

impl OfflineQueue {
    /// Open (or create) the queue directory and resume sequence numbering
    /// after whatever is already on disk.
    pub fn open(dir: impl Into<PathBuf>, cap: usize) -> Result<Self, QueueError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let next_seq = Self::scan(&dir)?
            .last()
            .map(|(seq, _)| seq + 1)
            .unwrap_or(0);
        Ok(Self {
            dir,
            cap: cap.max(1),
            next_seq,
        })
    }

    /// Entries on disk, oldest first.
    fn scan(dir: &Path) -> Result<Vec<(u64, PathBuf)>, QueueError> {
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let seq = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok());
            if let Some(seq) = seq {
                entries.push((seq, path));
            }
        }
        entries.sort_unstable_by_key(|(seq, _)| *seq);
        Ok(entries)
    }

    fn entry_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{seq:020}.json"))
    }

    /// Append a report. When the cap is breached the oldest record is
    /// dropped and logged; the device bounds what an outage can cost.
    pub fn enqueue(&mut self, report: &QueuedReport) -> Result<u64, QueueError> {
        let seq = self.next_seq;
        let path = self.entry_path(seq);
        let raw = serde_json::to_vec(report).map_err(|e| QueueError::Corrupt(e.to_string()))?;
        std::fs::write(&path, raw)?;
        self.next_seq += 1;

        let entries = Self::scan(&self.dir)?;
        if entries.len() > self.cap {
            let excess = entries.len() - self.cap;
            for (dropped_seq, dropped_path) in entries.into_iter().take(excess) {
                std::fs::remove_file(&dropped_path)?;
                tracing::warn!(seq = dropped_seq, "offline queue full, dropped oldest report");
            }
        }
        Ok(seq)
    }

    pub fn size(&self) -> usize {
        Self::scan(&self.dir).map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Oldest queued report. Corrupt records are removed and skipped so
    /// one bad write cannot wedge the drain.
    pub fn peek(&self) -> Result<Option<(u64, QueuedReport)>, QueueError> {
        for (seq, path) in Self::scan(&self.dir)? {
            let raw = std::fs::read(&path)?;
            match serde_json::from_slice::<QueuedReport>(&raw) {
                Ok(report) => return Ok(Some((seq, report))),
                Err(err) => {
                    tracing::warn!(seq, error = %err, "dropping corrupt queue record");
                    std::fs::remove_file(&path)?;
                }
            }
        }
        Ok(None)
    }

    /// Remove a delivered record.
    pub fn ack(&mut self, seq: u64) -> Result<(), QueueError> {
        let path = self.entry_path(seq);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Drain head-first through `send`, stopping on the first failure so
    /// the remainder is preserved in order. Returns the number sent and
    /// the error that stopped the drain, if any.
    pub async fn flush<F, Fut, E>(&mut self, mut send: F) -> (usize, Option<E>)
    where
        F: FnMut(QueuedReport) -> Fut,
        Fut: Future<Output = Result<(), E>>,
    {
        let mut sent = 0;
        loop {
            let (seq, report) = match self.peek() {
                Ok(Some(entry)) => entry,
                Ok(None) => return (sent, None),
                Err(err) => {
                    tracing::warn!(error = %err, "queue unreadable during flush");
                    return (sent, None);
                }
            };
            match send(report).await {
                Ok(()) => {
                    if let Err(err) = self.ack(seq) {
                        tracing::warn!(seq, error = %err, "failed to remove sent report");
                        return (sent + 1, None);
                    }
                    sent += 1;
                }
                Err(err) => return (sent, Some(err)),
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;

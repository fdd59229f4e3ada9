//! Per-pass statistics.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::sync::event::{ChangeKind, ItemFailure};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PassReport {
    pub files_created: usize,
    pub files_updated: usize,
    pub files_deleted: usize,
    pub dirs_deleted: usize,
    /// Files whose timestamp was newer but whose digest matched.
    pub files_unchanged: usize,
    pub bytes_copied: u64,
    /// Failures as (relative path, message).
    pub failures: Vec<(PathBuf, String)>,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

impl PassReport {
    /// Total change events the pass emitted.
    pub fn changes(&self) -> usize {
        self.files_created + self.files_updated + self.files_deleted + self.dirs_deleted
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Counters shared by every task of a pass.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    created: AtomicUsize,
    updated: AtomicUsize,
    deleted: AtomicUsize,
    dirs_deleted: AtomicUsize,
    unchanged: AtomicUsize,
    bytes: AtomicU64,
    failures: Mutex<Vec<(PathBuf, String)>>,
}

impl Tally {
    pub fn record(&self, kind: ChangeKind) {
        let counter = match kind {
            ChangeKind::FileCreated => &self.created,
            ChangeKind::FileUpdated => &self.updated,
            ChangeKind::FileDeleted => &self.deleted,
            ChangeKind::DirectoryDeleted => &self.dirs_deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unchanged(&self) {
        self.unchanged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes(&self, bytes: u64) {
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_failure(&self, failure: &ItemFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((failure.path.clone(), failure.error.to_string()));
        }
    }

    pub fn into_report(self, duration: Duration) -> PassReport {
        let mut failures = self.failures.into_inner().unwrap_or_default();
        failures.sort();
        PassReport {
            files_created: self.created.into_inner(),
            files_updated: self.updated.into_inner(),
            files_deleted: self.deleted.into_inner(),
            dirs_deleted: self.dirs_deleted.into_inner(),
            files_unchanged: self.unchanged.into_inner(),
            bytes_copied: self.bytes.into_inner(),
            failures,
            duration,
        }
    }
}

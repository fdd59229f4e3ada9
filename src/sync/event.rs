//! Change events emitted by a reconciliation pass.

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::sync::error::SyncError;

/// Kind of change applied to the replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    FileCreated,
    FileUpdated,
    FileDeleted,
    DirectoryDeleted,
}

/// One create, update or delete action taken on the replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Path relative to the replica root.
    pub path: PathBuf,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    pub fn file_created(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::FileCreated, path)
    }

    pub fn file_updated(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::FileUpdated, path)
    }

    pub fn file_deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::FileDeleted, path)
    }

    pub fn directory_deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::DirectoryDeleted, path)
    }
}

/// Renders the log line for this event.
impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = display_relative(&self.path);
        match self.kind {
            ChangeKind::FileCreated => write!(f, "(+) Copied {} to replica folder.", name),
            ChangeKind::FileUpdated => write!(f, "(~) Updated {} to a newer version.", name),
            ChangeKind::FileDeleted => write!(f, "(-) Deleted {} from replica.", name),
            ChangeKind::DirectoryDeleted => write!(f, "(-) Deleted folder {} from replica.", name),
        }
    }
}

/// A file or directory that could not be reconciled this pass.
#[derive(Debug)]
pub struct ItemFailure {
    /// Path relative to the roots.
    pub path: PathBuf,
    pub error: SyncError,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: {}: {}", display_relative(&self.path), self.error)
    }
}

/// Relative paths are shown with `/` separators on every platform.
pub(crate) fn display_relative(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

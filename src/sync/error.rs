//! Error types for reconciliation.
//!
//! Every failure inside a pass is scoped to one file or one directory. The
//! engine classifies the underlying `io::Error` so diagnostics can say what
//! actually went wrong (the source changed under us, a permission problem,
//! or anything else).

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A failure affecting a single file or directory during a pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The entry disappeared between listing and acting on it.
    #[error("'{}' was deleted during the backup process (while {operation})", path.display())]
    Vanished {
        path: PathBuf,
        operation: &'static str,
    },

    #[error("access to '{}' was denied (while {operation})", path.display())]
    PermissionDenied {
        path: PathBuf,
        operation: &'static str,
    },

    #[error("unexpected error while {operation} '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl SyncError {
    /// Classify an `io::Error` raised while performing `operation` on `path`.
    pub fn from_io(err: io::Error, operation: &'static str, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => SyncError::Vanished { path, operation },
            io::ErrorKind::PermissionDenied => SyncError::PermissionDenied { path, operation },
            _ => SyncError::Io {
                path,
                operation,
                source: err,
            },
        }
    }

    /// Path of the entry the failure refers to.
    pub fn path(&self) -> &PathBuf {
        match self {
            SyncError::Vanished { path, .. }
            | SyncError::PermissionDenied { path, .. }
            | SyncError::Io { path, .. } => path,
        }
    }

    /// Whether the failure is the source tree changing mid-pass.
    pub fn is_vanished(&self) -> bool {
        matches!(self, SyncError::Vanished { .. })
    }
}

/// Extension for attaching an operation and path to raw I/O results.
pub(crate) trait IoResultExt<T> {
    fn during(self, operation: &'static str, path: &std::path::Path) -> Result<T, SyncError>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn during(self, operation: &'static str, path: &std::path::Path) -> Result<T, SyncError> {
        self.map_err(|e| SyncError::from_io(e, operation, path))
    }
}

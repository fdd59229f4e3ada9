//! One-way tree mirroring.
//!
//! The reconciler diffs a source tree against a replica tree level by level,
//! copies what is new or changed, and deletes what no longer exists in the
//! source.

pub mod copy;
pub mod engine;
pub mod error;
pub mod event;
pub mod hash;
pub mod listing;
pub mod protect;
pub mod report;
pub mod sink;
pub mod size_class;

pub use engine::{IoOp, IoProbe, IoTrace, ReconcileConfig, Reconciler};
pub use error::SyncError;
pub use event::{ChangeEvent, ChangeKind, ItemFailure};
pub use hash::{digest_bytes, digest_file, FileDigest};
pub use listing::DirectoryListing;
pub use protect::ProtectedNames;
pub use report::PassReport;
pub use sink::{EventSink, LogSink, MemorySink};
pub use size_class::SizeClass;

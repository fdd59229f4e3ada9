//! Tree reconciliation engine.
//!
//! One call to [`Reconciler::run`] walks the source tree and brings the
//! replica into conformance with it. At every directory level the engine
//! snapshots both listings and then runs five passes in order:
//!
//! 1. create files missing from the replica
//! 2. update files whose source timestamp is newer and whose digest differs
//! 3. delete replica files with no source counterpart
//! 4. ensure each source subdirectory exists in the replica, then recurse
//! 5. delete replica subdirectories with no source counterpart
//!
//! Each pass fans out one task per entry on a bounded rayon pool and is
//! joined before the next one starts. A failure on one entry is reported and
//! never stops its siblings.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::sync::copy::copy_with_buffer;
use crate::sync::error::{IoResultExt, SyncError};
use crate::sync::event::{ChangeEvent, ItemFailure};
use crate::sync::hash::digest_file;
use crate::sync::listing::DirectoryListing;
use crate::sync::protect::ProtectedNames;
use crate::sync::report::{PassReport, Tally};
use crate::sync::sink::EventSink;
use crate::sync::size_class::SizeClass;

/// Reconciler configuration.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Worker threads in the pool. Zero means one per CPU.
    pub workers: usize,
    /// Digest every file present on both sides, ignoring timestamps.
    pub strict: bool,
    /// Replica entries the deletion passes must leave alone.
    pub protect: ProtectedNames,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            strict: false,
            protect: ProtectedNames::new(),
        }
    }
}

/// Kind of buffered I/O the engine performed on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Copy,
    Digest,
}

/// One buffered read or copy, as seen by an [`IoProbe`].
#[derive(Debug, Clone)]
pub struct IoTrace {
    /// Path relative to the roots.
    pub path: PathBuf,
    pub op: IoOp,
    pub size_class: SizeClass,
    pub buffer_size: usize,
}

/// Observer invoked before every buffered copy or digest.
pub type IoProbe = Box<dyn Fn(&IoTrace) + Send + Sync>;

/// What already sits at the replica name a new source file needs.
#[derive(Debug, Clone, Copy)]
enum Occupant {
    Nothing,
    Directory,
    DanglingLink,
}

/// Roots and counters for one pass.
struct Pass {
    source_root: PathBuf,
    replica_root: PathBuf,
    tally: Tally,
}

impl Pass {
    fn new(source_root: &Path, replica_root: &Path) -> Self {
        Self {
            source_root: source_root.to_path_buf(),
            replica_root: replica_root.to_path_buf(),
            tally: Tally::default(),
        }
    }

    fn source(&self, rel: &Path) -> PathBuf {
        self.source_root.join(rel)
    }

    fn replica(&self, rel: &Path) -> PathBuf {
        self.replica_root.join(rel)
    }
}

/// Mirrors a source tree onto a replica tree.
pub struct Reconciler {
    config: ReconcileConfig,
    pool: rayon::ThreadPool,
    sink: Arc<dyn EventSink>,
    probe: Option<IoProbe>,
}

impl Reconciler {
    /// Create a reconciler with its own worker pool.
    pub fn new(config: ReconcileConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        let workers = if config.workers == 0 {
            num_cpus::get()
        } else {
            config.workers
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("treemirror-worker-{}", i))
            .build()
            .context("Failed to build reconciliation worker pool")?;

        Ok(Self {
            config,
            pool,
            sink,
            probe: None,
        })
    }

    /// Observe every buffered copy and digest.
    pub fn with_io_probe<F>(mut self, probe: F) -> Self
    where
        F: Fn(&IoTrace) + Send + Sync + 'static,
    {
        self.probe = Some(Box::new(probe));
        self
    }

    /// Number of worker threads in the pool.
    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run one full pass. Both roots must already exist.
    pub fn run(&self, source_root: &Path, replica_root: &Path) -> PassReport {
        let start = Instant::now();
        let pass = Pass::new(source_root, replica_root);

        self.pool.install(|| self.reconcile_dir(&pass, Path::new("")));

        self.finish(pass, start)
    }

    /// Run one full pass, using already-taken snapshots for the top level.
    ///
    /// Deeper levels are listed live. Entries that changed after the
    /// snapshots were taken are handled exactly as they would be if they
    /// changed mid-pass.
    pub fn run_with_listings(
        &self,
        source_root: &Path,
        replica_root: &Path,
        source: &DirectoryListing,
        replica: &DirectoryListing,
    ) -> PassReport {
        let start = Instant::now();
        let pass = Pass::new(source_root, replica_root);

        self.pool
            .install(|| self.reconcile_listed(&pass, Path::new(""), source, replica));

        self.finish(pass, start)
    }

    fn finish(&self, pass: Pass, start: Instant) -> PassReport {
        let report = pass.tally.into_report(start.elapsed());
        tracing::debug!(
            created = report.files_created,
            updated = report.files_updated,
            deleted = report.files_deleted,
            dirs_deleted = report.dirs_deleted,
            failures = report.failures.len(),
            elapsed_ms = report.duration.as_millis() as u64,
            "reconciliation pass finished"
        );
        report
    }

    /// List both sides of `rel` and reconcile them.
    fn reconcile_dir(&self, pass: &Pass, rel: &Path) {
        let source = match DirectoryListing::read(&pass.source(rel)) {
            Ok(listing) => listing,
            Err(e) => return self.fail(pass, rel, e),
        };
        let replica = match DirectoryListing::read(&pass.replica(rel)) {
            Ok(listing) => listing,
            Err(e) => return self.fail(pass, rel, e),
        };

        self.reconcile_listed(pass, rel, &source, &replica);
    }

    fn reconcile_listed(
        &self,
        pass: &Pass,
        rel: &Path,
        source: &DirectoryListing,
        replica: &DirectoryListing,
    ) {
        let created: Vec<&OsString> = source
            .files
            .iter()
            .filter(|name| !replica.files.contains(*name))
            .collect();
        let updated: Vec<&OsString> = source
            .files
            .iter()
            .filter(|name| replica.files.contains(*name))
            .collect();
        let deleted: Vec<&OsString> = replica
            .files
            .iter()
            .chain(replica.dangling.iter())
            .filter(|name| !source.files.contains(*name))
            .collect();
        // A replica directory shadowed by a source file belongs to the creation pass.
        let dirs_deleted: Vec<&OsString> = replica
            .dirs
            .iter()
            .filter(|name| !source.dirs.contains(*name) && !source.files.contains(*name))
            .collect();

        created.par_iter().for_each(|name| {
            if self.is_live_log(pass, &rel.join(name)) {
                return;
            }
            let occupant = if replica.dirs.contains(*name) {
                Occupant::Directory
            } else if replica.dangling.contains(*name) {
                Occupant::DanglingLink
            } else {
                Occupant::Nothing
            };
            self.item(pass, rel.join(name), |item| self.create_file(pass, item, occupant));
        });

        updated.par_iter().for_each(|name| {
            if self.is_live_log(pass, &rel.join(name)) {
                return;
            }
            self.item(pass, rel.join(name), |item| self.update_file(pass, item));
        });

        deleted.par_iter().for_each(|name| {
            if self.config.protect.protects_file(name) {
                tracing::debug!(path = %rel.join(name).display(), "keeping protected replica file");
                return;
            }
            self.item(pass, rel.join(name), |item| self.delete_file(pass, item));
        });

        source.dirs.par_iter().for_each(|name| {
            let item = rel.join(name);
            match self.ensure_replica_dir(pass, &item) {
                Ok(()) => self.reconcile_dir(pass, &item),
                Err(e) => self.fail(pass, &item, e),
            }
        });

        dirs_deleted.par_iter().for_each(|name| {
            if self.config.protect.protects_dir(name) {
                tracing::debug!(path = %rel.join(name).display(), "keeping protected replica folder");
                return;
            }
            self.item(pass, rel.join(name), |item| self.remove_replica_dir(pass, item));
        });
    }

    /// Whether the replica path is the log file currently being written.
    ///
    /// A source file that happens to share the log's location is never
    /// copied over it.
    fn is_live_log(&self, pass: &Pass, rel: &Path) -> bool {
        let protect = &self.config.protect;
        let named_like_log = rel
            .file_name()
            .map_or(false, |name| protect.is_log_name(name));
        if named_like_log && protect.is_log_file(&pass.replica(rel)) {
            tracing::debug!(path = %rel.display(), "not overwriting the log file");
            return true;
        }
        false
    }

    /// Run one item's work, isolating its failure.
    fn item<F>(&self, pass: &Pass, rel: PathBuf, work: F)
    where
        F: FnOnce(&Path) -> Result<(), SyncError>,
    {
        if let Err(e) = work(&rel) {
            self.fail(pass, &rel, e);
        }
    }

    fn fail(&self, pass: &Pass, rel: &Path, error: SyncError) {
        tracing::warn!(path = %rel.display(), "{}", error);
        let failure = ItemFailure {
            path: rel.to_path_buf(),
            error,
        };
        pass.tally.record_failure(&failure);
        self.sink.report_failure(&failure);
    }

    fn emit(&self, pass: &Pass, event: ChangeEvent) {
        pass.tally.record(event.kind);
        self.sink.emit(&event);
    }

    fn observe(&self, rel: &Path, op: IoOp, size_class: SizeClass) {
        if let Some(probe) = &self.probe {
            probe(&IoTrace {
                path: rel.to_path_buf(),
                op,
                size_class,
                buffer_size: size_class.buffer_size(),
            });
        }
    }

    fn create_file(&self, pass: &Pass, rel: &Path, occupant: Occupant) -> Result<(), SyncError> {
        let src = pass.source(rel);
        let dst = pass.replica(rel);

        match occupant {
            Occupant::Nothing => {}
            Occupant::Directory => {
                self.remove_replica_dir(pass, rel)?;
                // Pruned around the log rather than removed.
                if dst.is_dir() {
                    tracing::debug!(path = %rel.display(), "folder holding the log file keeps its place");
                    return Ok(());
                }
            }
            Occupant::DanglingLink => {
                fs::remove_file(&dst).during("replacing", &dst)?;
            }
        }

        let len = fs::metadata(&src).during("copying", &src)?.len();
        let class = SizeClass::of(len);
        self.observe(rel, IoOp::Copy, class);
        let bytes = copy_with_buffer(&src, &dst, class.buffer_size())?;

        pass.tally.record_bytes(bytes);
        self.emit(pass, ChangeEvent::file_created(rel));
        Ok(())
    }

    /// Timestamp gate first, then digests, then copy.
    ///
    /// A source file whose content changed without its timestamp advancing
    /// is not propagated unless strict mode is on.
    fn update_file(&self, pass: &Pass, rel: &Path) -> Result<(), SyncError> {
        let src = pass.source(rel);
        let dst = pass.replica(rel);

        let src_meta = fs::metadata(&src).during("comparing", &src)?;
        if !self.config.strict {
            let dst_meta = fs::metadata(&dst).during("comparing", &dst)?;
            let src_modified = src_meta.modified().during("comparing", &src)?;
            let dst_modified = dst_meta.modified().during("comparing", &dst)?;
            if src_modified <= dst_modified {
                return Ok(());
            }
        }

        let class = SizeClass::of(src_meta.len());
        self.observe(rel, IoOp::Digest, class);
        let src_digest = digest_file(&src, class.buffer_size())?;
        self.observe(rel, IoOp::Digest, class);
        let dst_digest = digest_file(&dst, class.buffer_size())?;

        if src_digest == dst_digest {
            pass.tally.record_unchanged();
            return Ok(());
        }

        self.observe(rel, IoOp::Copy, class);
        let bytes = copy_with_buffer(&src, &dst, class.buffer_size())?;

        pass.tally.record_bytes(bytes);
        self.emit(pass, ChangeEvent::file_updated(rel));
        Ok(())
    }

    fn delete_file(&self, pass: &Pass, rel: &Path) -> Result<(), SyncError> {
        let dst = pass.replica(rel);
        fs::remove_file(&dst).during("deleting", &dst)?;
        self.emit(pass, ChangeEvent::file_deleted(rel));
        Ok(())
    }

    /// Create the replica side of a source subdirectory if it is missing.
    fn ensure_replica_dir(&self, pass: &Pass, rel: &Path) -> Result<(), SyncError> {
        let dst = pass.replica(rel);
        match fs::create_dir(&dst) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dst.is_dir() => Ok(()),
            Err(e) => Err(SyncError::from_io(e, "creating folder", dst)),
        }
    }

    /// Remove a replica directory and everything under it.
    ///
    /// If the log file lives somewhere inside, the directory is pruned around
    /// it instead: everything except the log and its ancestors is removed.
    fn remove_replica_dir(&self, pass: &Pass, rel: &Path) -> Result<(), SyncError> {
        let dst = pass.replica(rel);

        if self.config.protect.log_inside(&dst) {
            tracing::debug!(path = %rel.display(), "pruning around the log file");
            return self.prune_around_log(pass, rel);
        }

        fs::remove_dir_all(&dst).during("deleting folder", &dst)?;
        self.emit(pass, ChangeEvent::directory_deleted(rel));
        Ok(())
    }

    fn prune_around_log(&self, pass: &Pass, rel: &Path) -> Result<(), SyncError> {
        let dir = pass.replica(rel);
        let protect = &self.config.protect;

        for entry in fs::read_dir(&dir).during("listing directory", &dir)? {
            let entry = entry.during("listing directory", &dir)?;
            let path = entry.path();
            let child = rel.join(entry.file_name());

            if protect.is_log_file(&path) {
                continue;
            }

            let is_dir = entry
                .file_type()
                .map(|t| t.is_dir())
                .during("deleting", &path)?;

            if is_dir && protect.log_inside(&path) {
                self.prune_around_log(pass, &child)?;
            } else if is_dir {
                fs::remove_dir_all(&path).during("deleting folder", &path)?;
                self.emit(pass, ChangeEvent::directory_deleted(child));
            } else {
                fs::remove_file(&path).during("deleting", &path)?;
                self.emit(pass, ChangeEvent::file_deleted(child));
            }
        }

        Ok(())
    }
}

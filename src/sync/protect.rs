//! Replica entries that must survive the deletion passes.
//!
//! The log file may live inside the replica tree. It has no source
//! counterpart, so without protection the first pass would delete it. Any
//! entry whose base name equals the log file's name is kept, as is any entry
//! matching one of the user's protect globs.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Names and paths that the reconciler never deletes from the replica.
#[derive(Debug, Clone)]
pub struct ProtectedNames {
    log_name: Option<OsString>,
    log_path: Option<PathBuf>,
    glob_set: GlobSet,
    patterns: Vec<String>,
}

impl Default for ProtectedNames {
    fn default() -> Self {
        Self::new()
    }
}

impl ProtectedNames {
    /// Protect nothing.
    pub fn new() -> Self {
        Self {
            log_name: None,
            log_path: None,
            glob_set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Protect the log file: its base name at every level, and its exact
    /// location when a whole replica subdirectory is being removed.
    pub fn with_log_file(mut self, log_file: &Path) -> Self {
        self.log_name = log_file.file_name().map(OsStr::to_os_string);
        self.log_path = Some(absolutize(log_file));
        self
    }

    /// Add glob patterns matched against base names (e.g. `*.keep`).
    pub fn with_patterns<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        let mut all = self.patterns.clone();
        all.extend(patterns.iter().map(|p| p.as_ref().to_string()));

        for pattern in &all {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid protect pattern: {}", pattern))?;
            builder.add(glob);
        }

        self.glob_set = builder.build()?;
        self.patterns = all;
        Ok(self)
    }

    /// Whether a replica file with this base name must be kept.
    pub fn protects_file(&self, name: &OsStr) -> bool {
        self.is_log_name(name) || self.matches_pattern(name)
    }

    /// Whether `name` is the log file's base name.
    pub fn is_log_name(&self, name: &OsStr) -> bool {
        self.log_name.as_deref() == Some(name)
    }

    /// Whether a replica directory with this base name must be kept.
    pub fn protects_dir(&self, name: &OsStr) -> bool {
        self.matches_pattern(name)
    }

    /// Absolute location of the log file, if one was configured.
    pub fn log_path(&self) -> Option<&Path> {
        self.log_path.as_deref()
    }

    /// Whether removing `dir` recursively would also remove the log file.
    pub fn log_inside(&self, dir: &Path) -> bool {
        match &self.log_path {
            Some(log) => log.starts_with(absolutize(dir)),
            None => false,
        }
    }

    /// Whether `path` is the log file itself.
    pub fn is_log_file(&self, path: &Path) -> bool {
        match &self.log_path {
            Some(log) => *log == absolutize(path),
            None => false,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    fn matches_pattern(&self, name: &OsStr) -> bool {
        !self.glob_set.is_empty() && self.glob_set.is_match(Path::new(name))
    }
}

/// Canonicalize when possible so paths compare reliably.
///
/// The log file might not exist yet, in which case its parent is resolved
/// and the file name re-attached.
fn absolutize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

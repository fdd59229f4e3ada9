//! Run configuration.
//!
//! Values come from, lowest precedence first: built-in defaults, a TOML file,
//! and command-line flags. The interactive prompt accepts the single-line
//! `source;replica;interval;logfile` form.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::sync::{ProtectedNames, ReconcileConfig};

/// File name looked up under the user's config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Everything needed to run the mirror loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source tree (ground truth).
    pub source: PathBuf,
    /// Replica tree kept in conformance with the source.
    pub replica: PathBuf,
    /// Seconds to wait between cycles.
    pub interval_secs: u64,
    /// Append-only change log.
    pub log_file: PathBuf,
    /// Worker threads; zero means one per CPU.
    pub workers: usize,
    /// Always compare digests, even when timestamps say nothing changed.
    pub strict: bool,
    /// Mirror change lines to stdout.
    pub console: bool,
    /// Extra base-name globs the deletion passes must keep.
    pub protect: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            replica: PathBuf::new(),
            interval_secs: 60,
            log_file: PathBuf::from("treemirror.log"),
            workers: 0,
            strict: false,
            console: true,
            protect: Vec::new(),
        }
    }
}

impl Config {
    /// `<config_dir>/treemirror/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("treemirror").join(CONFIG_FILE_NAME))
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration file")
    }

    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Whether both trees have been named.
    pub fn has_trees(&self) -> bool {
        !self.source.as_os_str().is_empty() && !self.replica.as_os_str().is_empty()
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Check the preconditions the reconciler relies on.
    ///
    /// `once` skips the interval check since no second cycle will run.
    pub fn validate(&self, once: bool) -> Result<()> {
        if !self.source.is_dir() {
            bail!("Original directory does not exist: {}", self.source.display());
        }
        if !self.replica.is_dir() {
            bail!("Replica directory does not exist: {}", self.replica.display());
        }

        let log_dir = match self.log_file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        if !log_dir.is_dir() {
            bail!("Log directory does not exist: {}", log_dir.display());
        }
        if self.log_file.is_dir() {
            bail!("Log file path is a directory: {}", self.log_file.display());
        }

        if !once && self.interval_secs == 0 {
            bail!("Interval must be at least one second.");
        }

        if same_tree(&self.source, &self.replica) {
            bail!("Source and replica are the same directory: {}", self.source.display());
        }

        Ok(())
    }

    /// Build the reconciler settings, including log file protection.
    pub fn reconcile_config(&self) -> Result<ReconcileConfig> {
        let protect = ProtectedNames::new()
            .with_log_file(&self.log_file)
            .with_patterns(&self.protect)?;

        Ok(ReconcileConfig {
            workers: self.workers,
            strict: self.strict,
            protect,
        })
    }
}

/// Parses the prompt format `source;replica;interval;logfile`.
impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.trim().split(';').map(str::trim).collect();
        if parts.len() != 4 {
            bail!("Invalid input format");
        }

        let interval_secs = parts[2]
            .parse::<u64>()
            .map_err(|_| anyhow::anyhow!("Interval is not a valid integer."))?;

        Ok(Self {
            source: PathBuf::from(parts[0]),
            replica: PathBuf::from(parts[1]),
            interval_secs,
            log_file: PathBuf::from(parts[3]),
            ..Self::default()
        })
    }
}

fn same_tree(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

//! Snapshot of one directory level.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

use crate::sync::error::{IoResultExt, SyncError};

/// Immediate children of a directory, split into files and subdirectories.
///
/// Symlinks are sorted by what they point at. A link whose target is missing
/// lands in `dangling`; sockets, devices and fifos are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub files: BTreeSet<OsString>,
    pub dirs: BTreeSet<OsString>,
    pub dangling: BTreeSet<OsString>,
}

impl DirectoryListing {
    /// Read the immediate children of `dir`.
    pub fn read(dir: &Path) -> Result<Self, SyncError> {
        let mut listing = Self::default();

        for entry in fs::read_dir(dir).during("listing directory", dir)? {
            let entry = entry.during("listing directory", dir)?;
            // An entry can vanish between readdir and stat; it simply isn't part of this snapshot.
            let file_type = match entry.file_type() {
                Ok(file_type) => file_type,
                Err(_) => continue,
            };

            let file_type = if file_type.is_symlink() {
                match fs::metadata(entry.path()) {
                    Ok(target) => target.file_type(),
                    Err(_) => {
                        listing.dangling.insert(entry.file_name());
                        continue;
                    }
                }
            } else {
                file_type
            };

            if file_type.is_file() {
                listing.files.insert(entry.file_name());
            } else if file_type.is_dir() {
                listing.dirs.insert(entry.file_name());
            }
        }

        Ok(listing)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty() && self.dangling.is_empty()
    }
}

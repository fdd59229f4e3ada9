//! Content digests for change detection.
//!
//! MD5 is enough here: the digest only decides whether a timestamp-touched
//! file really changed. It is not an integrity or security control.

use md5::{Digest, Md5};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::sync::error::{IoResultExt, SyncError};

/// A computed MD5 digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDigest([u8; 16]);

impl FileDigest {
    /// Lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Hash bytes held in memory.
pub fn digest_bytes(data: &[u8]) -> FileDigest {
    FileDigest(Md5::digest(data).into())
}

/// Hash a file, reading it `buffer_size` bytes at a time.
pub fn digest_file(path: &Path, buffer_size: usize) -> Result<FileDigest, SyncError> {
    let mut file = File::open(path).during("hashing", path)?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; buffer_size.max(1)];

    loop {
        let bytes_read = file.read(&mut buffer).during("hashing", path)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(FileDigest(hasher.finalize().into()))
}

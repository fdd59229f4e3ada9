//! Buffered file copy used by the creation and update passes.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::sync::error::{IoResultExt, SyncError};

/// Copy `src` over `dst`, `buffer_size` bytes per read and write.
///
/// `dst` is created or truncated. If the copy fails after `dst` was opened,
/// the partial file is removed so the next cycle sees it as missing rather
/// than as a stale replica. Returns the number of bytes written.
pub fn copy_with_buffer(src: &Path, dst: &Path, buffer_size: usize) -> Result<u64, SyncError> {
    let source = File::open(src).during("copying", src)?;
    let dest = File::create(dst).during("copying", dst)?;

    let result = pump(source, dest, buffer_size).during("copying", src);
    if result.is_err() {
        let _ = fs::remove_file(dst);
    }
    result
}

fn pump<R: Read, W: Write>(mut reader: R, mut writer: W, buffer_size: usize) -> io::Result<u64> {
    let mut buffer = vec![0u8; buffer_size.max(1)];
    let mut copied = 0u64;

    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..bytes_read])?;
        copied += bytes_read as u64;
    }

    writer.flush()?;
    Ok(copied)
}

//! Size classes select the I/O buffer used for copying and hashing a file.

/// Largest file treated as small.
pub const SMALL_THRESHOLD: u64 = 8 * 1024;
/// Largest file treated as medium.
pub const MEDIUM_THRESHOLD: u64 = 10 * 1024 * 1024;

pub const SMALL_BUFFER: usize = 8 * 1024;
pub const MEDIUM_BUFFER: usize = 64 * 1024;
pub const LARGE_BUFFER: usize = 256 * 1024;

/// Bucket a file falls into based on its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeClass {
    Small,
    Medium,
    Large,
}

impl SizeClass {
    /// Classify a file by its length in bytes.
    pub fn of(len: u64) -> Self {
        if len <= SMALL_THRESHOLD {
            SizeClass::Small
        } else if len <= MEDIUM_THRESHOLD {
            SizeClass::Medium
        } else {
            SizeClass::Large
        }
    }

    /// Buffer size used for both copying and hashing.
    pub fn buffer_size(self) -> usize {
        match self {
            SizeClass::Small => SMALL_BUFFER,
            SizeClass::Medium => MEDIUM_BUFFER,
            SizeClass::Large => LARGE_BUFFER,
        }
    }
}

// Library module for treemirror
// Re-exports modules for use in integration tests and the binary

pub mod config;
pub mod schedule;
pub mod sync;

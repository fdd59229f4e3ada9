// Tests for size-class buffer selection, observed through the I/O probe

use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use treemirror::sync::{IoOp, IoTrace, MemorySink, ReconcileConfig, Reconciler, SizeClass};

use crate::common::{set_mtime, write};

fn sized_file(root: &std::path::Path, name: &str, len: u64) {
    let file = File::create(root.join(name)).unwrap();
    file.set_len(len).unwrap();
}

fn probed(sink: &Arc<MemorySink>, config: ReconcileConfig) -> (Reconciler, Arc<Mutex<Vec<IoTrace>>>) {
    let traces = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&traces);
    let reconciler = Reconciler::new(config, sink.clone())
        .unwrap()
        .with_io_probe(move |trace| recorder.lock().unwrap().push(trace.clone()));
    (reconciler, traces)
}

#[test]
fn test_copy_buffers_follow_size_class() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    sized_file(src.path(), "small.bin", 4 * 1024);
    sized_file(src.path(), "medium.bin", 1024 * 1024);
    sized_file(src.path(), "large.bin", 50 * 1024 * 1024);

    let sink = Arc::new(MemorySink::new());
    let (reconciler, traces) = probed(&sink, ReconcileConfig::default());
    let report = reconciler.run(src.path(), dst.path());

    assert_eq!(report.files_created, 3);
    let copies: HashMap<PathBuf, (SizeClass, usize)> = traces
        .lock()
        .unwrap()
        .iter()
        .filter(|t| t.op == IoOp::Copy)
        .map(|t| (t.path.clone(), (t.size_class, t.buffer_size)))
        .collect();

    assert_eq!(copies.len(), 3);
    assert_eq!(copies[&PathBuf::from("small.bin")], (SizeClass::Small, 8 * 1024));
    assert_eq!(copies[&PathBuf::from("medium.bin")], (SizeClass::Medium, 64 * 1024));
    assert_eq!(copies[&PathBuf::from("large.bin")], (SizeClass::Large, 256 * 1024));
}

#[test]
fn test_digest_uses_source_size_class() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let source = write(src.path(), "grown.txt", &vec![b'x'; 20 * 1024]);
    let replica = write(dst.path(), "grown.txt", b"tiny");
    set_mtime(&source, 1_700_000_000);
    set_mtime(&replica, 1_600_000_000);

    let sink = Arc::new(MemorySink::new());
    let (reconciler, traces) = probed(&sink, ReconcileConfig::default());
    reconciler.run(src.path(), dst.path());

    let traces = traces.lock().unwrap();
    let ops: Vec<IoOp> = traces.iter().map(|t| t.op).collect();
    assert_eq!(ops, vec![IoOp::Digest, IoOp::Digest, IoOp::Copy]);
    assert!(traces.iter().all(|t| t.buffer_size == 64 * 1024));
}

#[test]
fn test_unchanged_timestamps_skip_all_io() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let source = write(src.path(), "same.txt", b"abc");
    let replica = write(dst.path(), "same.txt", b"abc");
    set_mtime(&source, 1_600_000_000);
    set_mtime(&replica, 1_600_000_000);

    let sink = Arc::new(MemorySink::new());
    let (reconciler, traces) = probed(&sink, ReconcileConfig::default());
    reconciler.run(src.path(), dst.path());

    assert!(traces.lock().unwrap().is_empty());
}

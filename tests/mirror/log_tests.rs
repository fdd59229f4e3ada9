// Tests for log file protection and the log sink end to end

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use treemirror::sync::{
    ChangeEvent, ChangeKind, LogSink, MemorySink, ProtectedNames, ReconcileConfig, Reconciler,
};

use crate::common::{reconciler_with, write};

fn protecting(log: &std::path::Path) -> ReconcileConfig {
    ReconcileConfig {
        protect: ProtectedNames::new().with_log_file(log),
        ..Default::default()
    }
}

#[test]
fn test_log_in_replica_root_survives() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log = write(dst.path(), "run.log", b"previous cycles\n");
    write(dst.path(), "orphan.txt", b"o");

    let sink = Arc::new(MemorySink::new());
    reconciler_with(protecting(&log), &sink).run(src.path(), dst.path());

    assert_eq!(sink.events(), vec![ChangeEvent::file_deleted("orphan.txt")]);
    assert_eq!(fs::read(&log).unwrap(), b"previous cycles\n");
}

#[test]
fn test_log_name_is_kept_at_nested_levels() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log = dst.path().join("run.log");
    write(src.path(), "sub/data.txt", b"d");
    write(dst.path(), "sub/run.log", b"same name, other folder");

    let sink = Arc::new(MemorySink::new());
    reconciler_with(protecting(&log), &sink).run(src.path(), dst.path());

    assert!(dst.path().join("sub").join("run.log").exists());
}

#[test]
fn test_removed_folder_is_pruned_around_the_log() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log = write(dst.path(), "logs/deep/run.log", b"keep me\n");
    write(dst.path(), "logs/deep/other.txt", b"x");
    write(dst.path(), "logs/archive/old.txt", b"y");
    write(dst.path(), "logs/top.txt", b"z");

    let sink = Arc::new(MemorySink::new());
    let report = reconciler_with(protecting(&log), &sink).run(src.path(), dst.path());

    assert!(report.is_clean());
    assert_eq!(fs::read(&log).unwrap(), b"keep me\n");
    assert!(!dst.path().join("logs").join("deep").join("other.txt").exists());
    assert!(!dst.path().join("logs").join("archive").exists());
    assert!(!dst.path().join("logs").join("top.txt").exists());

    let mut events = sink.events();
    events.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(
        events,
        vec![
            ChangeEvent::directory_deleted(PathBuf::from("logs").join("archive")),
            ChangeEvent::file_deleted(PathBuf::from("logs").join("deep").join("other.txt")),
            ChangeEvent::file_deleted(PathBuf::from("logs").join("top.txt")),
        ]
    );
}

#[test]
fn test_log_sink_records_a_cycle() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log = dst.path().join("run.log");
    write(src.path(), "a.txt", b"a");
    write(dst.path(), "b.txt", b"b");

    let sink = Arc::new(LogSink::open(&log, false).unwrap());
    let reconciler = Reconciler::new(protecting(&log), sink.clone()).unwrap();

    let report = reconciler.run(src.path(), dst.path());
    sink.flush();

    assert_eq!(report.changes(), 2);
    let mut lines: Vec<String> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "(+) Copied a.txt to replica folder.".to_string(),
            "(-) Deleted b.txt from replica.".to_string(),
        ]
    );

    let again = reconciler.run(src.path(), dst.path());
    assert_eq!(again.changes(), 0);
    assert!(log.exists());
}

#[test]
fn test_event_kinds_are_counted_in_report() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write(src.path(), "new.txt", b"n");
    write(dst.path(), "gone/x.txt", b"x");

    let sink = Arc::new(MemorySink::new());
    let report = reconciler_with(ReconcileConfig::default(), &sink).run(src.path(), dst.path());

    let created = sink
        .events()
        .iter()
        .filter(|e| e.kind == ChangeKind::FileCreated)
        .count();
    assert_eq!(created, report.files_created);
    assert_eq!(report.dirs_deleted, 1);
}

#[test]
fn test_source_file_never_overwrites_the_live_log() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    let log = write(dst.path(), "run.log", b"live\n");
    let source = write(src.path(), "run.log", b"from source");
    crate::common::set_mtime(&log, 1_600_000_000);
    crate::common::set_mtime(&source, 1_700_000_000);

    let sink = Arc::new(MemorySink::new());
    let report = reconciler_with(protecting(&log), &sink).run(src.path(), dst.path());

    assert!(report.is_clean());
    assert!(sink.events().is_empty());
    assert_eq!(fs::read(&log).unwrap(), b"live\n");
}

#[test]
fn test_source_file_over_folder_holding_the_log() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write(src.path(), "logs", b"a file named like the folder");
    let log = write(dst.path(), "logs/run.log", b"live\n");
    write(dst.path(), "logs/x.txt", b"x");

    let sink = Arc::new(MemorySink::new());
    let reconciler = reconciler_with(protecting(&log), &sink);
    let report = reconciler.run(src.path(), dst.path());

    assert!(report.is_clean());
    assert_eq!(
        sink.take_events(),
        vec![ChangeEvent::file_deleted(PathBuf::from("logs").join("x.txt"))]
    );
    assert_eq!(fs::read(&log).unwrap(), b"live\n");

    let again = reconciler.run(src.path(), dst.path());
    assert!(again.is_clean());
    assert!(sink.events().is_empty());
}

// Tests for per-item fault isolation

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use treemirror::sync::{ChangeEvent, DirectoryListing, MemorySink};

use crate::common::{reconciler, write};

#[test]
fn test_file_vanishing_after_listing_is_isolated() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write(src.path(), "file1.txt", b"one");
    let second = write(src.path(), "file2.txt", b"two");
    write(src.path(), "file3.txt", b"three");

    let source = DirectoryListing::read(src.path()).unwrap();
    let replica = DirectoryListing::read(dst.path()).unwrap();
    fs::remove_file(&second).unwrap();

    let sink = Arc::new(MemorySink::new());
    let report = reconciler(&sink).run_with_listings(src.path(), dst.path(), &source, &replica);

    let mut events = sink.events();
    events.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(
        events,
        vec![
            ChangeEvent::file_created("file1.txt"),
            ChangeEvent::file_created("file3.txt"),
        ]
    );

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, PathBuf::from("file2.txt"));
    assert!(report.failures[0].1.contains("deleted during the backup process"));

    let failures = sink.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, PathBuf::from("file2.txt"));
    assert!(!dst.path().join("file2.txt").exists());
}

#[test]
fn test_vanished_subtree_does_not_stop_siblings() {
    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write(src.path(), "left/a.txt", b"a");
    write(src.path(), "doomed/b.txt", b"b");
    write(src.path(), "right/c.txt", b"c");

    let source = DirectoryListing::read(src.path()).unwrap();
    let replica = DirectoryListing::read(dst.path()).unwrap();
    fs::remove_dir_all(src.path().join("doomed")).unwrap();

    let sink = Arc::new(MemorySink::new());
    let report = reconciler(&sink).run_with_listings(src.path(), dst.path(), &source, &replica);

    assert!(dst.path().join("left").join("a.txt").exists());
    assert!(dst.path().join("right").join("c.txt").exists());
    assert_eq!(report.files_created, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, PathBuf::from("doomed"));
}

#[cfg(unix)]
#[test]
fn test_unreadable_file_is_reported_and_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let src = tempfile::tempdir().unwrap();
    let dst = tempfile::tempdir().unwrap();
    write(src.path(), "ok.txt", b"fine");
    let locked = write(src.path(), "locked.txt", b"secret");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Root ignores permission bits, so there is nothing to observe.
    if fs::File::open(&locked).is_ok() {
        return;
    }

    let sink = Arc::new(MemorySink::new());
    let report = reconciler(&sink).run(src.path(), dst.path());

    assert_eq!(sink.events(), vec![ChangeEvent::file_created("ok.txt")]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].1.contains("denied"));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
}

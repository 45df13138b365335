//! Integration tests for DirWatcher against the platform notify backend.

use rulewatch::DirWatcher;
use rulewatch::watcher::WatcherState;
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Drain repeatedly for `window`, returning whether any drain saw a change.
fn drain_for(watcher: &mut DirWatcher, window: Duration) -> bool {
    let deadline = Instant::now() + window;
    let mut changed = false;
    while Instant::now() < deadline {
        changed |= watcher.process_events(Duration::from_millis(100));
    }
    changed
}

fn canonical_tempdir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    (temp_dir, root)
}

#[test]
fn test_registers_exactly_one_entry_per_directory() {
    let (_tmp, root) = canonical_tempdir();
    fs::create_dir_all(root.join("a/b/c")).unwrap();
    fs::create_dir_all(root.join("d")).unwrap();
    fs::write(root.join("a/rule.drl"), "rule").unwrap();
    #[cfg(unix)]
    std::os::unix::fs::symlink(root.join("a"), root.join("link")).unwrap();

    let watcher = DirWatcher::new(&root, true).unwrap();

    assert_eq!(watcher.state(), WatcherState::Watching);
    assert_eq!(
        watcher.registered_dirs(),
        vec![
            root.clone(),
            root.join("a"),
            root.join("a/b"),
            root.join("a/b/c"),
            root.join("d"),
        ]
    );
}

#[test]
fn test_missing_root_is_a_setup_error() {
    let (_tmp, root) = canonical_tempdir();
    assert!(DirWatcher::new(root.join("missing"), true).is_err());
}

#[test]
fn test_file_creation_is_detected_once() {
    let (_tmp, root) = canonical_tempdir();
    let mut watcher = DirWatcher::new(&root, true).unwrap();

    fs::write(root.join("a.txt"), "hello").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));

    // Nothing new happened
    assert!(!watcher.process_events(Duration::from_millis(200)));
}

#[test]
fn test_change_in_nested_directory_is_detected() {
    let (_tmp, root) = canonical_tempdir();
    fs::create_dir_all(root.join("x/y")).unwrap();
    let mut watcher = DirWatcher::new(&root, true).unwrap();

    fs::write(root.join("x/y/deep.drl"), "rule").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
}

#[test]
fn test_new_subdirectory_is_registered_while_draining() {
    let (_tmp, root) = canonical_tempdir();
    let mut watcher = DirWatcher::new(&root, true).unwrap();
    let sub = root.join("sub");

    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("b.txt"), "b").unwrap();

    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert!(watcher.is_registered(&sub));

    // Changes inside the new directory are now observed
    fs::write(sub.join("c.txt"), "c").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
}

#[test]
fn test_new_nested_tree_is_registered() {
    let (_tmp, root) = canonical_tempdir();
    let mut watcher = DirWatcher::new(&root, true).unwrap();

    // Build the tree elsewhere and move it in, so it appears all at once
    let staging = TempDir::new().unwrap();
    let staged = staging.path().join("tree");
    fs::create_dir_all(staged.join("inner/leaf")).unwrap();
    fs::rename(&staged, root.join("tree")).unwrap_or_else(|_| {
        // Cross-device: build in place instead
        fs::create_dir_all(root.join("tree/inner/leaf")).unwrap();
    });

    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert!(watcher.is_registered(&root.join("tree")));
    assert!(watcher.is_registered(&root.join("tree/inner")));
    assert!(watcher.is_registered(&root.join("tree/inner/leaf")));
}

#[test]
fn test_deleted_directory_is_unregistered() {
    let (_tmp, root) = canonical_tempdir();
    let sub = root.join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("b.txt"), "b").unwrap();

    let mut watcher = DirWatcher::new(&root, true).unwrap();
    assert!(watcher.is_registered(&sub));

    fs::remove_dir_all(&sub).unwrap();

    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert!(!watcher.is_registered(&sub));
    assert_eq!(watcher.registered_dirs(), vec![root.clone()]);

    // Nothing more arrives from the deleted directory
    assert!(!drain_for(&mut watcher, Duration::from_millis(500)));

    // The root keeps working
    fs::write(root.join("after.txt"), "x").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
}

#[test]
fn test_renamed_directory_stays_watched() {
    let (_tmp, root) = canonical_tempdir();
    fs::create_dir(root.join("sub")).unwrap();
    let mut watcher = DirWatcher::new(&root, true).unwrap();

    fs::rename(root.join("sub"), root.join("sub2")).unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert_eq!(
        watcher.registered_dirs(),
        vec![root.clone(), root.join("sub2")]
    );

    fs::write(root.join("sub2/moved.drl"), "rule").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
}

#[test]
fn test_non_recursive_ignores_new_subdirectories() {
    let (_tmp, root) = canonical_tempdir();
    fs::create_dir(root.join("existing")).unwrap();
    let mut watcher = DirWatcher::new(&root, false).unwrap();

    assert_eq!(watcher.registered_dirs(), vec![root.clone()]);

    fs::create_dir(root.join("sub")).unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert_eq!(watcher.registered_dirs(), vec![root.clone()]);
}

#[test]
fn test_quiet_drain_returns_false_within_timeout() {
    let (_tmp, root) = canonical_tempdir();
    let mut watcher = DirWatcher::new(&root, true).unwrap();

    let start = Instant::now();
    assert!(!watcher.process_events(Duration::from_millis(300)));
    let elapsed = start.elapsed();

    assert!(elapsed >= Duration::from_millis(250), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "blocked too long: {elapsed:?}");
}

#[test]
fn test_close_interrupts_blocked_drain() {
    let (_tmp, root) = canonical_tempdir();
    let mut watcher = DirWatcher::new(&root, true).unwrap();
    let handle = watcher.close_handle();

    let closer = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(100));
        handle.close();
    });

    let start = Instant::now();
    assert!(!watcher.process_events(Duration::from_secs(30)));
    assert!(start.elapsed() < Duration::from_secs(10));
    closer.join().unwrap();

    watcher.close().unwrap();
    assert_eq!(watcher.state(), WatcherState::Closed);
    assert_eq!(watcher.registration_count(), 0);
}

#[test]
fn test_full_scenario() {
    let (_tmp, root) = canonical_tempdir();
    let mut watcher = DirWatcher::new(&root, true).unwrap();

    fs::write(root.join("a.txt"), "a").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));

    let sub = root.join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(sub.join("b.txt"), "b").unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert!(watcher.is_registered(&sub));

    fs::remove_dir_all(&sub).unwrap();
    assert!(drain_for(&mut watcher, Duration::from_secs(1)));
    assert!(!watcher.is_registered(&sub));

    watcher.close().unwrap();
}

//! File system watcher behavior against a real temp directory.

use std::fs;
use std::time::Duration;

use hmr::{FsWatcher, Watch, WatchTarget};
use tempfile::TempDir;

const DEBOUNCE: Duration = Duration::from_millis(150);

fn watcher() -> FsWatcher {
    FsWatcher::new(DEBOUNCE, vec![".git".to_string(), "*.tmp".to_string()])
}

#[tokio::test]
async fn test_burst_of_writes_becomes_one_change() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().canonicalize().unwrap();
    let target = WatchTarget::parse(dir.to_str().unwrap()).unwrap();
    let mut changes = watcher().watch(&target).unwrap();

    for n in 0..3 {
        fs::write(dir.join("module.rs"), format!("// edit {n}")).unwrap();
    }
    fs::write(dir.join("other.rs"), "// other").unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.changed())
        .await
        .expect("no change observed")
        .expect("source closed");
    assert!(change.paths.contains(&dir.join("module.rs")));
    assert!(change.paths.contains(&dir.join("other.rs")));

    // Everything was coalesced; nothing else is pending.
    let next = tokio::time::timeout(DEBOUNCE * 3, changes.changed()).await;
    assert!(next.is_err(), "unexpected second change: {next:?}");
}

#[tokio::test]
async fn test_ignored_paths_do_not_signal() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().canonicalize().unwrap();
    fs::create_dir_all(dir.join(".git")).unwrap();
    let target = WatchTarget::parse(dir.to_str().unwrap()).unwrap();
    let mut changes = watcher().watch(&target).unwrap();

    fs::write(dir.join(".git/index"), "x").unwrap();
    fs::write(dir.join("scratch.tmp"), "x").unwrap();

    let next = tokio::time::timeout(DEBOUNCE * 3, changes.changed()).await;
    assert!(next.is_err(), "ignored paths produced a change: {next:?}");
}

#[tokio::test]
async fn test_glob_only_reports_matching_files() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().canonicalize().unwrap();
    let pattern = format!("{}/*.so", dir.display());
    let target = WatchTarget::parse(&pattern).unwrap();
    let mut changes = watcher().watch(&target).unwrap();

    fs::write(dir.join("notes.txt"), "x").unwrap();
    fs::write(dir.join("libgreeter.so"), "x").unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.changed())
        .await
        .expect("no change observed")
        .expect("source closed");
    assert_eq!(change.paths, vec![dir.join("libgreeter.so")]);
}

#[tokio::test]
async fn test_single_file_survives_replacement() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().canonicalize().unwrap();
    let file = dir.join("libgreeter.so");
    fs::write(&file, "v1").unwrap();

    let target = WatchTarget::parse(file.to_str().unwrap()).unwrap();
    let mut changes = watcher().watch(&target).unwrap();

    // Replace the file the way linkers do: write elsewhere, rename over.
    let staged = dir.join("libgreeter.so.new");
    fs::write(&staged, "v2").unwrap();
    fs::rename(&staged, &file).unwrap();

    let change = tokio::time::timeout(Duration::from_secs(5), changes.changed())
        .await
        .expect("no change observed")
        .expect("source closed");
    assert_eq!(change.paths, vec![file]);
}

//! Tree replication integration tests: convergence, reconciliation by
//! relative name, and idempotence.

use smartsync::mirror::replicator::{full_sync, reconcile};
use smartsync::mirror::MirrorError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Relative path -> file contents (None for directories).
fn tree_snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    let mut snapshot = BTreeMap::new();
    for entry in WalkDir::new(root).min_depth(1) {
        let entry = entry.expect("walk tree");
        let relative = entry
            .path()
            .strip_prefix(root)
            .expect("relative path")
            .to_path_buf();
        let contents = if entry.file_type().is_file() {
            Some(fs::read(entry.path()).expect("read file"))
        } else {
            None
        };
        snapshot.insert(relative, contents);
    }
    snapshot
}

fn build_sample_tree(root: &Path) {
    fs::write(root.join("root.txt"), b"root-content").expect("write root file");
    fs::create_dir_all(root.join("sub/deeper")).expect("create nested dirs");
    fs::write(root.join("sub/inner.txt"), b"inner-content").expect("write inner file");
    fs::write(root.join("sub/deeper/leaf.txt"), b"leaf-content").expect("write leaf file");
    fs::create_dir(root.join("empty")).expect("create empty dir");
}

#[tokio::test]
async fn full_sync_mirrors_nested_tree() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    build_sample_tree(src.path());

    let cancel = CancellationToken::new();
    full_sync(src.path(), dest.path(), &cancel)
        .await
        .expect("full sync");

    assert_eq!(tree_snapshot(src.path()), tree_snapshot(dest.path()));
}

#[tokio::test]
async fn full_sync_creates_missing_destination() {
    let src = tempfile::tempdir().expect("create src");
    let root = tempfile::tempdir().expect("create root");
    fs::write(src.path().join("a.txt"), b"aa").expect("write source file");

    let dest = root.path().join("nested").join("mirror");
    let cancel = CancellationToken::new();
    full_sync(src.path(), &dest, &cancel)
        .await
        .expect("full sync");

    assert_eq!(fs::read(dest.join("a.txt")).expect("read mirrored file"), b"aa");
}

#[tokio::test]
async fn full_sync_overwrites_existing_files() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    fs::write(src.path().join("a.txt"), b"fresh").expect("write source file");
    fs::write(dest.path().join("a.txt"), b"stale-old-bytes").expect("write stale file");

    let cancel = CancellationToken::new();
    full_sync(src.path(), dest.path(), &cancel)
        .await
        .expect("full sync");

    assert_eq!(
        fs::read(dest.path().join("a.txt")).expect("read mirrored file"),
        b"fresh"
    );
}

#[tokio::test]
async fn full_sync_twice_is_idempotent() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    build_sample_tree(src.path());

    let cancel = CancellationToken::new();
    full_sync(src.path(), dest.path(), &cancel)
        .await
        .expect("first full sync");
    let first = tree_snapshot(dest.path());

    full_sync(src.path(), dest.path(), &cancel)
        .await
        .expect("second full sync");
    let second = tree_snapshot(dest.path());

    assert_eq!(first, second);
    assert_eq!(first, tree_snapshot(src.path()));
}

#[tokio::test]
async fn reconcile_copies_exactly_the_missing_files_by_name() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    fs::write(src.path().join("a.txt"), b"fresh-a").expect("write a");
    fs::write(src.path().join("b.txt"), b"fresh-b").expect("write b");
    // Present by name with different bytes: reconcile matches on name and
    // must leave it alone.
    fs::write(dest.path().join("a.txt"), b"stale-a").expect("write stale a");

    let cancel = CancellationToken::new();
    let stats = reconcile(src.path(), dest.path(), &cancel)
        .await
        .expect("reconcile");

    assert_eq!(stats.files_copied, 1);
    assert_eq!(
        fs::read(dest.path().join("a.txt")).expect("read a"),
        b"stale-a",
        "same-named destination file must not be re-copied"
    );
    assert_eq!(fs::read(dest.path().join("b.txt")).expect("read b"), b"fresh-b");
}

#[tokio::test]
async fn reconcile_full_syncs_missing_subdirectories() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    fs::create_dir_all(src.path().join("present/deep")).expect("create present dir");
    fs::write(src.path().join("present/deep/x.txt"), b"xx").expect("write x");
    fs::create_dir(src.path().join("missing")).expect("create missing dir");
    fs::write(src.path().join("missing/y.txt"), b"yy").expect("write y");
    fs::create_dir(dest.path().join("present")).expect("create dest present");

    let cancel = CancellationToken::new();
    reconcile(src.path(), dest.path(), &cancel)
        .await
        .expect("reconcile");

    // The missing subtree arrives in full.
    assert_eq!(
        fs::read(dest.path().join("missing/y.txt")).expect("read y"),
        b"yy"
    );
    // The present directory is matched by name and not descended into.
    assert!(!dest.path().join("present/deep").exists());
}

#[tokio::test]
async fn reconcile_leaves_destination_only_entries_alone() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    fs::write(src.path().join("a.txt"), b"aa").expect("write a");
    fs::write(dest.path().join("extra.txt"), b"keep-me").expect("write extra");

    let cancel = CancellationToken::new();
    reconcile(src.path(), dest.path(), &cancel)
        .await
        .expect("reconcile");

    assert_eq!(
        fs::read(dest.path().join("extra.txt")).expect("read extra"),
        b"keep-me"
    );
}

#[tokio::test]
async fn cancelled_full_sync_reports_cancellation() {
    let src = tempfile::tempdir().expect("create src");
    let dest = tempfile::tempdir().expect("create dest");
    build_sample_tree(src.path());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = full_sync(src.path(), dest.path(), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MirrorError::Cancelled));
}

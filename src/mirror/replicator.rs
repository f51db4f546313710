use super::{copier, MirrorError};
use std::collections::HashSet;
use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Aggregate counters for one replication pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplicationStats {
    pub files_copied: u64,
    pub dirs_created: u64,
    pub bytes_copied: u64,
}

impl ReplicationStats {
    fn merge(&mut self, other: ReplicationStats) {
        self.files_copied += other.files_copied;
        self.dirs_created += other.dirs_created;
        self.bytes_copied += other.bytes_copied;
    }
}

/// Recursively mirror `source` into `destination`, overwriting existing
/// files.
///
/// Files directly under `source` are copied first, then each subdirectory is
/// descended into. Cancellation is checked at the start of every recursive
/// step. Entries that are neither regular files nor directories are skipped.
pub async fn full_sync(
    source: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<ReplicationStats, MirrorError> {
    full_sync_inner(source.to_path_buf(), destination.to_path_buf(), cancel.clone()).await
}

fn full_sync_inner(
    source: PathBuf,
    destination: PathBuf,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = Result<ReplicationStats, MirrorError>> + Send>> {
    Box::pin(async move {
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }

        let mut stats = ReplicationStats::default();
        if !destination.exists() {
            fs::create_dir_all(&destination).await?;
            stats.dirs_created += 1;
        }

        let mut subdirs = Vec::new();
        let mut entries = fs::read_dir(&source).await?;
        while let Some(entry) = entries.next_entry().await? {
            if cancel.is_cancelled() {
                return Err(MirrorError::Cancelled);
            }
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                let target = destination.join(entry.file_name());
                stats.bytes_copied += fs::copy(entry.path(), &target).await?;
                stats.files_copied += 1;
            } else if file_type.is_dir() {
                subdirs.push(entry.file_name());
            } else {
                debug!(path = %entry.path().display(), "skipping special entry");
            }
        }

        for name in subdirs {
            let sub_stats = full_sync_inner(
                source.join(&name),
                destination.join(&name),
                cancel.clone(),
            )
            .await?;
            stats.merge(sub_stats);
        }

        Ok(stats)
    })
}

/// Shallow catch-up pass against an already-existing destination.
///
/// Source files whose names have no same-named destination counterpart are
/// replicated via the lock-aware copier; source subdirectories with no
/// same-named counterpart get a [`full_sync`]. Matching is by entry name
/// only — entries already present by name are left untouched.
pub async fn reconcile(
    source: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<ReplicationStats, MirrorError> {
    if cancel.is_cancelled() {
        return Err(MirrorError::Cancelled);
    }

    let (src_files, src_dirs) = list_names(source).await?;
    let (dest_files, dest_dirs) = list_names(destination).await?;

    let mut stats = ReplicationStats::default();
    for name in &src_files {
        if dest_files.contains(name) {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }
        stats.bytes_copied +=
            copier::copy_file(&source.join(name), &destination.join(name), cancel).await?;
        stats.files_copied += 1;
    }

    for name in &src_dirs {
        if dest_dirs.contains(name) {
            continue;
        }
        let sub_stats = full_sync(&source.join(name), &destination.join(name), cancel).await?;
        stats.merge(sub_stats);
    }

    Ok(stats)
}

/// Name-keyed listing of the entries directly under `path`, split into
/// regular files and directories.
async fn list_names(path: &Path) -> Result<(HashSet<OsString>, HashSet<OsString>), MirrorError> {
    let mut files = HashSet::new();
    let mut dirs = HashSet::new();
    let mut entries = fs::read_dir(path).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_type = entry.file_type().await?;
        if file_type.is_file() {
            files.insert(entry.file_name());
        } else if file_type.is_dir() {
            dirs.insert(entry.file_name());
        }
    }
    Ok((files, dirs))
}

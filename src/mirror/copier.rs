use super::MirrorError;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fixed backoff between lock probes.
pub const LOCK_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Free,
    Held,
}

/// Copy a single file with overwrite semantics, waiting for the source to
/// become free of exclusive locks first.
///
/// The wait has no timeout; it retries every [`LOCK_RETRY_DELAY`] until the
/// lock is released or `cancel` fires, whichever comes first. Destination
/// parent directories are created as needed. Returns the number of bytes
/// copied.
pub async fn copy_file(
    source: &Path,
    destination: &Path,
    cancel: &CancellationToken,
) -> Result<u64, MirrorError> {
    loop {
        if cancel.is_cancelled() {
            return Err(MirrorError::Cancelled);
        }
        match probe_exclusive(source)? {
            Probe::Free => break,
            Probe::Held => {
                debug!(path = %source.display(), "source file locked, waiting");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(MirrorError::Cancelled),
                    _ = tokio::time::sleep(LOCK_RETRY_DELAY) => {}
                }
            }
        }
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    let bytes = fs::copy(source, destination).await?;
    Ok(bytes)
}

/// Probe whether `path` is currently held under an exclusive lock.
///
/// On Unix this takes and immediately releases a non-blocking advisory
/// `flock`; on Windows it attempts an open with no sharing allowed.
#[cfg(unix)]
fn probe_exclusive(path: &Path) -> Result<Probe, MirrorError> {
    use std::os::unix::io::AsRawFd;

    let file = std::fs::File::open(path)?;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
        Ok(Probe::Free)
    } else {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
            Ok(Probe::Held)
        } else {
            Err(err.into())
        }
    }
}

#[cfg(windows)]
fn probe_exclusive(path: &Path) -> Result<Probe, MirrorError> {
    use std::os::windows::fs::OpenOptionsExt;

    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    match std::fs::OpenOptions::new()
        .read(true)
        .share_mode(0)
        .open(path)
    {
        Ok(_) => Ok(Probe::Free),
        Err(err) if matches!(err.raw_os_error(), Some(32) | Some(33)) => Ok(Probe::Held),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs as std_fs;

    #[tokio::test]
    async fn copies_and_overwrites() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let src = dir.path().join("in.txt");
        let dest = dir.path().join("nested/out.txt");
        std_fs::write(&src, b"first").expect("write source");

        let cancel = CancellationToken::new();
        let bytes = copy_file(&src, &dest, &cancel).await.expect("first copy");
        assert_eq!(bytes, 5);
        assert_eq!(std_fs::read(&dest).expect("read dest"), b"first");

        std_fs::write(&src, b"second!").expect("rewrite source");
        copy_file(&src, &dest, &cancel).await.expect("second copy");
        assert_eq!(std_fs::read(&dest).expect("read dest"), b"second!");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_copy() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let src = dir.path().join("in.txt");
        let dest = dir.path().join("out.txt");
        std_fs::write(&src, b"data").expect("write source");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = copy_file(&src, &dest, &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn missing_source_is_an_io_failure() {
        let dir = tempfile::tempdir().expect("create tempdir");
        let cancel = CancellationToken::new();
        let err = copy_file(
            &dir.path().join("absent.txt"),
            &dir.path().join("out.txt"),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, MirrorError::Io(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn waits_for_advisory_lock_release() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().expect("create tempdir");
        let src = dir.path().join("locked.txt");
        let dest = dir.path().join("out.txt");
        std_fs::write(&src, b"guarded").expect("write source");

        let holder = std_fs::File::open(&src).expect("open for locking");
        let rc = unsafe { libc::flock(holder.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(rc, 0, "test lock must be acquired");

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let src = src.clone();
            let dest = dest.clone();
            let cancel = cancel.clone();
            async move { copy_file(&src, &dest, &cancel).await }
        });

        // Give the copier time to hit the lock and park in the retry loop.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(!dest.exists(), "copy must not proceed while lock is held");

        drop(holder);
        let bytes = task.await.expect("join").expect("copy after unlock");
        assert_eq!(bytes, 7);
        assert_eq!(std_fs::read(&dest).expect("read dest"), b"guarded");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancellation_interrupts_lock_wait() {
        use std::os::unix::io::AsRawFd;

        let dir = tempfile::tempdir().expect("create tempdir");
        let src = dir.path().join("locked.txt");
        std_fs::write(&src, b"guarded").expect("write source");

        let holder = std_fs::File::open(&src).expect("open for locking");
        let rc = unsafe { libc::flock(holder.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        assert_eq!(rc, 0, "test lock must be acquired");

        let cancel = CancellationToken::new();
        let task = tokio::spawn({
            let src = src.clone();
            let dest = dir.path().join("out.txt");
            let cancel = cancel.clone();
            async move { copy_file(&src, &dest, &cancel).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let err = task.await.expect("join").unwrap_err();
        assert!(err.is_cancelled());
    }
}

use super::operation::{InFlight, OperationId, OperationState, StateCell};
use super::watch::MirrorEvent;
use super::{copier, replicator, watch};
use super::{MirrorError, PathTranslator, SessionState, SessionStatus, SyncTarget};
use crate::utils::mirror_log::MirrorLog;
use notify::RecommendedWatcher;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a stop waits for cancelled operations to acknowledge.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Watches one sync target and replicates its changes.
///
/// State machine: `Idle -> Starting -> Watching -> Stopping -> Idle`. While
/// watching, every accepted filesystem event spawns one independent tracked
/// operation against the destination tree. There is no per-path ordering:
/// two rapid events for the same path race with no defined completion order,
/// a deliberate trade-off of this design. Deletes re-check what exists at
/// execution time, which narrows but does not close that window.
#[derive(Clone)]
pub struct MirrorSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    target: SyncTarget,
    translator: PathTranslator,
    log: MirrorLog,
    state: RwLock<SessionState>,
    watch_enabled: AtomicBool,
    watcher: Mutex<Option<RecommendedWatcher>>,
    cancel: Mutex<CancellationToken>,
    pump: Mutex<Option<tokio::task::JoinHandle<()>>>,
    in_flight: InFlight,
}

impl MirrorSession {
    pub fn new(target: SyncTarget, log: MirrorLog) -> Self {
        let translator = PathTranslator::new(&target);
        Self {
            inner: Arc::new(SessionInner {
                target,
                translator,
                log,
                state: RwLock::new(SessionState::Idle),
                watch_enabled: AtomicBool::new(false),
                watcher: Mutex::new(None),
                cancel: Mutex::new(CancellationToken::new()),
                pump: Mutex::new(None),
                in_flight: InFlight::default(),
            }),
        }
    }

    pub fn target(&self) -> &SyncTarget {
        &self.inner.target
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.read()
    }

    /// True iff any in-flight operation is currently running.
    pub fn have_active_tasks(&self) -> bool {
        self.inner.in_flight.any_running()
    }

    /// True iff the watch subscription is disabled, i.e. the session is idle
    /// or stopping rather than watching.
    pub fn user_stopped(&self) -> bool {
        !self.inner.watch_enabled.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            name: self.inner.target.name.clone(),
            state: self.state(),
            active_operations: self.inner.in_flight.len(),
            watch_enabled: self.inner.watch_enabled.load(Ordering::SeqCst),
        }
    }

    /// Enable the watch subscription and launch the initial replication.
    ///
    /// Returns once the subscription is live; the initial full sync or
    /// reconciliation runs as a tracked operation and may still be in flight.
    /// On subscription failure the session stays idle.
    pub fn start(&self) -> Result<(), MirrorError> {
        {
            let mut state = self.inner.state.write();
            if *state != SessionState::Idle {
                debug!(target_name = %self.inner.target.name, "start ignored, session not idle");
                return Ok(());
            }
            *state = SessionState::Starting;
        }

        info!(
            target_name = %self.inner.target.name,
            source = %self.inner.target.source.display(),
            "starting mirror session"
        );
        self.inner
            .log
            .write_line(format!("mirror '{}' started", self.inner.target.name));

        let cancel = CancellationToken::new();
        *self.inner.cancel.lock() = cancel.clone();

        let (watcher, rx) = match watch::subscribe(&self.inner.target.source) {
            Ok(subscription) => subscription,
            Err(err) => {
                *self.inner.state.write() = SessionState::Idle;
                warn!(
                    target_name = %self.inner.target.name,
                    error = %err,
                    "failed to establish watch subscription"
                );
                self.inner.log.write_line(format!(
                    "mirror '{}' could not watch its source: {err}",
                    self.inner.target.name
                ));
                return Err(MirrorError::Watch(err));
            }
        };

        *self.inner.watcher.lock() = Some(watcher);
        self.inner.watch_enabled.store(true, Ordering::SeqCst);

        let session = self.clone();
        let pump_cancel = cancel.clone();
        let pump = tokio::spawn(async move { session.pump_events(rx, pump_cancel).await });
        *self.inner.pump.lock() = Some(pump);

        self.dispatch_initial_replication();
        *self.inner.state.write() = SessionState::Watching;
        Ok(())
    }

    /// Disable the watch subscription and cancel all in-flight work.
    ///
    /// Cancellation is best-effort: a copy in progress may be left truncated
    /// on the destination side.
    pub async fn stop(&self) {
        {
            let mut state = self.inner.state.write();
            if !matches!(*state, SessionState::Watching | SessionState::Starting) {
                return;
            }
            *state = SessionState::Stopping;
        }

        info!(target_name = %self.inner.target.name, "stopping mirror session");
        self.inner
            .log
            .write_line(format!("mirror '{}' stopped", self.inner.target.name));

        self.inner.watch_enabled.store(false, Ordering::SeqCst);
        drop(self.inner.watcher.lock().take());
        self.inner.cancel.lock().cancel();

        let pump = self.inner.pump.lock().take();
        if let Some(pump) = pump {
            let _ = pump.await;
        }

        let drained = self.inner.in_flight.drain();
        let mut joins = Vec::new();
        for op in drained {
            op.cancel.cancel();
            if let Some(task) = op.task {
                joins.push(task);
            }
        }
        if tokio::time::timeout(STOP_GRACE, futures::future::join_all(joins))
            .await
            .is_err()
        {
            warn!(
                target_name = %self.inner.target.name,
                "operations did not acknowledge cancellation within the grace period"
            );
        }

        *self.inner.state.write() = SessionState::Idle;
    }

    /// Feed one normalized event into the session.
    ///
    /// Only accepted while watching; events in any other state are dropped.
    pub fn handle_event(&self, event: MirrorEvent) {
        if *self.inner.state.read() != SessionState::Watching
            || !self.inner.watch_enabled.load(Ordering::SeqCst)
        {
            debug!(?event, "event dropped, session not watching");
            return;
        }
        if !event.path().starts_with(&self.inner.target.source) {
            debug!(?event, "event dropped, path outside watched source");
            return;
        }

        match event {
            MirrorEvent::Changed(path) => self.on_changed(path),
            MirrorEvent::Created(path) => self.on_created(path),
            MirrorEvent::Deleted(path) => self.on_deleted(path),
            MirrorEvent::Renamed { from, to } => self.on_renamed(from, to),
        }
    }

    async fn pump_events(
        &self,
        mut rx: mpsc::Receiver<notify::Result<notify::Event>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    None => break,
                    Some(Err(err)) => {
                        warn!(
                            target_name = %self.inner.target.name,
                            error = %err,
                            "watch backend error"
                        );
                    }
                    Some(Ok(event)) => {
                        for mirror_event in watch::map_event(&event) {
                            self.handle_event(mirror_event);
                        }
                    }
                },
            }
        }
    }

    fn dispatch_initial_replication(&self) {
        let source = self.inner.target.source.clone();
        let destination = self.inner.target.destination.clone();
        if destination.exists() {
            self.dispatch(format!("reconcile '{}'", self.inner.target.name), |token| {
                async move {
                    replicator::reconcile(&source, &destination, &token)
                        .await
                        .map(drop)
                }
            });
        } else {
            self.dispatch(format!("full sync '{}'", self.inner.target.name), |token| {
                async move {
                    replicator::full_sync(&source, &destination, &token)
                        .await
                        .map(drop)
                }
            });
        }
    }

    fn on_changed(&self, path: PathBuf) {
        // Directory timestamp churn is not replicated.
        if path.is_dir() {
            return;
        }
        self.log_event(&path, "changed");
        let Some(destination) = self.translate(&path) else {
            return;
        };
        self.dispatch(format!("copy {}", path.display()), |token| async move {
            copier::copy_file(&path, &destination, &token).await.map(drop)
        });
    }

    fn on_created(&self, path: PathBuf) {
        self.log_event(&path, "created");
        let Some(destination) = self.translate(&path) else {
            return;
        };
        if path.is_dir() {
            self.dispatch(format!("mirror new directory {}", path.display()), |token| {
                async move {
                    replicator::full_sync(&path, &destination, &token)
                        .await
                        .map(drop)
                }
            });
        } else {
            self.dispatch(format!("copy {}", path.display()), |token| async move {
                copier::copy_file(&path, &destination, &token).await.map(drop)
            });
        }
    }

    fn on_deleted(&self, path: PathBuf) {
        self.log_event(&path, "deleted");
        let Some(destination) = self.translate(&path) else {
            return;
        };
        self.dispatch(format!("delete {}", destination.display()), |_token| {
            async move { delete_entry(&destination).await }
        });
    }

    fn on_renamed(&self, from: PathBuf, to: PathBuf) {
        self.inner.log.write_line(format!(
            "'{}' renamed to '{}'",
            self.relative_display(&from),
            self.relative_display(&to)
        ));
        let translated = match self.inner.translator.translate_rename(&from, &to) {
            Ok(paths) => paths,
            Err(err) => {
                warn!(from = %from.display(), error = %err, "rename translation failed");
                self.inner
                    .log
                    .write_line(format!("rename of '{}' failed: {err}", from.display()));
                return;
            }
        };
        let (old_dest, new_dest) = translated;
        self.dispatch(
            format!("rename {} -> {}", old_dest.display(), new_dest.display()),
            |_token| async move { rename_entry(&old_dest, &new_dest).await },
        );
    }

    /// Spawn one tracked, cancellable operation for an accepted event.
    ///
    /// Never blocks the event pump; the handle registers itself in the
    /// in-flight set and removes itself on completion or cancellation.
    fn dispatch<F, Fut>(&self, label: String, make: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), MirrorError>> + Send + 'static,
    {
        let id = OperationId::new();
        let state: StateCell = Arc::new(RwLock::new(OperationState::Pending));
        let token = self.inner.cancel.lock().child_token();
        self.inner
            .in_flight
            .insert(id, label.clone(), state.clone(), token.clone());

        let future = make(token);
        let in_flight = self.inner.in_flight.clone();
        let log = self.inner.log.clone();
        let task = tokio::spawn(async move {
            *state.write() = OperationState::Running;
            match future.await {
                Ok(()) => {
                    *state.write() = OperationState::Completed;
                }
                Err(err) if err.is_cancelled() => {
                    debug!(operation = %label, "operation cancelled");
                    *state.write() = OperationState::Cancelled;
                }
                Err(err) => {
                    warn!(operation = %label, error = %err, "mirror operation failed");
                    log.write_line(format!("{label} failed: {err}"));
                    *state.write() = OperationState::Completed;
                }
            }
            in_flight.remove(id);
        });
        self.inner.in_flight.attach_task(id, task);
    }

    fn translate(&self, path: &Path) -> Option<PathBuf> {
        match self.inner.translator.to_destination(path) {
            Ok(destination) => Some(destination),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "path translation failed");
                None
            }
        }
    }

    fn log_event(&self, path: &Path, action: &str) {
        self.inner
            .log
            .write_line(format!("'{}' {action}", self.relative_display(path)));
    }

    fn relative_display(&self, path: &Path) -> String {
        path.strip_prefix(&self.inner.target.source)
            .unwrap_or(path)
            .display()
            .to_string()
    }
}

/// Delete the mirrored counterpart of a removed source entry.
///
/// The source entry is already gone, so what to remove is decided by what
/// exists on the destination side at execution time.
async fn delete_entry(path: &Path) -> Result<(), MirrorError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(fs::remove_dir_all(path).await?),
        Ok(_) => Ok(fs::remove_file(path).await?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Move a mirrored entry to its renamed path. A missing old entry is a
/// no-op: the paired create event materializes the new path instead.
async fn rename_entry(from: &Path, to: &Path) -> Result<(), MirrorError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

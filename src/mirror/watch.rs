use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::error;

/// Capacity of the raw-event channel between the watcher thread and a
/// session's event pump.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A normalized filesystem event, decoupled from the watcher backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorEvent {
    /// File content or metadata changed.
    Changed(PathBuf),
    /// A file or directory appeared.
    Created(PathBuf),
    /// A file or directory disappeared.
    Deleted(PathBuf),
    /// An entry was renamed in place.
    Renamed { from: PathBuf, to: PathBuf },
}

impl MirrorEvent {
    /// The source-tree path this event is about (the old path for renames).
    pub fn path(&self) -> &Path {
        match self {
            MirrorEvent::Changed(path)
            | MirrorEvent::Created(path)
            | MirrorEvent::Deleted(path) => path,
            MirrorEvent::Renamed { from, .. } => from,
        }
    }
}

/// Establish a recursive watch on `source`, bridging raw notifications into
/// a tokio channel. Dropping the returned watcher tears the subscription
/// down.
pub(crate) fn subscribe(
    source: &Path,
) -> Result<
    (
        RecommendedWatcher,
        mpsc::Receiver<notify::Result<Event>>,
    ),
    notify::Error,
> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if tx.blocking_send(res).is_err() {
            error!("watch event receiver dropped");
        }
    })?;
    watcher.watch(source, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

/// Normalize one raw watcher event into zero or more [`MirrorEvent`]s.
///
/// Unpaired rename halves degrade to delete/create, which converges to the
/// same destination state as a true rename. Access and other
/// non-mutating notifications are discarded.
pub(crate) fn map_event(event: &Event) -> Vec<MirrorEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .cloned()
            .map(MirrorEvent::Created)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .cloned()
            .map(MirrorEvent::Deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => map_rename(mode, &event.paths),
        EventKind::Modify(_) => event
            .paths
            .iter()
            .cloned()
            .map(MirrorEvent::Changed)
            .collect(),
        _ => Vec::new(),
    }
}

fn map_rename(mode: &RenameMode, paths: &[PathBuf]) -> Vec<MirrorEvent> {
    match mode {
        RenameMode::Both => match (paths.first(), paths.get(1)) {
            (Some(from), Some(to)) => vec![MirrorEvent::Renamed {
                from: from.clone(),
                to: to.clone(),
            }],
            _ => Vec::new(),
        },
        RenameMode::From => paths.iter().cloned().map(MirrorEvent::Deleted).collect(),
        RenameMode::To => paths.iter().cloned().map(MirrorEvent::Created).collect(),
        // Backends that cannot distinguish ends report a single path; resolve
        // by whether it still exists on the source side.
        _ => paths
            .iter()
            .cloned()
            .map(|path| {
                if path.exists() {
                    MirrorEvent::Created(path)
                } else {
                    MirrorEvent::Deleted(path)
                }
            })
            .collect(),
    }
}

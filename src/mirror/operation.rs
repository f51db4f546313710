use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Identifier for one tracked replication operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Observable state of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationState {
    Pending,
    Running,
    Completed,
    Cancelled,
}

/// Shared cell through which a running task publishes its state.
pub type StateCell = Arc<RwLock<OperationState>>;

struct Operation {
    label: String,
    state: StateCell,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Handle to a drained operation, used during session shutdown.
pub(crate) struct DrainedOperation {
    pub cancel: CancellationToken,
    pub task: Option<JoinHandle<()>>,
}

/// The set of operations a session currently has in flight.
///
/// Entries are registered before their task is spawned and remove themselves
/// on completion or cancellation, so the set converges to empty once the
/// session quiesces.
#[derive(Clone, Default)]
pub struct InFlight {
    ops: Arc<Mutex<HashMap<OperationId, Operation>>>,
}

impl InFlight {
    pub fn insert(
        &self,
        id: OperationId,
        label: impl Into<String>,
        state: StateCell,
        cancel: CancellationToken,
    ) {
        self.ops.lock().insert(
            id,
            Operation {
                label: label.into(),
                state,
                cancel,
                task: None,
            },
        );
    }

    /// Attach the spawned task's join handle. A no-op if the operation
    /// already finished and removed itself.
    pub fn attach_task(&self, id: OperationId, task: JoinHandle<()>) {
        if let Some(op) = self.ops.lock().get_mut(&id) {
            op.task = Some(task);
        }
    }

    pub fn remove(&self, id: OperationId) {
        self.ops.lock().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.ops.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.lock().is_empty()
    }

    pub fn any_running(&self) -> bool {
        self.ops
            .lock()
            .values()
            .any(|op| *op.state.read() == OperationState::Running)
    }

    pub fn labels(&self) -> Vec<String> {
        self.ops.lock().values().map(|op| op.label.clone()).collect()
    }

    /// Remove every tracked operation, handing back what is needed to cancel
    /// and await them.
    pub(crate) fn drain(&self) -> Vec<DrainedOperation> {
        self.ops
            .lock()
            .drain()
            .map(|(_, op)| DrainedOperation {
                cancel: op.cancel,
                task: op.task,
            })
            .collect()
    }
}

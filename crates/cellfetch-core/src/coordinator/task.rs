//! Per-position fetch bookkeeping.

use crate::cancel::CancelHandle;
use crate::key::{PositionId, ResourceKey};
use serde::Serialize;

/// Lifecycle of a [`FetchTask`].
///
/// `Pending` is a cache-served outcome waiting in the coordinator's queue;
/// `Running` is a download on a worker. Both are live. `Completed` and
/// `Cancelled` are terminal and free the position's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Cancelled,
    Completed,
}

impl TaskState {
    pub fn is_live(self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }
}

/// One fetch attempt for one position.
#[derive(Debug)]
pub struct FetchTask {
    pub position: PositionId,
    pub key: ResourceKey,
    pub state: TaskState,
    /// Stamp of the request that created this task.
    pub generation: u64,
    /// Present while a download is running.
    pub cancel: Option<CancelHandle>,
}

impl FetchTask {
    pub(crate) fn pending(position: PositionId, key: ResourceKey, generation: u64) -> Self {
        Self {
            position,
            key,
            state: TaskState::Pending,
            generation,
            cancel: None,
        }
    }

    pub(crate) fn running(
        position: PositionId,
        key: ResourceKey,
        generation: u64,
        cancel: CancelHandle,
    ) -> Self {
        Self {
            position,
            key,
            state: TaskState::Running,
            generation,
            cancel: Some(cancel),
        }
    }

    /// Whether a completion stamped `(generation, key)` belongs to this task.
    pub fn accepts(&self, generation: u64, key: &ResourceKey) -> bool {
        self.state.is_live() && self.generation == generation && &self.key == key
    }

    /// Cancel the task if it is still live.
    pub(crate) fn cancel(&mut self) {
        if !self.state.is_live() {
            return;
        }
        if let Some(handle) = &self.cancel {
            handle.cancel();
        }
        self.state = TaskState::Cancelled;
    }
}

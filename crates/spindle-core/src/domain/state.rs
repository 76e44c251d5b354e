//! Worker state machine.

use serde::{Deserialize, Serialize};

/// Worker state.
///
/// State transitions:
/// - Ready -> Scheduled -> Running -> Succeeded
/// - Ready -> Scheduled -> Running -> Failed
/// - any non-terminal -> Cancelled (explicit cancellation)
///
/// Cancelled absorbs everything: once entered, no later transition is applied.
///
/// Design note: Using an enum ensures exhaustive matching and prevents invalid states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkerState {
    /// Constructed, not yet handed to an executor.
    Ready,

    /// Handed to an executor, not yet running.
    Scheduled,

    /// Currently being executed on a worker thread.
    Running,

    /// Completed normally; a value is available.
    Succeeded,

    /// Cancellation was applied before a natural completion.
    Cancelled,

    /// The unit of work raised a failure.
    Failed,
}

impl WorkerState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerState::Succeeded | WorkerState::Cancelled | WorkerState::Failed
        )
    }

    /// Is the worker considered running (scheduled or actively executing)?
    pub fn is_running(self) -> bool {
        matches!(self, WorkerState::Scheduled | WorkerState::Running)
    }
}

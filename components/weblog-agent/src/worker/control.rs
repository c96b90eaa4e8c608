// Local crates
use crate::aggregator::aggregator::Aggregator;

// External crates
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a [`Worker`](crate::worker::worker::Worker).
///
/// ```text
/// Idle -> Running <-> Paused
///   \________\__________\____> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Paused => "paused",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("cannot {operation} a worker that is {state}")]
    InvalidState {
        operation: &'static str,
        state: WorkerState,
    },

    #[error("worker has stopped")]
    Stopped,
}

/// Requests sent from the worker handle to the ingest task.
pub(crate) enum Control {
    /// Hand the aggregator over through `ack` before touching it again,
    /// then wait for it to come back through `resume`.
    Pause {
        ack: oneshot::Sender<Aggregator>,
        resume: oneshot::Receiver<Aggregator>,
    },
}

/// Caller side of an in-flight pause. If the pausing future is dropped
/// after the ingest task already handed over, the aggregator goes straight
/// back instead of being lost.
pub(crate) struct PauseRequest {
    pub(crate) ack: oneshot::Receiver<Aggregator>,
    pub(crate) resume: Option<oneshot::Sender<Aggregator>>,
}

impl Drop for PauseRequest {
    fn drop(&mut self) {
        if let Some(resume) = self.resume.take() {
            // Closing first settles the hand-over: either it already
            // happened and is received below, or the ingest task's send
            // fails and it keeps the aggregator.
            self.ack.close();
            if let Ok(aggregator) = self.ack.try_recv() {
                let _ = resume.send(aggregator);
            }
        }
    }
}

/// Clonable handle that stops a worker from anywhere, including while a
/// collection holds it paused.
#[derive(Debug, Clone)]
pub struct StopHandle(pub(crate) CancellationToken);

impl StopHandle {
    pub fn stop(&self) {
        self.0.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.0.is_cancelled()
    }
}

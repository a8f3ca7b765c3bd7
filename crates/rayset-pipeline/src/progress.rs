//! One-way progress reporting from the worker to its caller.

use std::sync::mpsc::Sender;

use serde::Serialize;

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    /// Not started.
    Idle,
    /// Decoding the source header and records.
    Reading,
    /// Planning the selection.
    Sampling,
    /// Encoding the target.
    Writing,
    /// Finished successfully.
    Done,
    /// Terminated with an error.
    Failed,
    /// Cancelled by the caller.
    Cancelled,
}

impl JobState {
    /// Whether this state ends the job.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed | JobState::Cancelled)
    }
}

/// One progress event.
///
/// Record counts are monotonically increasing within a job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress {
    /// The job moved to a new state.
    State(JobState),
    /// Records processed so far out of the declared total.
    Records {
        /// Records processed so far.
        processed: u64,
        /// Declared source total.
        total: u64,
    },
}

/// Send a state change, ignoring a hung-up receiver: progress is advisory
/// and a job never fails because nobody is listening.
pub(crate) fn send_state(progress: Option<&Sender<Progress>>, state: JobState) {
    if let Some(tx) = progress {
        let _ = tx.send(Progress::State(state));
    }
}

/// Send a record-count update, ignoring a hung-up receiver.
pub(crate) fn send_records(progress: Option<&Sender<Progress>>, processed: u64, total: u64) {
    if let Some(tx) = progress {
        let _ = tx.send(Progress::Records { processed, total });
    }
}

//! Background execution of conversion jobs.

use std::sync::mpsc::{channel, Receiver};
use std::thread::{self, JoinHandle};

use crate::cancel::CancelToken;
use crate::convert::{convert, ConvertReport, ConvertRequest};
use crate::error::{ConvertError, Result};
use crate::progress::Progress;
use crate::settings::ConvertSettings;

/// One conversion job running on its own worker thread.
///
/// Progress flows one way, from the worker to the holder of this handle;
/// the worker never reaches back into caller state. Jobs share nothing, so
/// any number may run concurrently.
pub struct ConvertJob {
    handle: JoinHandle<Result<ConvertReport>>,
    progress: Receiver<Progress>,
    cancel: CancelToken,
}

impl ConvertJob {
    /// Start `request` on a new worker thread.
    pub fn spawn(request: ConvertRequest, settings: ConvertSettings) -> Self {
        let (tx, rx) = channel();
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let handle =
            thread::spawn(move || convert(&request, &settings, Some(&tx), &worker_cancel));
        Self {
            handle,
            progress: rx,
            cancel,
        }
    }

    /// The job's progress events; iterate to drain them as they arrive.
    pub fn progress(&self) -> &Receiver<Progress> {
        &self.progress
    }

    /// A handle that can cancel this job.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job and return its result.
    pub fn join(self) -> Result<ConvertReport> {
        match self.handle.join() {
            Ok(result) => result,
            Err(_) => Err(ConvertError::Worker),
        }
    }
}

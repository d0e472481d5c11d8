//! Events flowing from per-process reader tasks to the log printer.

use crate::process::RunningProcess;

/// A message for the shared log printer. `id` is the procfile position.
#[derive(Debug, Clone)]
pub enum Event {
    /// A process was launched; always the first event of its stream.
    ProcessStarted { id: usize, process: RunningProcess },
    /// One line of merged stdout/stderr output.
    ProcessOutput { id: usize, line: String },
    /// The process could not be launched at all.
    ProcessFailed { id: usize, name: String, error: String },
}

/// Termination signals the supervisor reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    SigInt,
    SigTerm,
}

impl ProcessSignal {
    pub fn label(self) -> &'static str {
        match self {
            ProcessSignal::SigInt => "SIGINT",
            ProcessSignal::SigTerm => "SIGTERM",
        }
    }
}

//! Progress hook for acquisition runs.
//!
//! The controller emits [`AcquireEvent`]s; the CLI decides how (or whether)
//! to render them.

use crate::policy::SkipReason;

#[derive(Clone, Debug, PartialEq)]
pub enum AcquireEvent {
    /// Walking listing pages; `candidates` references admitted so far.
    Discovering { pages: usize, candidates: usize },
    /// `n` candidates processed out of `total` currently queued.
    Harvesting {
        identifier: String,
        n: usize,
        total: usize,
    },
    Skipped { reference: String, reason: SkipReason },
}

pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: AcquireEvent);
}

/// No-op reporter.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: AcquireEvent) {}
}

//! Progress reporting for fetching and scoring.
//!
//! [`ProgressCallback`] keeps the fetchers and the scoring engine free of
//! any terminal rendering. The CLI plugs in `indicatif` bars; tests and
//! library callers use [`NullProgress`].

use std::sync::Arc;

/// Receives progress updates from a long-running step.
pub trait ProgressCallback: Send + Sync {
    /// Sets the expected number of units (records, pages, cells).
    fn set_total(&self, total: u64);

    /// Advances by `delta` units.
    fn inc(&self, delta: u64);

    /// Replaces the status message.
    fn set_message(&self, msg: String);

    /// Marks the step complete with a final message.
    fn finish(&self, msg: String);
}

/// Discards every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}

//! Completion counter for job trees.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Count of outstanding jobs in one job tree.
///
/// Every job that will later call [`JobCounter::complete`] must be added to the
/// counter *before* it becomes visible in any queue. The scheduler treats
/// `remaining() == 0` as "the whole tree has finished", so an early zero would
/// let a frame reset while work is still reachable.
#[derive(Debug, Default)]
pub struct JobCounter {
    remaining: AtomicUsize,
}

impl JobCounter {
    /// Creates a counter already accounting for `initial` jobs.
    pub fn new(initial: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(initial),
        }
    }

    /// Accounts for `n` more jobs.
    ///
    /// Relaxed is enough: the push that publishes the job is a release store,
    /// and the counter is already non-zero because the caller is itself an
    /// outstanding job (or the orchestrator before the run starts).
    pub fn add(&self, n: usize) {
        self.remaining.fetch_add(n, Ordering::Relaxed);
    }

    /// Marks one job as finished. Returns true if this brought the count to zero.
    ///
    /// Release ordering pairs with the acquire load in [`JobCounter::remaining`]:
    /// a thread that observes zero also observes every write the finished jobs made.
    pub fn complete(&self) -> bool {
        self.sub(1)
    }

    /// Removes `n` jobs that were added but never published.
    pub(crate) fn sub(&self, n: usize) -> bool {
        let old = self.remaining.fetch_sub(n, Ordering::Release);
        if old < n {
            tracing::error!(old, n, "job counter underflow");
            debug_assert!(old >= n, "job counter underflow: {old} - {n}");
        }
        old == n
    }

    /// Current number of outstanding jobs.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Checks if every accounted job has finished.
    pub fn is_complete(&self) -> bool {
        self.remaining() == 0
    }
}

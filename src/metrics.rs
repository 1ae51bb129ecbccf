//! Optional scheduler counters, compiled in with the `metrics` feature.

#[cfg(feature = "metrics")]
use std::sync::atomic::{AtomicU64, Ordering};
#[cfg(feature = "metrics")]
use std::time::Instant;

/// Bumps a metrics field when the `metrics` feature is enabled; expands to
/// nothing otherwise.
macro_rules! record {
    ($metrics:expr, $field:ident) => {
        #[cfg(feature = "metrics")]
        {
            $metrics
                .$field
                .fetch_add(1, ::std::sync::atomic::Ordering::Relaxed);
        }
    };
}
pub(crate) use record;

/// Stand-in when the `metrics` feature is off; the `record!` calls compile away.
#[cfg(not(feature = "metrics"))]
#[derive(Debug, Default)]
pub struct Metrics;

#[cfg(not(feature = "metrics"))]
impl Metrics {
    pub fn new() -> Self {
        Metrics
    }
}

/// Performance counters for one pool.
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct Metrics {
    /// Jobs executed, including ones that panicked.
    pub jobs_executed: AtomicU64,
    /// Jobs taken from the worker's own queue.
    pub local_pops: AtomicU64,
    /// Successful steals from other workers.
    pub steals_success: AtomicU64,
    /// Steal attempts that found the victim empty.
    pub steals_empty: AtomicU64,
    /// Steal attempts that lost the race on the victim's head.
    pub steals_retry: AtomicU64,
    /// Scheduler iterations that found no work while the counter was non-zero.
    pub idle_iterations: AtomicU64,
    /// Jobs that panicked.
    pub job_panics: AtomicU64,
    /// Time when metrics collection started.
    pub start_time: Instant,
}

#[cfg(feature = "metrics")]
impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "metrics")]
impl Metrics {
    pub fn new() -> Self {
        Self {
            jobs_executed: AtomicU64::new(0),
            local_pops: AtomicU64::new(0),
            steals_success: AtomicU64::new(0),
            steals_empty: AtomicU64::new(0),
            steals_retry: AtomicU64::new(0),
            idle_iterations: AtomicU64::new(0),
            job_panics: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Returns a snapshot of current metrics values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            jobs_executed: self.jobs_executed.load(Ordering::Relaxed),
            local_pops: self.local_pops.load(Ordering::Relaxed),
            steals_success: self.steals_success.load(Ordering::Relaxed),
            steals_empty: self.steals_empty.load(Ordering::Relaxed),
            steals_retry: self.steals_retry.load(Ordering::Relaxed),
            idle_iterations: self.idle_iterations.load(Ordering::Relaxed),
            job_panics: self.job_panics.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

/// Snapshot of metrics at a point in time.
#[cfg(feature = "metrics")]
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub jobs_executed: u64,
    pub local_pops: u64,
    pub steals_success: u64,
    pub steals_empty: u64,
    pub steals_retry: u64,
    pub idle_iterations: u64,
    pub job_panics: u64,
    pub elapsed_seconds: f64,
}

#[cfg(feature = "metrics")]
impl MetricsSnapshot {
    /// Calculates jobs per second throughput.
    pub fn jobs_per_second(&self) -> f64 {
        if self.elapsed_seconds > 0.0 {
            self.jobs_executed as f64 / self.elapsed_seconds
        } else {
            0.0
        }
    }

    /// Fraction of executed jobs that were obtained by stealing.
    pub fn steal_ratio(&self) -> f64 {
        let taken = self.local_pops + self.steals_success;
        if taken > 0 {
            self.steals_success as f64 / taken as f64
        } else {
            0.0
        }
    }
}

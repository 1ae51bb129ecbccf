//! Workers and the per-thread scheduler loop.
//!
//! Each worker thread repeatedly pops from its own queue, steals from its
//! peers when that is empty, and leaves once the frame's counter reads zero.
//! There is no parking: an idle worker spins, yields or backs off according
//! to the configured [`IdlePolicy`] until either work shows up or the counter
//! drains.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam::utils::Backoff;

use crate::allocator::arena::Arena;
use crate::config::IdlePolicy;
use crate::counter::JobCounter;
use crate::error::Result;
use crate::job::Job;
use crate::metrics::{Metrics, record};
use crate::profile;
use crate::queue::{JobQueue, Steal};

/// A worker identity and the queue it owns.
///
/// The worker does not own a thread; a thread is bound to it for the
/// duration of one [`Pool::run`](crate::Pool::run).
#[derive(Debug)]
pub struct Worker {
    id: usize,
    queue: JobQueue,
}

impl Worker {
    pub fn new(id: usize, queue_capacity: usize) -> Self {
        Worker {
            id,
            queue: JobQueue::with_capacity(queue_capacity),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn queue(&self) -> &JobQueue {
        &self.queue
    }

    /// Number of queued jobs (approximate while the pool runs).
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Steals the oldest job. Safe from any thread.
    pub fn steal(&self) -> Steal {
        self.queue.steal()
    }

    /// # Safety
    ///
    /// Caller must be the thread currently bound to this worker (or hold the
    /// pool exclusively while no thread is bound).
    pub(crate) unsafe fn push(&self, job: Job) -> Result<()> {
        unsafe { self.queue.push(job) }
    }

    /// # Safety
    ///
    /// Same contract as [`Worker::push`].
    pub(crate) unsafe fn pop_local(&self) -> Option<Job> {
        unsafe { self.queue.pop_local() }
    }
}

/// Shared state for one run of the pool, borrowed by every worker thread.
pub(crate) struct Scheduler<'a> {
    workers: &'a [Worker],
    counter: &'a JobCounter,
    idle: IdlePolicy,
    trace_jobs: bool,
    panics: AtomicUsize,
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    metrics: &'a Metrics,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        workers: &'a [Worker],
        counter: &'a JobCounter,
        idle: IdlePolicy,
        trace_jobs: bool,
        metrics: &'a Metrics,
    ) -> Self {
        Scheduler {
            workers,
            counter,
            idle,
            trace_jobs,
            panics: AtomicUsize::new(0),
            metrics,
        }
    }

    /// Number of jobs that panicked so far in this run.
    pub(crate) fn panics(&self) -> usize {
        self.panics.load(Ordering::Relaxed)
    }

    /// Runs worker `id`'s scheduler loop until the counter reaches zero.
    /// Returns the number of jobs this thread executed.
    ///
    /// # Safety
    ///
    /// Must be called from exactly one thread per worker id, and `arena` must
    /// be that worker's arena.
    pub(crate) unsafe fn run_worker(&self, id: usize, arena: &Arena) -> usize {
        let worker = &self.workers[id];
        let backoff = Backoff::new();
        let mut executed = 0;
        let _collect = self.trace_jobs.then(|| profile::CollectorGuard);

        tracing::trace!(worker = id, "scheduler loop started");

        loop {
            // SAFETY: this thread is the one bound to `worker`.
            let job = match unsafe { worker.pop_local() } {
                Some(job) => {
                    record!(self.metrics, local_pops);
                    Some(job)
                }
                None => self.steal_from_peers(id),
            };

            match job {
                Some(job) => {
                    // SAFETY: we own `worker` and `arena` belongs to it; popped
                    // and stolen jobs are handed out exactly once.
                    unsafe { self.execute(job, worker, arena) };
                    executed += 1;
                    backoff.reset();
                }
                None => {
                    // Acquire pairs with the release decrement of every finished job.
                    if self.counter.is_complete() {
                        break;
                    }
                    record!(self.metrics, idle_iterations);
                    self.wait(&backoff);
                }
            }
        }

        tracing::trace!(worker = id, executed, "scheduler loop finished");
        executed
    }

    /// Tries every other worker once, starting with the next id.
    fn steal_from_peers(&self, id: usize) -> Option<Job> {
        let n = self.workers.len();
        (1..n)
            .map(|offset| &self.workers[(id + offset) % n])
            .find_map(|victim| match victim.steal() {
                Steal::Success(job) => {
                    record!(self.metrics, steals_success);
                    Some(job)
                }
                Steal::Retry => {
                    record!(self.metrics, steals_retry);
                    tracing::trace!(thief = id, victim = victim.id(), "steal contended");
                    None
                }
                Steal::Empty => {
                    record!(self.metrics, steals_empty);
                    None
                }
            })
    }

    unsafe fn execute(&self, job: Job, worker: &Worker, arena: &Arena) {
        let _span = self
            .trace_jobs
            .then(|| profile::TraceGuard::new("job", worker.id()));

        // SAFETY: forwarded from the caller.
        let result = unsafe { job.execute(worker, arena) };
        record!(self.metrics, jobs_executed);

        if let Err(payload) = result {
            let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                *s
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.as_str()
            } else {
                "unknown panic"
            };
            tracing::error!(worker = worker.id(), panic = msg, "job panicked");
            record!(self.metrics, job_panics);
            self.panics.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn wait(&self, backoff: &Backoff) {
        match self.idle {
            IdlePolicy::Spin => std::hint::spin_loop(),
            IdlePolicy::Yield => std::thread::yield_now(),
            IdlePolicy::Backoff => backoff.snooze(),
        }
    }
}

/// Pins the current thread according to `core`, if such a core exists.
pub(crate) fn pin_current_thread(id: usize, core: Option<usize>) {
    let Some(core) = core else {
        return;
    };
    match core_affinity::get_core_ids() {
        Some(core_ids) if core < core_ids.len() => {
            if !core_affinity::set_for_current(core_ids[core]) {
                tracing::debug!(worker = id, core, "failed to pin worker thread");
            }
        }
        _ => tracing::debug!(worker = id, core, "no such core, worker left unpinned"),
    }
}

//! Job definitions and execution logic.
//!
//! A job is a plain function taking one payload reference plus the context of
//! the worker running it. The payload lives elsewhere (normally in a worker
//! arena); the job only carries pointers, so it is `Copy` and moves through
//! queues by value.

use std::fmt;
use std::mem;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::ptr::NonNull;
use std::thread;

use crate::allocator::arena::Arena;
use crate::context::JobContext;
use crate::counter::JobCounter;
use crate::worker::Worker;

/// Signature of a job function running in frame `'f`.
pub type JobFn<'f, T> = fn(&mut T, &JobContext<'f>);

// The frame lifetime is erased once the job is built; see `Job::new`.
type Trampoline = unsafe fn(*const (), NonNull<u8>, &JobContext<'static>);

/// A unit of work: function, payload, completion counter.
///
/// The context is not stored in the job. Whichever worker pops or steals the
/// job supplies its own context at execution time, so children spawned by
/// the job always land on the queue of the thread that is actually running it.
#[derive(Clone, Copy)]
pub struct Job {
    trampoline: Trampoline,
    func: *const (),
    payload: NonNull<u8>,
    counter: NonNull<JobCounter>,
    completes: bool,
}

// The payload type is required to be Send at construction.
unsafe impl Send for Job {}

/// Restores the typed function and payload erased by [`Job::new`].
unsafe fn trampoline<T>(func: *const (), payload: NonNull<u8>, ctx: &JobContext<'static>) {
    // SAFETY: `func` was produced from a `JobFn<'f, T>` in `Job::new`. The
    // context carries no `'f` data, and everything `'f` covers outlives the run.
    let func = unsafe { mem::transmute::<*const (), JobFn<'static, T>>(func) };
    // SAFETY: the constructor's contract guarantees a valid, unaliased T.
    let payload = unsafe { payload.cast::<T>().as_mut() };
    func(payload, ctx);
}

impl Job {
    /// Creates a job running `func` on the payload at `payload`.
    ///
    /// When `completes` is set, executing the job decrements `counter` once.
    /// The caller is responsible for having added this job to the counter
    /// before the job becomes visible to other threads.
    ///
    /// # Safety
    ///
    /// - `payload` must point to an initialized `T` that stays valid until the
    ///   job has executed (for arena payloads: no reset in between), and nothing
    ///   else may access it while the job is queued or running.
    /// - `'f` must outlive the run that executes this job, and with it every
    ///   borrow inside `T`.
    /// - `counter` must outlive this job and every job spawned from it.
    /// - `Job` is `Copy`, and every published copy executes on its own. Publish
    ///   a job at most once, unless its executions are known to be sequential
    ///   (a single worker draining its own queue); otherwise two workers hold
    ///   `&mut T` to the same payload at once.
    pub unsafe fn new<'f, T: Send + 'f>(
        func: JobFn<'f, T>,
        payload: NonNull<T>,
        counter: &JobCounter,
        completes: bool,
    ) -> Self {
        Job {
            trampoline: trampoline::<T>,
            func: func as *const (),
            payload: payload.cast(),
            counter: NonNull::from(counter),
            completes,
        }
    }

    /// Whether executing this job decrements its counter.
    pub fn completes(&self) -> bool {
        self.completes
    }

    /// Address of the payload this job operates on.
    pub fn payload(&self) -> NonNull<u8> {
        self.payload
    }

    /// Executes the job on `worker`, then decrements the counter if `completes`.
    ///
    /// A panic in the job function is caught and returned; the counter is
    /// still decremented so the job tree can terminate.
    ///
    /// # Safety
    ///
    /// Must run on the thread that owns `worker`, with `arena` being that
    /// worker's arena. The job must not have executed before.
    pub(crate) unsafe fn execute(self, worker: &Worker, arena: &Arena) -> thread::Result<()> {
        // SAFETY: the constructor guarantees the counter outlives the job.
        let counter = unsafe { self.counter.as_ref() };
        // SAFETY: the context is dropped before returning, on the caller's
        // thread, which owns `worker` and `arena`.
        let ctx = unsafe { JobContext::new(worker, arena, counter) };

        let result = catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: trampoline, func and payload were built together in `new`.
            unsafe { (self.trampoline)(self.func, self.payload, &ctx) }
        }));

        if self.completes {
            counter.complete();
        }
        result
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("payload", &self.payload)
            .field("counter", &self.counter)
            .field("completes", &self.completes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Add {
        value: u64,
        by: u64,
    }

    fn add(p: &mut Add, _ctx: &JobContext<'_>) {
        p.value += p.by;
    }

    fn boom(_p: &mut Add, _ctx: &JobContext<'_>) {
        panic!("Intentional panic for testing");
    }

    #[test]
    fn test_job_execution() {
        let worker = Worker::new(0, 4);
        let arena = Arena::new(64).unwrap();
        let counter = JobCounter::new(1);
        let payload = arena.alloc(Add { value: 1, by: 41 }).unwrap();

        let job = unsafe { Job::new(add, payload, &counter, true) };
        assert!(job.completes());
        assert_eq!(job.payload(), payload.cast::<u8>());

        unsafe { job.execute(&worker, &arena) }.unwrap();
        assert_eq!(unsafe { payload.as_ref() }.value, 42);
        assert!(counter.is_complete());
    }

    #[test]
    fn test_non_completing_job_leaves_counter() {
        let worker = Worker::new(0, 4);
        let arena = Arena::new(64).unwrap();
        let counter = JobCounter::new(1);
        let payload = arena.alloc(Add { value: 0, by: 1 }).unwrap();

        let job = unsafe { Job::new(add, payload, &counter, false) };
        unsafe { job.execute(&worker, &arena) }.unwrap();
        assert_eq!(counter.remaining(), 1);
    }

    #[test]
    fn test_panicking_job_still_completes() {
        let worker = Worker::new(0, 4);
        let arena = Arena::new(64).unwrap();
        let counter = JobCounter::new(1);
        let payload = arena.alloc(Add { value: 0, by: 0 }).unwrap();

        let job = unsafe { Job::new(boom, payload, &counter, true) };
        assert!(unsafe { job.execute(&worker, &arena) }.is_err());
        assert!(counter.is_complete());
    }
}

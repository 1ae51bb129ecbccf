//! Context handed to running jobs for allocating and spawning children.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::allocator::arena::Arena;
use crate::counter::JobCounter;
use crate::error::{Error, Result};
use crate::job::{Job, JobFn};
use crate::worker::Worker;

/// Binds a running job to the worker executing it and that worker's arena.
///
/// A context only exists on the worker's own thread for the duration of one
/// job. It is neither `Send` nor `Sync`, which is what makes owner-side queue
/// pushes through it sound.
///
/// `'f` is the frame: everything a spawned child borrows must outlive it,
/// since the child may run long after its parent returned. A child cannot
/// borrow its parent's stack:
///
/// ```compile_fail
/// use stealframe::JobContext;
///
/// struct Holder<'a> {
///     values: &'a [i64; 64],
/// }
///
/// fn read(_: &mut Holder<'_>, _: &JobContext<'_>) {}
///
/// fn parent(_: &mut (), ctx: &JobContext<'_>) {
///     let local = [1i64; 64];
///     ctx.spawn(read, Holder { values: &local }).unwrap();
/// }
/// ```
pub struct JobContext<'f> {
    worker: NonNull<Worker>,
    arena: NonNull<Arena>,
    counter: NonNull<JobCounter>,
    // Invariant, so a context cannot be coerced to a shorter frame.
    _frame: PhantomData<fn(&'f ()) -> &'f ()>,
}

impl<'f> JobContext<'f> {
    /// # Safety
    ///
    /// The context must be used on `worker`'s thread only, `arena` must be that
    /// worker's arena, and all three must outlive the context. Data living for
    /// `'f` must stay valid until every job of the frame has run.
    pub(crate) unsafe fn new(worker: &Worker, arena: &Arena, counter: &JobCounter) -> Self {
        JobContext {
            worker: NonNull::from(worker),
            arena: NonNull::from(arena),
            counter: NonNull::from(counter),
            _frame: PhantomData,
        }
    }

    fn worker(&self) -> &Worker {
        // SAFETY: outlives the context, see `new`.
        unsafe { self.worker.as_ref() }
    }

    pub fn worker_id(&self) -> usize {
        self.worker().id()
    }

    /// The arena of the executing worker.
    pub fn arena(&self) -> &Arena {
        // SAFETY: outlives the context, see `new`.
        unsafe { self.arena.as_ref() }
    }

    /// The counter of the running job's tree.
    pub fn counter(&self) -> &JobCounter {
        // SAFETY: outlives the context, see `new`.
        unsafe { self.counter.as_ref() }
    }

    /// Moves `value` into the executing worker's arena.
    pub fn alloc<T>(&self, value: T) -> Result<NonNull<T>> {
        self.arena().alloc(value)
    }

    /// Pushes a prepared job onto the executing worker's queue.
    ///
    /// The job must already be accounted for in its counter.
    pub fn push(&self, job: Job) -> Result<()> {
        // SAFETY: a context only lives on its worker's thread, inside that
        // worker's scheduler loop, so this is the owner pushing.
        unsafe { self.worker().push(job) }
    }

    /// Spawns one child job of the running job's tree.
    ///
    /// The payload is allocated first, the counter incremented second, and the
    /// job published last. If the push is rejected the increment is undone.
    pub fn spawn<T: Send + 'f>(&self, func: JobFn<'f, T>, value: T) -> Result<()> {
        let payload = self.alloc(value)?;
        let counter = self.counter();
        counter.add(1);

        // SAFETY: the payload lives in this worker's arena, which cannot be
        // reset while the pool runs, and only borrows data outliving the
        // frame; it is published exactly once. The counter outlives the tree.
        let job = unsafe { Job::new(func, payload, counter, true) };
        self.push(job).inspect_err(|_| {
            counter.sub(1);
        })
    }

    /// Spawns `N` children whose payloads are allocated as one contiguous block.
    ///
    /// All or nothing: if the queue lacks room for `N` more jobs, nothing is
    /// allocated or counted and [`Error::QueueOverflow`] is returned, so the
    /// caller may do the work inline instead. The counter is raised by `N`
    /// before any child is published.
    pub fn spawn_batch<T: Send + 'f, const N: usize>(
        &self,
        func: JobFn<'f, T>,
        values: [T; N],
    ) -> Result<()> {
        // Only the owner pushes, so free space can only grow until our pushes.
        let queue = self.worker().queue();
        if queue.capacity() - queue.len().min(queue.capacity()) < N {
            tracing::trace!(worker = self.worker_id(), children = N, "spawn batch rejected");
            return Err(Error::QueueOverflow {
                capacity: queue.capacity(),
            });
        }

        let block = self.alloc(values)?.cast::<T>();
        let counter = self.counter();
        counter.add(N);

        for i in 0..N {
            // SAFETY: element i of the freshly written array; see `spawn`.
            let job = unsafe { Job::new(func, block.add(i), counter, true) };
            if let Err(err) = self.push(job) {
                counter.sub(N - i);
                return Err(err);
            }
        }
        Ok(())
    }
}

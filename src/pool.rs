//! Pool construction, seeding, run-to-completion and frame reset.
//!
//! A [`Pool`] owns the workers (queues) and one arena per worker. It is the
//! orchestrator side of the scheduler: it seeds top-level jobs while idle,
//! drives all workers until the frame's counter drains, and rewinds the
//! arenas for the next frame.

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::allocator::arena::Arena;
use crate::config::PoolConfig;
use crate::counter::JobCounter;
use crate::error::{Error, Result};
use crate::job::{Job, JobFn};
use crate::metrics::Metrics;
#[cfg(feature = "metrics")]
use crate::metrics::MetricsSnapshot;
use crate::worker::{Scheduler, Worker, pin_current_thread};

/// Outcome of one [`Pool::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Jobs executed by each worker, indexed by worker id.
    pub executed: Vec<usize>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn total_executed(&self) -> usize {
        self.executed.iter().sum()
    }
}

/// A fixed set of workers, each with a bounded queue and a frame arena.
pub struct Pool {
    config: PoolConfig,
    workers: Vec<Worker>,
    arenas: Vec<Arena>,
    metrics: Metrics,
}

impl Pool {
    /// Creates a pool from a validated configuration.
    ///
    /// No threads are started here; they exist only for the duration of
    /// [`Pool::run`].
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let workers = (0..config.workers)
            .map(|id| Worker::new(id, config.queue_capacity))
            .collect();
        let arenas = (0..config.workers)
            .map(|_| Arena::new(config.arena_capacity))
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            arena_capacity = config.arena_capacity,
            "pool created"
        );

        Ok(Pool {
            config,
            workers,
            arenas,
            metrics: Metrics::new(),
        })
    }

    /// Creates a pool with `workers` workers and default settings otherwise.
    pub fn with_workers(workers: usize) -> Result<Self> {
        Self::new(PoolConfig::default().with_workers(workers))
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker(&self, id: usize) -> Result<&Worker> {
        self.workers.get(id).ok_or(Error::InvalidWorker {
            id,
            workers: self.workers.len(),
        })
    }

    pub fn arena(&self, id: usize) -> Result<&Arena> {
        self.arenas.get(id).ok_or(Error::InvalidWorker {
            id,
            workers: self.workers.len(),
        })
    }

    /// Total number of jobs sitting in queues.
    pub fn queued(&self) -> usize {
        self.workers.iter().map(Worker::len).sum()
    }

    #[cfg(feature = "metrics")]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Moves a seed payload into worker `id`'s arena.
    pub fn alloc<T>(&self, id: usize, value: T) -> Result<NonNull<T>> {
        self.arena(id)?.alloc(value)
    }

    /// Pushes a prepared job onto worker `id`'s queue.
    ///
    /// The job must already be accounted for in its counter.
    pub fn submit(&mut self, id: usize, job: Job) -> Result<()> {
        let worker = self.worker(id)?;
        // SAFETY: `&mut self` means no run is in progress, so no other thread
        // can be acting as this queue's owner.
        unsafe { worker.push(job) }
    }

    /// Pushes several prepared jobs onto worker `id`'s queue.
    ///
    /// Stops at the first rejected job and returns how many were pushed
    /// alongside the error.
    pub fn submit_batch<I>(&mut self, id: usize, jobs: I) -> Result<usize, (usize, Error)>
    where
        I: IntoIterator<Item = Job>,
    {
        let mut pushed = 0;
        for job in jobs {
            self.submit(id, job).map_err(|e| (pushed, e))?;
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Runs every worker until `counter` reaches zero.
    ///
    /// The calling thread acts as worker 0; workers `1..n` run on scoped
    /// threads that are joined before this returns. Pinning applies to the
    /// scoped threads only; the calling thread keeps its affinity. Jobs that
    /// panicked are reported as [`Error::JobPanicked`] after the frame has
    /// drained.
    pub fn run(&mut self, counter: &JobCounter) -> Result<RunReport> {
        let start = Instant::now();
        let workers = self.workers.len();
        tracing::debug!(workers, remaining = counter.remaining(), "run started");

        let scheduler = Scheduler::new(
            &self.workers,
            counter,
            self.config.idle,
            self.config.trace_jobs,
            &self.metrics,
        );
        let pinning = self.config.pinning;
        let Some((first_arena, rest)) = self.arenas.split_first_mut() else {
            return Err(Error::InvalidConfig("pool has no workers".into()));
        };

        let mut executed = vec![0; workers];
        let mut worker_panics = 0;

        thread::scope(|s| {
            let scheduler = &scheduler;
            let handles: Vec<_> = rest
                .iter_mut()
                .enumerate()
                .map(|(i, arena)| {
                    let id = i + 1;
                    let handle = thread::Builder::new()
                        .name(format!("stealframe-worker-{id}"))
                        .spawn_scoped(s, move || {
                            pin_current_thread(id, pinning.core_for(id));
                            // SAFETY: this is the only thread bound to worker `id`.
                            unsafe { scheduler.run_worker(id, arena) }
                        });
                    // Peers steal a missing worker's queue, so the frame still drains.
                    let handle = handle
                        .inspect_err(|e| {
                            tracing::error!(worker = id, error = %e, "failed to spawn worker thread")
                        })
                        .ok();
                    (id, handle)
                })
                .collect();

            // SAFETY: the calling thread is the only one bound to worker 0.
            executed[0] = unsafe { scheduler.run_worker(0, first_arena) };

            for (id, handle) in handles {
                match handle.map(|h| h.join()) {
                    Some(Ok(count)) => executed[id] = count,
                    Some(Err(_)) => {
                        tracing::error!(worker = id, "worker thread panicked");
                        worker_panics += 1;
                    }
                    None => {}
                }
            }
        });

        let report = RunReport {
            executed,
            elapsed: start.elapsed(),
        };
        tracing::debug!(
            jobs = report.total_executed(),
            elapsed_us = report.elapsed.as_micros() as u64,
            "run finished"
        );

        if worker_panics > 0 {
            return Err(Error::WorkerPanicked {
                count: worker_panics,
            });
        }
        match scheduler.panics() {
            0 => Ok(report),
            count => Err(Error::JobPanicked { count }),
        }
    }

    /// Seeds a frame through `seed` and runs it to completion.
    ///
    /// Every job spawned through the [`Seeder`] is accounted for in `counter`
    /// before it is pushed. If `seed` fails, the jobs it already spawned are
    /// still run so the counter drains, and then the seeding error is returned.
    ///
    /// The frame `'f` outlives this call, so seeded payloads may borrow data
    /// from the caller but not from inside `seed`:
    ///
    /// ```compile_fail
    /// use std::sync::atomic::AtomicI64;
    /// use stealframe::workload::{RangeSum, range_sum};
    /// use stealframe::{JobCounter, Pool};
    ///
    /// let mut pool = Pool::with_workers(2).unwrap();
    /// let total = AtomicI64::new(0);
    /// let counter = JobCounter::new(0);
    /// pool.run_frame(&counter, |seeder| {
    ///     let data = vec![7i64; 1000];
    ///     seeder.spawn(0, range_sum, RangeSum::new(&data, 64, &total))?;
    ///     Ok(())
    /// })
    /// .unwrap();
    /// ```
    pub fn run_frame<'f, F>(&mut self, counter: &'f JobCounter, seed: F) -> Result<RunReport>
    where
        F: FnOnce(&mut Seeder<'_, 'f>) -> Result<()>,
    {
        let seeded = seed(&mut Seeder {
            pool: self,
            counter,
            _frame: PhantomData,
        });
        let report = self.run(counter)?;
        seeded.map(|()| report)
    }

    /// Rewinds every arena for the next frame.
    ///
    /// Refuses with [`Error::FrameInFlight`] if any queue still holds jobs,
    /// since their payloads would dangle.
    pub fn reset_frame(&mut self) -> Result<()> {
        let queued = self.queued();
        if queued > 0 {
            return Err(Error::FrameInFlight { queued });
        }

        let used: usize = self.arenas.iter().map(Arena::used_bytes).sum();
        self.arenas.iter_mut().for_each(Arena::reset);
        tracing::debug!(reclaimed_bytes = used, "frame reset");
        Ok(())
    }
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.config)
            .field("workers", &self.workers)
            .field("arenas", &self.arenas)
            .finish()
    }
}

/// Seeds top-level jobs of frame `'f`; see [`Pool::run_frame`].
pub struct Seeder<'p, 'f> {
    pool: &'p mut Pool,
    counter: &'f JobCounter,
    _frame: PhantomData<fn(&'f ()) -> &'f ()>,
}

impl<'f> Seeder<'_, 'f> {
    /// Moves a payload into worker `id`'s arena without spawning anything.
    pub fn alloc<T>(&self, id: usize, value: T) -> Result<NonNull<T>> {
        self.pool.alloc(id, value)
    }

    /// Spawns a top-level job on worker `id` and returns its payload pointer.
    ///
    /// The payload stays readable after the run, until [`Pool::reset_frame`].
    pub fn spawn<T: Send + 'f>(
        &mut self,
        id: usize,
        func: JobFn<'f, T>,
        value: T,
    ) -> Result<NonNull<T>> {
        let payload = self.pool.alloc(id, value)?;
        self.counter.add(1);

        // SAFETY: the payload lives in a pool arena that cannot be reset before
        // `run_frame` returns, `'f` and the counter outlive the whole frame,
        // and the job is published once.
        let job = unsafe { Job::new(func, payload, self.counter, true) };
        self.pool.submit(id, job).inspect_err(|_| {
            self.counter.sub(1);
        })?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdlePolicy;
    use crate::context::JobContext;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Tally<'a> {
        hits: &'a AtomicUsize,
    }

    fn tally(t: &mut Tally<'_>, _: &JobContext<'_>) {
        t.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn small_config(workers: usize) -> PoolConfig {
        PoolConfig::default()
            .with_workers(workers)
            .with_queue_capacity(64)
            .with_arena_capacity(4096)
    }

    #[test]
    fn test_pool_creation() {
        let pool = Pool::new(small_config(4)).unwrap();
        assert_eq!(pool.num_workers(), 4);
        assert_eq!(pool.worker(3).unwrap().id(), 3);
        assert_eq!(pool.arena(0).unwrap().capacity(), 4096);
        assert_eq!(
            pool.worker(4).unwrap_err(),
            Error::InvalidWorker { id: 4, workers: 4 }
        );
        assert!(Pool::new(small_config(0)).is_err());
    }

    #[test]
    fn test_pinned_workers_run_to_completion() {
        use crate::config::PinningStrategy;

        // Pinning is best effort: ids past the last core stay unpinned.
        for pinning in [PinningStrategy::Linear, PinningStrategy::AvoidSmt] {
            let hits = AtomicUsize::new(0);
            let counter = JobCounter::new(0);
            let mut pool = Pool::new(small_config(3).with_pinning(pinning)).unwrap();

            let report = pool
                .run_frame(&counter, |seeder| {
                    for id in 0..30 {
                        seeder.spawn(id % 3, tally, Tally { hits: &hits })?;
                    }
                    Ok(())
                })
                .unwrap();

            assert_eq!(report.total_executed(), 30);
            assert_eq!(hits.load(Ordering::Relaxed), 30);
            assert_eq!(report.executed.len(), 3);
        }
    }

    #[test]
    fn test_run_with_nothing_queued_returns() {
        let mut pool = Pool::new(small_config(3)).unwrap();
        let report = pool.run(&JobCounter::new(0)).unwrap();
        assert_eq!(report.total_executed(), 0);
        assert_eq!(report.executed.len(), 3);
    }

    #[test]
    fn test_run_frame_executes_every_seed() {
        let hits = AtomicUsize::new(0);
        let counter = JobCounter::new(0);
        let mut pool = Pool::new(small_config(4).with_idle(IdlePolicy::Yield)).unwrap();

        let report = pool
            .run_frame(&counter, |seeder| {
                for _ in 0..50 {
                    seeder.spawn(0, tally, Tally { hits: &hits })?;
                }
                Ok(())
            })
            .unwrap();

        assert_eq!(hits.load(Ordering::Relaxed), 50);
        assert_eq!(report.total_executed(), 50);
        assert!(counter.is_complete());
        pool.reset_frame().unwrap();
        assert_eq!(pool.arena(0).unwrap().used_bytes(), 0);
    }

    #[test]
    fn test_seed_error_still_drains_frame() {
        let hits = AtomicUsize::new(0);
        let counter = JobCounter::new(0);
        let mut pool = Pool::new(small_config(2).with_queue_capacity(4)).unwrap();

        let err = pool
            .run_frame(&counter, |seeder| {
                for _ in 0..10 {
                    seeder.spawn(1, tally, Tally { hits: &hits })?;
                }
                Ok(())
            })
            .unwrap_err();

        assert_eq!(err, Error::QueueOverflow { capacity: 4 });
        assert_eq!(hits.load(Ordering::Relaxed), 4);
        assert!(counter.is_complete());
        assert_eq!(pool.queued(), 0);
    }

    #[test]
    fn test_reset_refused_while_jobs_queued() {
        let hits = AtomicUsize::new(0);
        let counter = JobCounter::new(1);
        let mut pool = Pool::new(small_config(2)).unwrap();

        let payload = pool.alloc(0, Tally { hits: &hits }).unwrap();
        let job = unsafe { Job::new(tally, payload, &counter, true) };
        pool.submit(0, job).unwrap();

        assert_eq!(
            pool.reset_frame().unwrap_err(),
            Error::FrameInFlight { queued: 1 }
        );

        pool.run(&counter).unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 1);
        pool.reset_frame().unwrap();
    }

    #[test]
    fn test_submit_batch_reports_partial_push() {
        let hits = AtomicUsize::new(0);
        let counter = JobCounter::new(3);
        let mut pool = Pool::new(small_config(1).with_queue_capacity(2)).unwrap();

        let payload = pool.alloc(0, Tally { hits: &hits }).unwrap();
        // Single worker: jobs run one after another, so sharing the payload is fine.
        let job = unsafe { Job::new(tally, payload, &counter, true) };
        let (pushed, err) = pool.submit_batch(0, [job, job, job]).unwrap_err();
        assert_eq!(pushed, 2);
        assert_eq!(err, Error::QueueOverflow { capacity: 2 });

        // Account for the rejected one, then drain.
        counter.complete();
        pool.run(&counter).unwrap();
        assert_eq!(hits.load(Ordering::Relaxed), 2);
    }
}

//! Recursive range summation, the reference workload for the scheduler.
//!
//! A [`RangeSum`] job either sums its slice directly or, when the slice is
//! longer than the split threshold, spawns two children covering the halves.
//! Leaves add their partial sum into a shared total; the frame counter tells
//! the caller when every leaf has done so.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::context::JobContext;
use crate::counter::JobCounter;
use crate::error::Result;
use crate::pool::Pool;

/// Payload of one range-sum job.
#[derive(Debug, Clone, Copy)]
pub struct RangeSum<'a> {
    data: &'a [i64],
    threshold: usize,
    total: &'a AtomicI64,
    /// Partial sum written by a leaf; stays 0 for jobs that split.
    pub result: i64,
}

impl<'a> RangeSum<'a> {
    /// Describes a sum over `data`, splitting ranges longer than `threshold`.
    pub fn new(data: &'a [i64], threshold: usize, total: &'a AtomicI64) -> Self {
        RangeSum {
            data,
            threshold: threshold.max(1),
            total,
            result: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn split(&self) -> [RangeSum<'a>; 2] {
        let (left, right) = self.data.split_at(self.data.len() / 2);
        [
            RangeSum {
                data: left,
                result: 0,
                ..*self
            },
            RangeSum {
                data: right,
                result: 0,
                ..*self
            },
        ]
    }
}

/// Job function: sum the range, splitting it first if it is too long.
///
/// If the split cannot be spawned (full queue or arena), the job falls back
/// to summing the whole range itself.
pub fn range_sum<'f>(task: &mut RangeSum<'f>, ctx: &JobContext<'f>) {
    if task.len() > task.threshold {
        match ctx.spawn_batch(range_sum, task.split()) {
            Ok(()) => return,
            Err(err) => {
                tracing::trace!(worker = ctx.worker_id(), %err, "split rejected, summing inline");
            }
        }
    }

    let sum: i64 = task.data.iter().sum();
    task.result = sum;
    task.total.fetch_add(sum, Ordering::Relaxed);
}

/// Sums `data` on `pool` as one frame, splitting ranges longer than `threshold`.
///
/// The pool's arenas are reset afterwards.
pub fn parallel_sum(pool: &mut Pool, data: &[i64], threshold: usize) -> Result<i64> {
    let total = AtomicI64::new(0);
    let counter = JobCounter::new(0);

    pool.run_frame(&counter, |seeder| {
        seeder.spawn(0, range_sum, RangeSum::new(data, threshold, &total))?;
        Ok(())
    })?;
    pool.reset_frame()?;

    // The counter's acquire load of zero made every leaf's addition visible.
    Ok(total.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;

    fn pool(workers: usize) -> Pool {
        Pool::new(
            PoolConfig::default()
                .with_workers(workers)
                .with_queue_capacity(256)
                .with_arena_capacity(64 * 1024),
        )
        .unwrap()
    }

    #[test]
    fn test_split_covers_range() {
        let data = [1, 2, 3, 4, 5];
        let total = AtomicI64::new(0);
        let task = RangeSum::new(&data, 1, &total);
        let [left, right] = task.split();
        assert_eq!(left.data, &[1, 2]);
        assert_eq!(right.data, &[3, 4, 5]);
        assert_eq!(left.threshold, 1);
    }

    #[test]
    fn test_below_threshold_runs_as_one_leaf() {
        let data: Vec<i64> = (1..=10).collect();
        let mut pool = pool(2);
        let total = AtomicI64::new(0);
        let counter = JobCounter::new(0);

        let mut payload = None;
        let report = pool
            .run_frame(&counter, |seeder| {
                payload = Some(seeder.spawn(0, range_sum, RangeSum::new(&data, 64, &total))?);
                Ok(())
            })
            .unwrap();

        assert_eq!(report.total_executed(), 1);
        assert_eq!(unsafe { payload.unwrap().as_ref() }.result, 55);
        assert_eq!(total.load(Ordering::Relaxed), 55);
    }

    #[test]
    fn test_parallel_sum_matches_sequential() {
        let data: Vec<i64> = (0..10_000).map(|i| i * 7 - 3_000).collect();
        let mut pool = pool(4);
        assert_eq!(
            parallel_sum(&mut pool, &data, 32).unwrap(),
            data.iter().sum::<i64>()
        );
    }

    #[test]
    fn test_empty_input() {
        let mut pool = pool(2);
        assert_eq!(parallel_sum(&mut pool, &[], 8).unwrap(), 0);
    }
}

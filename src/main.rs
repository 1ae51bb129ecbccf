use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::time::Instant;

use stealframe::workload::{RangeSum, parallel_sum, range_sum};
use stealframe::{JobContext, JobCounter, Pool, PoolConfig};

struct Spin<'a> {
    done: &'a AtomicUsize,
}

fn spin(task: &mut Spin<'_>, _ctx: &JobContext<'_>) {
    // Minimal work
    let mut x = 0u64;
    for i in 0..10 {
        x = std::hint::black_box(x + i);
    }
    task.done.fetch_add(1, Ordering::Relaxed);
}

fn main() -> stealframe::Result<()> {
    println!("stealframe - Frame-Oriented Work-Stealing Scheduler\n");

    let num_workers = 4;
    let mut pool = Pool::new(
        PoolConfig::default()
            .with_workers(num_workers)
            .with_arena_capacity(1024),
    )?;
    println!("Initialized pool with {} workers\n", num_workers);

    // Example 1: two top-level jobs, seeded by hand
    println!("Example 1: Two leaf jobs");
    let left = [1i64, 2, 3];
    let right = [4i64, 5, 6];
    let total = AtomicI64::new(0);
    let counter = JobCounter::new(0);
    let mut payloads = Vec::new();
    pool.run_frame(&counter, |seeder| {
        for data in [&left[..], &right[..]] {
            payloads.push(seeder.spawn(0, range_sum, RangeSum::new(data, 64, &total))?);
        }
        Ok(())
    })?;
    for payload in &payloads {
        // SAFETY: payloads stay valid until the next reset_frame.
        println!("  Result: {}", unsafe { payload.as_ref() }.result);
    }
    println!("  Remaining: {}\n", counter.remaining());
    pool.reset_frame()?;

    // Example 2: recursive splitting
    println!("Example 2: Recursive range sum");
    let mut pool = Pool::new(PoolConfig::default().with_workers(num_workers))?;
    let data: Vec<i64> = (1..=1000).collect();
    let start = Instant::now();
    let sum = parallel_sum(&mut pool, &data, 64)?;
    println!("  Summed {} elements in {:?}", data.len(), start.elapsed());
    println!(
        "  Sum result: {} (expected: {})\n",
        sum,
        data.iter().sum::<i64>()
    );

    // Example 3: throughput
    println!("Example 3: High-throughput frame");
    let num_jobs = 4000;
    let done = AtomicUsize::new(0);
    let counter = JobCounter::new(0);
    let report = pool.run_frame(&counter, |seeder| {
        for _ in 0..num_jobs {
            seeder.spawn(0, spin, Spin { done: &done })?;
        }
        Ok(())
    })?;
    pool.reset_frame()?;

    let jobs_per_second = num_jobs as f64 / report.elapsed.as_secs_f64();
    println!("  Executed {} jobs in {:?}", done.load(Ordering::Relaxed), report.elapsed);
    println!("  Per worker: {:?}", report.executed);
    println!("  Throughput: {:.2} jobs/second\n", jobs_per_second);

    println!("Done!");
    Ok(())
}

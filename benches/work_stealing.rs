//! Work-stealing stress benchmark using criterion.
//!
//! Every job is seeded on worker 0, so all other workers only ever get work
//! by stealing. The workload is imbalanced: every 10th job is heavy.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::sync::atomic::{AtomicUsize, Ordering};
use stealframe::{JobContext, JobCounter, Pool, PoolConfig};

fn fibonacci(n: u64) -> u64 {
    if n <= 1 {
        return n;
    }
    let mut a = 0u64;
    let mut b = 1u64;
    for _ in 2..=n {
        let temp = a.wrapping_add(b);
        a = b;
        b = temp;
    }
    b
}

struct Work<'a> {
    index: usize,
    completed: &'a AtomicUsize,
}

fn work(task: &mut Work<'_>, _ctx: &JobContext<'_>) {
    let n = if task.index % 10 == 0 { 1000 } else { 10 };
    std::hint::black_box(fibonacci(std::hint::black_box(n)));
    task.completed.fetch_add(1, Ordering::Relaxed);
}

fn bench_work_stealing_stress(c: &mut Criterion) {
    let num_threads = num_cpus::get();
    let mut pool = Pool::new(
        PoolConfig::default()
            .with_workers(num_threads)
            .with_queue_capacity(1 << 17)
            .with_arena_capacity(8 << 20),
    )
    .expect("pool");

    let mut group = c.benchmark_group("work_stealing");
    group.sample_size(10);

    for total_jobs in [1_000, 10_000, 100_000] {
        group.throughput(Throughput::Elements(total_jobs as u64));

        group.bench_function(BenchmarkId::new("imbalanced", total_jobs), |b| {
            b.iter(|| {
                let completed = AtomicUsize::new(0);
                let counter = JobCounter::new(0);
                pool.run_frame(&counter, |seeder| {
                    for index in 0..total_jobs {
                        seeder.spawn(
                            0,
                            work,
                            Work {
                                index,
                                completed: &completed,
                            },
                        )?;
                    }
                    Ok(())
                })
                .expect("frame");
                pool.reset_frame().expect("reset");

                std::hint::black_box(completed.load(Ordering::Relaxed));
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_work_stealing_stress);
criterion_main!(benches);

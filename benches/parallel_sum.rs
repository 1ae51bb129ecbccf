//! Recursive range-sum benchmark using criterion.
//!
//! Sweeps the split threshold to show the cost of fine-grained splitting.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stealframe::workload::parallel_sum;
use stealframe::{Pool, PoolConfig};

fn bench_parallel_sum(c: &mut Criterion) {
    let num_threads = num_cpus::get();
    let mut pool = Pool::new(
        PoolConfig::default()
            .with_workers(num_threads)
            .with_queue_capacity(1 << 14)
            .with_arena_capacity(16 << 20),
    )
    .expect("pool");

    let data: Vec<i64> = (0..1_000_000).collect();
    let expected: i64 = data.iter().sum();

    let mut group = c.benchmark_group("parallel_sum");
    group.sample_size(20);
    group.throughput(Throughput::Elements(data.len() as u64));

    group.bench_function("sequential", |b| {
        b.iter(|| std::hint::black_box(data.iter().sum::<i64>()))
    });

    for threshold in [256, 4096, 65_536] {
        group.bench_function(BenchmarkId::new("threshold", threshold), |b| {
            b.iter(|| {
                let sum = parallel_sum(&mut pool, &data, threshold).expect("frame");
                assert_eq!(sum, expected);
                std::hint::black_box(sum)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_parallel_sum);
criterion_main!(benches);

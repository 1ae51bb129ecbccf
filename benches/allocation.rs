//! Arena allocation throughput benchmark using criterion.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use stealframe::Arena;

#[derive(Clone, Copy)]
#[allow(dead_code)]
struct Payload {
    data: *const i64,
    len: usize,
    threshold: usize,
    result: i64,
}

fn bench_allocation(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocation");
    group.sample_size(10);

    for count in [1_000, 10_000, 100_000, 1_000_000] {
        let mut arena = Arena::new(count * std::mem::size_of::<Payload>()).expect("arena");
        group.throughput(Throughput::Elements(count as u64));

        group.bench_function(BenchmarkId::new("arena", count), |b| {
            b.iter(|| {
                arena.reset();
                for i in 0..count {
                    let ptr = arena
                        .alloc(Payload {
                            data: std::ptr::null(),
                            len: i,
                            threshold: 64,
                            result: 0,
                        })
                        .expect("capacity");
                    std::hint::black_box(ptr);
                }
            })
        });

        group.bench_function(BenchmarkId::new("box", count), |b| {
            b.iter(|| {
                let boxes: Vec<_> = (0..count)
                    .map(|i| {
                        Box::new(Payload {
                            data: std::ptr::null(),
                            len: i,
                            threshold: 64,
                            result: 0,
                        })
                    })
                    .collect();
                std::hint::black_box(boxes);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_allocation);
criterion_main!(benches);

//! Runs the range-sum workload at increasing sizes and prints one JSON line
//! per configuration on stdout. Progress goes to stderr.
//!
//! Usage: `sum_report [idle-policy] [workers]`

use std::time::Instant;

use serde::Serialize;
use stealframe::workload::parallel_sum;
use stealframe::{IdlePolicy, Pool, PoolConfig};

#[derive(Debug, Serialize)]
struct BenchmarkResult {
    name: String,
    workers: usize,
    idle: IdlePolicy,
    data_points: Vec<DataPoint>,
    system_info: SystemInfo,
    failed: bool,
    failure: Option<String>,
}

#[derive(Debug, Serialize)]
struct DataPoint {
    elements: usize,
    threshold: usize,
    time_ms: f64,
}

#[derive(Debug, Serialize)]
struct SystemInfo {
    cpu_cores: usize,
}

impl SystemInfo {
    fn collect() -> Self {
        SystemInfo {
            cpu_cores: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

const SIZES: [usize; 5] = [1_000, 10_000, 100_000, 1_000_000, 4_000_000];
const THRESHOLDS: [usize; 3] = [64, 1024, 16_384];

fn run(idle: IdlePolicy, workers: usize, threshold: usize) -> BenchmarkResult {
    let mut result = BenchmarkResult {
        name: format!("range_sum/threshold={threshold}"),
        workers,
        idle,
        data_points: Vec::new(),
        system_info: SystemInfo::collect(),
        failed: false,
        failure: None,
    };

    let config = PoolConfig::default()
        .with_workers(workers)
        .with_idle(idle)
        .with_queue_capacity(1 << 14)
        .with_arena_capacity(16 << 20);
    let mut pool = match Pool::new(config) {
        Ok(pool) => pool,
        Err(e) => {
            result.failed = true;
            result.failure = Some(e.to_string());
            return result;
        }
    };

    for elements in SIZES {
        let data: Vec<i64> = (0..elements as i64).collect();
        let expected: i64 = data.iter().sum();

        let start = Instant::now();
        let outcome = parallel_sum(&mut pool, &data, threshold);
        let time_ms = start.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(sum) if sum == expected => {
                eprintln!("  {elements:>9} elements: {time_ms:.3} ms");
                result.data_points.push(DataPoint {
                    elements,
                    threshold,
                    time_ms,
                });
            }
            Ok(sum) => {
                result.failed = true;
                result.failure = Some(format!("sum {sum} != {expected} at {elements} elements"));
                break;
            }
            Err(e) => {
                result.failed = true;
                result.failure = Some(format!("{e} at {elements} elements"));
                break;
            }
        }
    }
    result
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let idle = match args.get(1).map(|s| s.to_lowercase()) {
        None => IdlePolicy::Spin,
        Some(s) => match s.as_str() {
            "spin" => IdlePolicy::Spin,
            "yield" => IdlePolicy::Yield,
            "backoff" => IdlePolicy::Backoff,
            _ => {
                eprintln!("Unknown idle policy: {s}. Using spin.");
                IdlePolicy::Spin
            }
        },
    };
    let workers = args
        .get(2)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or_else(|| SystemInfo::collect().cpu_cores);

    eprintln!("=======================================================");
    eprintln!("           stealframe range-sum report");
    eprintln!("=======================================================");
    eprintln!("\nIdle policy: {idle:?}");
    eprintln!("Workers:     {workers}\n");

    for threshold in THRESHOLDS {
        eprintln!("threshold {threshold}:");
        let result = run(idle, workers, threshold);
        match serde_json::to_string(&result) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing result: {e}"),
        }
    }
}

//! # stealframe - Frame-Oriented Work-Stealing Job Scheduler
//!
//! A fixed pool of workers executes small jobs drawn from per-worker bounded
//! queues. Idle workers steal from busy peers, jobs may spawn more jobs at
//! runtime, and a single shared counter tells the caller when an entire job
//! tree has finished. Job payloads live in per-worker bump arenas that are
//! reclaimed in bulk once the frame is done.
//!
//! ## Architecture
//!
//! - **Arena**: linear allocator, one per worker, reset between frames
//! - **JobCounter**: outstanding-job count, incremented before publication
//! - **Job**: function pointer + payload pointer + counter, copied by value
//! - **JobQueue**: bounded Chase-Lev deque; owner LIFO at the tail, thieves FIFO at the head
//! - **Worker / JobContext**: a queue identity, and the handle a running job
//!   uses to allocate and spawn children on it
//! - **Pool**: seeds jobs, runs every worker to completion, resets the frame
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::atomic::{AtomicI64, Ordering};
//! use stealframe::{JobContext, JobCounter, Pool, PoolConfig};
//!
//! struct Square<'a> {
//!     value: i64,
//!     total: &'a AtomicI64,
//! }
//!
//! fn square(p: &mut Square<'_>, _ctx: &JobContext<'_>) {
//!     p.total.fetch_add(p.value * p.value, Ordering::Relaxed);
//! }
//!
//! let mut pool = Pool::new(PoolConfig::default().with_workers(4)).unwrap();
//! let total = AtomicI64::new(0);
//! let counter = JobCounter::new(0);
//!
//! pool.run_frame(&counter, |seeder| {
//!     for value in 1..=10 {
//!         seeder.spawn(0, square, Square { value, total: &total })?;
//!     }
//!     Ok(())
//! })
//! .unwrap();
//! pool.reset_frame().unwrap();
//!
//! assert_eq!(total.load(Ordering::Relaxed), 385);
//! ```

pub mod allocator;
pub mod config;
pub mod context;
pub mod counter;
pub mod error;
pub mod job;
pub mod metrics;
pub mod pool;
pub mod profile;
pub mod queue;
pub mod worker;
pub mod workload;

pub use allocator::arena::Arena;
pub use config::{IdlePolicy, PinningStrategy, PoolConfig};
pub use context::JobContext;
pub use counter::JobCounter;
pub use error::{Error, Result};
pub use job::{Job, JobFn};
pub use pool::{Pool, RunReport, Seeder};
pub use queue::{JobQueue, Steal};
pub use worker::Worker;

//! Error types for the scheduler.
//!
//! Allocation and queue-capacity errors are reported at the call site and are
//! recoverable by the caller. A counter that never balances is not represented
//! here: it is a programming error and shows up as a hang, not a value.

use thiserror::Error;

/// Errors produced by arenas, queues and the pool.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(
        "arena exhausted: requested {requested} bytes (align {align}), {remaining} of {capacity} bytes remaining"
    )]
    ArenaExhausted {
        requested: usize,
        align: usize,
        remaining: usize,
        capacity: usize,
    },

    #[error("alignment {align} is not a power of two")]
    InvalidAlignment { align: usize },

    #[error("job queue full: capacity {capacity}")]
    QueueOverflow { capacity: usize },

    #[error("worker {id} does not exist (pool has {workers} workers)")]
    InvalidWorker { id: usize, workers: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("frame still in flight: {queued} job(s) queued")]
    FrameInFlight { queued: usize },

    #[error("{count} job(s) panicked")]
    JobPanicked { count: usize },

    #[error("{count} worker thread(s) panicked")]
    WorkerPanicked { count: usize },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = Error::ArenaExhausted {
            requested: 64,
            align: 8,
            remaining: 16,
            capacity: 1024,
        };
        assert_eq!(
            err.to_string(),
            "arena exhausted: requested 64 bytes (align 8), 16 of 1024 bytes remaining"
        );
        assert_eq!(
            Error::QueueOverflow { capacity: 4 }.to_string(),
            "job queue full: capacity 4"
        );
    }
}

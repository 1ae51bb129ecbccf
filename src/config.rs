//! Pool configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Strategy for pinning worker threads to CPU cores.
///
/// Only the threads a pool spawns (workers `1..n`) are pinned. Worker 0 runs
/// on the thread that calls [`Pool::run`](crate::Pool::run), whose affinity
/// is left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PinningStrategy {
    /// No pinning (standard OS scheduling).
    #[default]
    None,
    /// Linear pinning (spawned worker i -> logical processor i).
    Linear,
    /// Spawned worker i -> logical processor 2i, keeping SMT siblings free.
    AvoidSmt,
}

impl PinningStrategy {
    /// Logical core index for `worker_id`, if this strategy pins at all.
    pub fn core_for(&self, worker_id: usize) -> Option<usize> {
        match self {
            PinningStrategy::None => None,
            PinningStrategy::Linear => Some(worker_id),
            PinningStrategy::AvoidSmt => Some(worker_id * 2),
        }
    }
}

/// What a worker does when it found no local or stealable work and the
/// counter has not reached zero yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdlePolicy {
    /// Busy-wait with a spin-loop hint.
    #[default]
    Spin,
    /// Yield the OS thread on every idle iteration.
    Yield,
    /// Exponential backoff: spin first, then yield.
    Backoff,
}

/// Configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of workers, including the thread that calls `run`.
    pub workers: usize,
    /// Slots per worker queue (rounded up to a power of two).
    pub queue_capacity: usize,
    /// Bytes per worker arena.
    pub arena_capacity: usize,
    pub idle: IdlePolicy,
    pub pinning: PinningStrategy,
    /// Record a Chrome-trace span for every executed job.
    pub trace_jobs: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            workers,
            queue_capacity: 4096,
            arena_capacity: 1024 * 1024,
            idle: IdlePolicy::default(),
            pinning: PinningStrategy::default(),
            trace_jobs: false,
        }
    }
}

impl PoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    pub fn with_arena_capacity(mut self, arena_capacity: usize) -> Self {
        self.arena_capacity = arena_capacity;
        self
    }

    pub fn with_idle(mut self, idle: IdlePolicy) -> Self {
        self.idle = idle;
        self
    }

    pub fn with_pinning(mut self, pinning: PinningStrategy) -> Self {
        self.pinning = pinning;
        self
    }

    pub fn with_trace_jobs(mut self, trace_jobs: bool) -> Self {
        self.trace_jobs = trace_jobs;
        self
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "queue_capacity must be at least 1".into(),
            ));
        }
        if self.queue_capacity > isize::MAX as usize / 2 {
            return Err(Error::InvalidConfig(format!(
                "queue_capacity {} is too large",
                self.queue_capacity
            )));
        }
        if self.arena_capacity == 0 {
            return Err(Error::InvalidConfig(
                "arena_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PoolConfig::default();
        assert!(config.workers >= 1);
        assert_eq!(config.idle, IdlePolicy::Spin);
        assert_eq!(config.pinning, PinningStrategy::None);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let config = PoolConfig::default().with_workers(0);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = PoolConfig::default().with_queue_capacity(0);
        assert!(config.validate().is_err());

        let config = PoolConfig::default().with_arena_capacity(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_json() {
        let config = PoolConfig::from_json(
            r#"{ "workers": 3, "arena_capacity": 2048, "idle": "backoff", "pinning": "avoid-smt" }"#,
        )
        .unwrap();
        assert_eq!(config.workers, 3);
        assert_eq!(config.arena_capacity, 2048);
        assert_eq!(config.queue_capacity, 4096);
        assert_eq!(config.idle, IdlePolicy::Backoff);
        assert_eq!(config.pinning, PinningStrategy::AvoidSmt);

        assert!(PoolConfig::from_json(r#"{ "workers": 0 }"#).is_err());
        assert!(PoolConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_pinning_cores() {
        assert_eq!(PinningStrategy::None.core_for(3), None);
        assert_eq!(PinningStrategy::Linear.core_for(3), Some(3));
        assert_eq!(PinningStrategy::AvoidSmt.core_for(3), Some(6));
    }
}

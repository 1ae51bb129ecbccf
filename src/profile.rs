//! Chrome Tracing collector for job spans.
//!
//! Workers record spans into thread-local buffers with no contention. Each
//! worker flushes its buffer into a global list when it leaves the scheduler
//! loop; the list can then be exported to a JSON file loadable in
//! chrome://tracing or ui.perfetto.dev.

use std::cell::RefCell;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

/// A single completed span ("ph": "X" in Chrome Tracing terms).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub name: &'static str,
    pub tid: usize,
    pub start_us: u64,
    pub duration_us: u64,
}

#[derive(Serialize)]
struct ChromeEvent<'a> {
    name: &'a str,
    ph: &'static str,
    ts: u64,
    dur: u64,
    pid: u32,
    tid: usize,
}

thread_local! {
    static TRACE_BUFFER: RefCell<Vec<TraceEvent>> = RefCell::new(Vec::with_capacity(1024));
}

lazy_static::lazy_static! {
    static ref GLOBAL_START: Instant = Instant::now();
    static ref ALL_BUFFERS: Mutex<Vec<Vec<TraceEvent>>> = Mutex::new(Vec::new());
}

fn all_buffers() -> MutexGuard<'static, Vec<Vec<TraceEvent>>> {
    // A panic while holding the lock cannot leave the list half-written.
    ALL_BUFFERS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Records a span of work on the current thread.
pub fn record_event(name: &'static str, tid: usize, start: Instant, duration: Duration) {
    let start_us = start.saturating_duration_since(*GLOBAL_START).as_micros() as u64;
    let duration_us = duration.as_micros() as u64;

    TRACE_BUFFER.with(|buf| {
        buf.borrow_mut().push(TraceEvent {
            name,
            tid,
            start_us,
            duration_us,
        });
    });
}

/// Moves the current thread's buffer into the global list.
pub fn collect_local_trace() {
    TRACE_BUFFER.with(|buf| {
        let mut local = buf.borrow_mut();
        if !local.is_empty() {
            all_buffers().push(std::mem::take(&mut *local));
        }
    });
}

/// Drains every collected event.
pub fn take_events() -> Vec<TraceEvent> {
    all_buffers().drain(..).flatten().collect()
}

/// Writes all collected events as a Chrome Tracing JSON array and clears them.
pub fn export<W: Write>(writer: W) -> std::io::Result<()> {
    let events = take_events();
    let chrome: Vec<_> = events
        .iter()
        .map(|event| ChromeEvent {
            name: event.name,
            ph: "X",
            ts: event.start_us,
            dur: event.duration_us,
            pid: 1,
            tid: event.tid,
        })
        .collect();

    serde_json::to_writer(writer, &chrome)?;
    Ok(())
}

/// Exports all collected trace events to a JSON file.
pub fn export_to_file(path: impl AsRef<Path>) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    export(&mut writer)?;
    writer.flush()
}

/// RAII span: records from construction to drop.
pub struct TraceGuard {
    name: &'static str,
    tid: usize,
    start: Instant,
}

impl TraceGuard {
    pub fn new(name: &'static str, tid: usize) -> Self {
        Self {
            name,
            tid,
            start: Instant::now(),
        }
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        record_event(self.name, self.tid, self.start, self.start.elapsed());
    }
}

/// RAII guard that flushes the local buffer when dropped.
pub struct CollectorGuard;

impl Drop for CollectorGuard {
    fn drop(&mut self) {
        collect_local_trace();
    }
}

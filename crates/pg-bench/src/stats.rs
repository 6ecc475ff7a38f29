//! Benchmark counters and the final report.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

/// Shared counters, incremented by every benchmark task.
#[derive(Debug, Default)]
pub struct Stats {
    requests: AtomicU64,
    rows: AtomicU64,
    errors: AtomicU64,
}

impl Stats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful request that produced `rows` rows.
    pub fn step(&self, rows: usize) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.rows.fetch_add(rows as u64, Ordering::Relaxed);
    }

    /// Record one failed request.
    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters into a report.
    pub fn report(&self, meta: ReportMeta, elapsed: Duration) -> Report {
        let requests = self.requests.load(Ordering::Relaxed);
        let rows = self.rows.load(Ordering::Relaxed);
        let secs = elapsed.as_secs_f64();
        Report {
            scenario: meta.scenario,
            query: meta.query,
            duration_secs: secs,
            requests,
            rows,
            errors: self.errors.load(Ordering::Relaxed),
            requests_per_second: if secs > 0.0 { requests as f64 / secs } else { 0.0 },
            rows_per_second: if secs > 0.0 { rows as f64 / secs } else { 0.0 },
            coroutines: meta.coroutines,
            threads: meta.threads,
            connections: meta.connections,
            queue_capacity: meta.queue_capacity,
        }
    }
}

/// Run parameters echoed into the report.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub scenario: String,
    pub query: String,
    pub coroutines: u32,
    pub threads: u32,
    pub connections: u32,
    pub queue_capacity: u32,
}

/// The final benchmark report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub scenario: String,
    pub query: String,
    pub duration_secs: f64,
    pub requests: u64,
    pub rows: u64,
    pub errors: u64,
    pub requests_per_second: f64,
    pub rows_per_second: f64,
    pub coroutines: u32,
    pub threads: u32,
    pub connections: u32,
    pub queue_capacity: u32,
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "scenario:    {}", self.scenario)?;
        writeln!(f, "query:       {}", self.query)?;
        writeln!(
            f,
            "tasks:       {} coroutines x {} threads, {} connections, queue {}",
            self.coroutines, self.threads, self.connections, self.queue_capacity
        )?;
        writeln!(f, "duration:    {:.1}s", self.duration_secs)?;
        writeln!(f, "requests:    {} ({:.0}/s)", self.requests, self.requests_per_second)?;
        writeln!(f, "rows:        {} ({:.0}/s)", self.rows, self.rows_per_second)?;
        write!(f, "errors:      {}", self.errors)
    }
}

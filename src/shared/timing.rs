//! Timing utilities for pipeline measurements.
//!
//! Tracks the wall time spent in each stage of a proxied request.

use crate::proxy::types::TimingInfo;
use std::time::Instant;

/// Start and end instants of each pipeline stage:
/// - cache lookup
/// - upstream fetch (all strategy attempts together)
/// - cache write
#[derive(Debug)]
pub struct PipelineTiming {
    pub cache_lookup_start: Option<Instant>,
    pub cache_lookup_end: Option<Instant>,
    pub fetch_start: Option<Instant>,
    pub fetch_end: Option<Instant>,
    pub cache_write_start: Option<Instant>,
    pub cache_write_end: Option<Instant>,
    pub total_start: Instant,
}

impl PipelineTiming {
    pub fn new() -> Self {
        Self {
            cache_lookup_start: None,
            cache_lookup_end: None,
            fetch_start: None,
            fetch_end: None,
            cache_write_start: None,
            cache_write_end: None,
            total_start: Instant::now(),
        }
    }

    /// Snapshot for the diagnostics payload. `total` runs up to now.
    pub fn to_timing_info(&self) -> TimingInfo {
        TimingInfo {
            total: elapsed_ms(self.total_start, Instant::now()),
            cache_lookup: span(self.cache_lookup_start, self.cache_lookup_end),
            fetch: span(self.fetch_start, self.fetch_end),
            cache_write: span(self.cache_write_start, self.cache_write_end),
        }
    }

    pub fn start_cache_lookup(&mut self) {
        self.cache_lookup_start = Some(Instant::now());
    }

    pub fn end_cache_lookup(&mut self) {
        self.cache_lookup_end = Some(Instant::now());
    }

    pub fn start_fetch(&mut self) {
        self.fetch_start = Some(Instant::now());
    }

    pub fn end_fetch(&mut self) {
        self.fetch_end = Some(Instant::now());
    }

    pub fn start_cache_write(&mut self) {
        self.cache_write_start = Some(Instant::now());
    }

    pub fn end_cache_write(&mut self) {
        self.cache_write_end = Some(Instant::now());
    }
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self::new()
    }
}

pub fn elapsed_ms(start: Instant, end: Instant) -> u64 {
    end.duration_since(start).as_millis() as u64
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Option<u64> {
    match (start, end) {
        (Some(s), Some(e)) => Some(elapsed_ms(s, e)),
        _ => None,
    }
}

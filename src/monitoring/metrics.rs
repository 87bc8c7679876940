use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};

const ROLLING_WINDOW: usize = 1000;

/// Processing metrics the coordinator exposes (spec §4.6). Mutated only
/// by the coordinator's own thread/task, per the shared-resource policy
/// in spec §5 — no internal locking.
#[derive(Debug, Default)]
pub struct Metrics {
    processed_count: u64,
    error_count: u64,
    processing_times: VecDeque<Duration>,
    last_processed_time: Option<DateTime<Utc>>,
    buffer_size: usize,
    running: bool,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_processed(&mut self, processing_time: Duration, at: DateTime<Utc>) {
        self.processed_count += 1;
        self.last_processed_time = Some(at);
        self.processing_times.push_back(processing_time);
        if self.processing_times.len() > ROLLING_WINDOW {
            self.processing_times.pop_front();
        }
    }

    pub fn record_error(&mut self) {
        self.error_count += 1;
    }

    pub fn set_buffer_size(&mut self, size: usize) {
        self.buffer_size = size;
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn processed_count(&self) -> u64 {
        self.processed_count
    }

    pub fn error_count(&self) -> u64 {
        self.error_count
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn last_processed_time(&self) -> Option<DateTime<Utc>> {
        self.last_processed_time
    }

    /// Average of the last 1000 recorded processing times.
    pub fn average_processing_time(&self) -> Duration {
        if self.processing_times.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.processing_times.iter().sum();
        total / self.processing_times.len() as u32
    }
}

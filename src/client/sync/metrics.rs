//! # Sync Metrics
//!
//! Counters and timings for flush cycles and signature pushes.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    pub total_flushes: u64,
    pub successful_flushes: u64,
    pub failed_flushes: u64,
    /// Flushes skipped while offline, signed out or without a backend
    pub skipped_flushes: u64,
    pub average_flush_duration: Duration,
    pub last_flush_duration: Option<Duration>,
    pub signature_pushes: u64,
    pub signature_failures: u64,
    pub images_uploaded: u64,
    last_flush_start: Option<Instant>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_flush_start(&mut self) {
        self.last_flush_start = Some(Instant::now());
        self.total_flushes += 1;
    }

    pub fn record_flush_success(&mut self) {
        if let Some(start) = self.last_flush_start.take() {
            let duration = start.elapsed();
            self.last_flush_duration = Some(duration);
            self.successful_flushes += 1;

            // Rolling average over successful flushes
            let total = self.average_flush_duration * (self.successful_flushes - 1) as u32 + duration;
            self.average_flush_duration = total / self.successful_flushes as u32;
        }
    }

    pub fn record_flush_failure(&mut self) {
        if let Some(start) = self.last_flush_start.take() {
            self.last_flush_duration = Some(start.elapsed());
        }
        self.failed_flushes += 1;
    }

    pub fn record_flush_skipped(&mut self) {
        self.skipped_flushes += 1;
    }

    pub fn record_signature_push(&mut self, succeeded: bool) {
        self.signature_pushes += 1;
        if !succeeded {
            self.signature_failures += 1;
        }
    }

    pub fn record_image_upload(&mut self) {
        self.images_uploaded += 1;
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_flushes == 0 {
            0.0
        } else {
            self.successful_flushes as f64 / self.total_flushes as f64
        }
    }
}

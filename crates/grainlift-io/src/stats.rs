//! Per-run counters and summary figures.

use std::time::{Duration, SystemTime};

use grainlift_pipeline::diagnostics::duration_serde;
use serde::{Deserialize, Serialize};

use crate::enhancer::ItemStatus;

/// Aggregated outcome of one batch run.
///
/// Byte totals only include processed items, so averages and the size
/// ratio compare like with like.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Images discovered.
    pub total: usize,
    pub processed: usize,
    /// Items whose source could not be decoded.
    pub skipped: usize,
    /// Items that failed after decoding.
    pub errors: usize,
    pub cancelled: usize,
    pub original_bytes: u64,
    pub output_bytes: u64,
    pub started_at: SystemTime,
    pub finished_at: Option<SystemTime>,
    #[serde(with = "duration_serde")]
    pub elapsed: Duration,
}

impl RunStatistics {
    /// Fresh counters for a run over `total` images.
    #[must_use]
    pub fn start(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            skipped: 0,
            errors: 0,
            cancelled: 0,
            original_bytes: 0,
            output_bytes: 0,
            started_at: SystemTime::now(),
            finished_at: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Count one item. Sizes are ignored unless it was processed.
    pub const fn record(&mut self, status: ItemStatus, original_bytes: u64, output_bytes: u64) {
        match status {
            ItemStatus::Processed => {
                self.processed += 1;
                self.original_bytes += original_bytes;
                self.output_bytes += output_bytes;
            }
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed => self.errors += 1,
            ItemStatus::Cancelled => self.cancelled += 1,
        }
    }

    pub fn finish(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
        self.finished_at = Some(SystemTime::now());
    }

    /// Items counted so far, whatever their status.
    #[must_use]
    pub const fn accounted(&self) -> usize {
        self.processed + self.skipped + self.errors + self.cancelled
    }

    /// Mean source size of processed images, `None` if none were.
    #[must_use]
    pub fn average_original_bytes(&self) -> Option<f64> {
        self.mean(self.original_bytes)
    }

    #[must_use]
    pub fn average_output_bytes(&self) -> Option<f64> {
        self.mean(self.output_bytes)
    }

    /// Output over input size for processed images.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn size_ratio(&self) -> Option<f64> {
        (self.processed > 0 && self.original_bytes > 0)
            .then(|| self.output_bytes as f64 / self.original_bytes as f64)
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self, bytes: u64) -> Option<f64> {
        (self.processed > 0).then(|| bytes as f64 / self.processed as f64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn only_processed_items_contribute_sizes() {
        let mut stats = RunStatistics::start(4);
        stats.record(ItemStatus::Processed, 1000, 3000);
        stats.record(ItemStatus::Processed, 3000, 5000);
        stats.record(ItemStatus::Skipped, 999, 0);
        stats.record(ItemStatus::Failed, 777, 0);

        assert_eq!(stats.accounted(), 4);
        assert_eq!((stats.processed, stats.skipped, stats.errors), (2, 1, 1));
        assert_eq!(stats.original_bytes, 4000);
        assert!((stats.average_original_bytes().unwrap() - 2000.0).abs() < 1e-9);
        assert!((stats.average_output_bytes().unwrap() - 4000.0).abs() < 1e-9);
        assert!((stats.size_ratio().unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_processed_has_no_averages() {
        let mut stats = RunStatistics::start(2);
        stats.record(ItemStatus::Skipped, 10, 0);
        stats.record(ItemStatus::Cancelled, 0, 0);
        assert_eq!(stats.average_original_bytes(), None);
        assert_eq!(stats.average_output_bytes(), None);
        assert_eq!(stats.size_ratio(), None);
        assert_eq!(stats.cancelled, 1);
    }

    #[test]
    fn finish_records_elapsed() {
        let mut stats = RunStatistics::start(0);
        assert!(stats.finished_at.is_none());
        stats.finish(Duration::from_secs(75));
        assert_eq!(stats.elapsed, Duration::from_secs(75));
        assert!(stats.finished_at.unwrap() >= stats.started_at);
    }

    #[test]
    fn serializes_elapsed_as_seconds() {
        let mut stats = RunStatistics::start(1);
        stats.finish(Duration::from_millis(1500));
        let json = serde_json::to_value(&stats).unwrap();
        let secs = json["elapsed"].as_f64().unwrap();
        assert!((secs - 1.5).abs() < 1e-9, "{secs}");
    }
}

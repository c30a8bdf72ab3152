//! Concurrent batch driver.
//!
//! Work items are spread over a dedicated rayon pool. Each worker sends
//! an [`ItemReport`] back over a channel; the calling thread is the only
//! one that touches [`RunStatistics`] and the [`BatchObserver`], so
//! neither needs to be `Sync`.

use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use grainlift_pipeline::{EnhanceDiagnostics, EnhancementConfig, StageGates};
use serde::{Deserialize, Serialize};

use crate::discover::{self, Layout, WorkItem};
use crate::enhancer::{ConservativeEnhancer, ItemStatus};
use crate::error::BatchError;
use crate::stats::RunStatistics;

/// Shared flag that stops a run from starting new items.
///
/// Items already being enhanced finish normally; the rest are reported
/// as [`ItemStatus::Cancelled`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// How a run is executed.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker threads; `None` uses the available parallelism.
    pub workers: Option<NonZeroUsize>,
    pub layout: Layout,
    pub cancel: CancelToken,
}

/// Items finished out of the total discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// Completion as a percentage in `0.0..=100.0`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Outcome of one work item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub status: ItemStatus,
    /// `"success"` or the error text.
    pub message: String,
    /// Source file size; zero if it could not be read.
    pub original_bytes: u64,
    /// Bytes written; zero unless processed.
    pub output_bytes: u64,
    pub gates: Option<StageGates>,
    pub diagnostics: Option<EnhanceDiagnostics>,
    #[serde(with = "grainlift_pipeline::diagnostics::duration_serde")]
    pub duration: Duration,
}

/// Receives run events on the thread that called [`BatchDriver::run`].
pub trait BatchObserver {
    fn on_start(&mut self, _total: usize) {}

    fn on_item(&mut self, _report: &ItemReport, _progress: Progress) {}

    fn on_no_images(&mut self, _source: &Path) {}
}

impl BatchObserver for () {}

/// What a run ended with.
#[derive(Debug, Clone)]
pub enum RunReport {
    /// The source held no supported images; nothing was written.
    NoImagesFound,
    Completed(RunStatistics),
}

/// Enhances every image under a directory.
#[derive(Debug, Clone)]
pub struct BatchDriver {
    enhancer: Arc<ConservativeEnhancer>,
    options: RunOptions,
}

impl BatchDriver {
    /// # Errors
    ///
    /// Returns [`BatchError::InvalidConfig`] if `config` fails validation.
    pub fn new(config: EnhancementConfig, options: RunOptions) -> Result<Self, BatchError> {
        Ok(Self {
            enhancer: Arc::new(ConservativeEnhancer::new(config)?),
            options,
        })
    }

    #[must_use]
    pub fn config(&self) -> &EnhancementConfig {
        self.enhancer.config()
    }

    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Enhance every supported image under `source` into `destination`.
    ///
    /// Per-item failures are counted, never returned. An item lost to a
    /// worker that died without reporting is counted as an error.
    ///
    /// # Errors
    ///
    /// [`BatchError::Discovery`] if `source` cannot be listed and
    /// [`BatchError::ThreadPool`] if the worker pool cannot start.
    pub fn run<O: BatchObserver + ?Sized>(
        &self,
        source: &Path,
        destination: &Path,
        observer: &mut O,
    ) -> Result<RunReport, BatchError> {
        let items = discover::discover(source, destination, self.options.layout)?;
        if items.is_empty() {
            tracing::info!(source = %source.display(), "no images found");
            observer.on_no_images(source);
            return Ok(RunReport::NoImagesFound);
        }

        let total = items.len();
        let workers = self.worker_count();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("grainlift-worker-{i}"))
            .panic_handler(|_| tracing::error!("worker panicked outside an item"))
            .build()?;
        tracing::info!(total, workers, destination = %destination.display(), "starting run");

        let start = Instant::now();
        let mut stats = RunStatistics::start(total);
        observer.on_start(total);

        let (tx, rx) = mpsc::channel();
        for item in items {
            let tx = tx.clone();
            let enhancer = Arc::clone(&self.enhancer);
            let cancel = self.options.cancel.clone();
            pool.spawn(move || {
                let report = process(&enhancer, item, &cancel);
                // The receiver only goes away if the caller stopped listening.
                let _ = tx.send(report);
            });
        }
        drop(tx);

        for report in rx {
            stats.record(report.status, report.original_bytes, report.output_bytes);
            let progress = Progress {
                completed: stats.accounted(),
                total,
            };
            observer.on_item(&report, progress);
        }

        let missing = total.saturating_sub(stats.accounted());
        if missing > 0 {
            tracing::error!(missing, "items never reported back");
            stats.errors += missing;
        }

        stats.finish(start.elapsed());
        tracing::info!(
            processed = stats.processed,
            skipped = stats.skipped,
            errors = stats.errors,
            cancelled = stats.cancelled,
            elapsed = ?stats.elapsed,
            "run finished",
        );
        Ok(RunReport::Completed(stats))
    }

    fn worker_count(&self) -> usize {
        self.options
            .workers
            .or_else(|| std::thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get)
    }
}

fn process(enhancer: &ConservativeEnhancer, item: WorkItem, cancel: &CancelToken) -> ItemReport {
    let WorkItem {
        source,
        destination,
    } = item;
    let start = Instant::now();

    let mut report = ItemReport {
        original_bytes: 0,
        output_bytes: 0,
        status: ItemStatus::Cancelled,
        message: "cancelled".to_string(),
        gates: None,
        diagnostics: None,
        duration: Duration::ZERO,
        source,
        destination,
    };
    if cancel.is_cancelled() {
        return report;
    }

    report.original_bytes = fs::metadata(&report.source).map_or_else(
        |e| {
            tracing::warn!(source = %report.source.display(), error = %e, "cannot read source size");
            0
        },
        |m| m.len(),
    );

    match enhancer.enhance(&report.source, &report.destination) {
        Ok(file) => {
            report.status = ItemStatus::Processed;
            report.message = String::from("success");
            report.output_bytes = file.output_bytes;
            report.gates = Some(file.gates);
            report.diagnostics = Some(file.diagnostics);
        }
        Err(e) => {
            report.status = e.status();
            report.message = e.to_string();
            tracing::warn!(source = %report.source.display(), status = %report.status, error = %e, "item not processed");
        }
    }
    report.duration = start.elapsed();
    report
}

//! grainlift-io: file-level work around `grainlift-pipeline`.
//!
//! Decodes source images, runs them through the enhancement pipeline,
//! writes the results atomically and drives whole directories through
//! a worker pool while collecting run statistics.

pub mod batch;
pub mod codec;
pub mod discover;
pub mod enhancer;
pub mod error;
pub mod stats;

pub use batch::{
    BatchDriver, BatchObserver, CancelToken, ItemReport, Progress, RunOptions, RunReport,
};
pub use codec::OutputFormat;
pub use discover::{Layout, WorkItem, discover};
pub use enhancer::{ConservativeEnhancer, EnhancedFile, ItemOutcome, ItemStatus};
pub use error::{BatchError, CodecError, EnhanceError};
pub use stats::RunStatistics;

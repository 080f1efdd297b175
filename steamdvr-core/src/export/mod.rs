//! Export batches: scheduling, progress reporting, and final accounting.

pub mod report;
pub mod scheduler;

use std::path::PathBuf;

pub use report::Summary;
pub use scheduler::{ExportHandle, ExportScheduler};

use crate::encoder::EncodingMode;
use crate::reconstruct::{JobResult, Phase};

/// Errors starting or awaiting an export batch.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Export batch terminated before producing a summary")]
    Aborted,
}

/// Per-batch settings supplied by the caller.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub mode: EncodingMode,
    pub concurrency: usize,
    pub output_dir: PathBuf,
    pub delete_sources: bool,
}

/// Identifies one job within a batch across progress events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTag {
    /// Position in submission order, stable for the batch lifetime.
    pub index: usize,
    pub display_name: String,
}

/// Snapshot of batch progress attached to job lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchCounts {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
}

/// Progress stream emitted by a running batch.
///
/// Events for one job arrive in lifecycle order, but events from different
/// jobs interleave freely.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    BatchStarted {
        total: usize,
        /// The mode actually in effect after availability fallback.
        mode: EncodingMode,
    },
    Warning {
        message: String,
    },
    JobStarted {
        job: JobTag,
        counts: BatchCounts,
    },
    JobPhase {
        job: JobTag,
        phase: Phase,
        counts: BatchCounts,
    },
    JobFinished {
        job: JobTag,
        result: JobResult,
        counts: BatchCounts,
    },
    BatchFinished {
        summary: Summary,
    },
}

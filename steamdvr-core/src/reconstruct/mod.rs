//! Segment reconstruction: from raw m4s pieces to a playable MP4.
//!
//! The reconstructor byte-concatenates each stream's init segment and data
//! chunks into transient combined files, then drives FFmpeg once to remux
//! (or re-encode) them into the final container. The [`Ffmpeg`] trait is the
//! subprocess seam; [`SimulationFfmpeg`] stands in for it under test.

pub mod ffmpeg;
pub mod reconstructor;

use std::path::PathBuf;

pub use ffmpeg::{Ffmpeg, ProductionFfmpeg};
#[cfg(any(test, feature = "test-utils"))]
pub use ffmpeg::SimulationFfmpeg;
pub use reconstructor::SegmentReconstructor;

/// Reconstruction phases, reported in order for each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Validating the job layout and locating segment files
    Extracting,
    /// Byte-concatenating init segments and chunks into combined streams
    Concatenating,
    /// Remuxing or re-encoding the combined streams into MP4
    Encoding,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Extracting => write!(f, "extracting"),
            Phase::Concatenating => write!(f, "concatenating"),
            Phase::Encoding => write!(f, "encoding"),
        }
    }
}

/// Why a job failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailReason {
    /// Required segment files missing; rejected before any subprocess ran
    InvalidLayout(String),
    /// The mux/encode step failed; carries captured diagnostics
    EncodeError(String),
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailReason::InvalidLayout(reason) => write!(f, "invalid layout: {reason}"),
            FailReason::EncodeError(details) => write!(f, "encode error: {details}"),
        }
    }
}

/// Outcome of one reconstruction. Immutable once produced.
#[derive(Debug, Clone)]
pub enum JobResult {
    Success {
        output_path: PathBuf,
        output_size_bytes: u64,
    },
    Failed {
        reason: FailReason,
    },
    Cancelled,
}

impl JobResult {
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Success { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, JobResult::Cancelled)
    }
}

/// Errors inside the reconstruction pipeline.
///
/// These stay internal to a worker: the scheduler only ever sees them folded
/// into a [`JobResult`].
#[derive(Debug, thiserror::Error)]
pub enum ReconstructError {
    #[error("FFmpeg failed: {details}")]
    EncodeError { details: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cancelled")]
    Cancelled,
}

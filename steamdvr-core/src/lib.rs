//! SteamDVR Core - Clip reconstruction and export pipeline
//!
//! This crate provides the building blocks for exporting Steam's m4s-chunked
//! game recordings to standard MP4 files: clip discovery, hardware encoder
//! detection, segment reconstruction, and the concurrent export scheduler.

pub mod config;
pub mod encoder;
pub mod export;
pub mod library;
pub mod reconstruct;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SteamDvrConfig;
pub use encoder::{EncoderError, EncodingMode};
pub use export::{ExportError, ExportHandle, ExportScheduler, Summary};
pub use library::{ClipJob, ClipLocator, LibraryError};
pub use reconstruct::{JobResult, ReconstructError, SegmentReconstructor};

/// Core errors that can bubble up from any SteamDVR subsystem.
///
/// High-level error types representing failures in core functionality.
#[derive(Debug, thiserror::Error)]
pub enum SteamDvrError {
    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SteamDvrError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            SteamDvrError::Library(e) => match e {
                LibraryError::RootNotFound { path } => {
                    format!("Recordings directory not found: {}", path.display())
                }
                LibraryError::InvalidLayout { path, reason } => {
                    format!("Clip {} has an invalid layout: {reason}", path.display())
                }
                _ => "Clip library error occurred".to_string(),
            },
            SteamDvrError::Encoder(EncoderError::FfmpegMissing { .. }) => {
                "FFmpeg was not found. Install ffmpeg and make sure it is on PATH.".to_string()
            }
            SteamDvrError::Encoder(_) => "Encoder detection error occurred".to_string(),
            SteamDvrError::Export(e) => format!("Export failed: {e}"),
            SteamDvrError::Configuration { reason } => format!("Configuration error: {reason}"),
            SteamDvrError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SteamDvrError::Configuration { .. }
                | SteamDvrError::Library(LibraryError::RootNotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, SteamDvrError>;

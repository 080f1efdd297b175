//! Clip library: discovery of Steam game recordings on disk.
//!
//! Steam stores each recording as a directory of fragmented MP4 pieces: one
//! init segment plus numbered data chunks per stream, described by a
//! `session.mpd` manifest. This module walks recordings roots and turns
//! every playable recording into an immutable [`ClipJob`] ready for export.

pub mod clip;
pub mod locator;
pub mod names;

use std::path::PathBuf;

pub use clip::{ClipJob, ClipKind};
pub use locator::{ClipLocator, ScanOutcome};
pub use names::AppNames;

/// Errors from clip discovery and job construction.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("Recordings root not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("Invalid clip layout at {path}: {reason}")]
    InvalidLayout { path: PathBuf, reason: String },

    #[error("Failed to read app names file {path}: {reason}")]
    NamesFile { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

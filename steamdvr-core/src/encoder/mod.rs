//! Hardware encoder capability detection and encoding mode selection.
//!
//! One [`EncodingMode`] is chosen per export batch; the probe inspects the
//! FFmpeg toolchain once at startup to learn which hardware encoders the
//! host can actually use.

pub mod mode;
pub mod probe;

pub use mode::EncodingMode;
pub use probe::{CachedProbe, detect_modes, parse_encoder_listing, verify_installation};

/// Errors from encoder detection and toolchain verification.
#[derive(Debug, thiserror::Error)]
pub enum EncoderError {
    #[error("FFmpeg binary not found: {binary}")]
    FfmpegMissing { binary: String },

    #[error("FFmpeg returned an error during probing: {reason}")]
    ProbeFailed { reason: String },
}

//! Centralized configuration for SteamDVR.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::path::PathBuf;
use std::time::Duration;

use crate::encoder::EncodingMode;

/// Lowest concurrency the export scheduler accepts.
pub const MIN_CONCURRENCY: usize = 1;

/// Highest concurrency the export scheduler accepts.
pub const MAX_CONCURRENCY: usize = 16;

/// Central configuration for all SteamDVR components.
///
/// Groups related configuration settings into logical sections.
#[derive(Debug, Clone, Default)]
pub struct SteamDvrConfig {
    pub library: LibraryConfig,
    pub export: ExportConfig,
    pub ffmpeg: FfmpegConfig,
}

/// Clip library discovery configuration.
///
/// Controls where recordings are searched for and how application ids
/// are mapped to display names.
#[derive(Debug, Clone, Default)]
pub struct LibraryConfig {
    /// Recordings roots to scan (userdata directories or clip directories)
    pub recordings_roots: Vec<PathBuf>,
    /// Optional JSON file mapping application ids to display names
    pub app_names_file: Option<PathBuf>,
}

/// Export batch configuration.
///
/// Controls scheduler defaults and transient-file placement.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Encoding mode used when none is requested explicitly
    pub default_mode: EncodingMode,
    /// Worker count used when none is requested explicitly
    pub default_concurrency: usize,
    /// Directory for transient combined-stream files (None = system temp)
    pub temp_dir: Option<PathBuf>,
    /// Delete clip source directories after successful export
    pub delete_sources: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            default_mode: EncodingMode::FastCopy,
            default_concurrency: num_cpus::get().clamp(MIN_CONCURRENCY, MAX_CONCURRENCY),
            temp_dir: None,
            delete_sources: false,
        }
    }
}

/// FFmpeg toolchain configuration.
///
/// Controls the binary location and per-operation time limits.
#[derive(Debug, Clone)]
pub struct FfmpegConfig {
    /// FFmpeg binary name or path
    pub binary: String,
    /// Maximum time for one remux/encode invocation
    pub mux_timeout: Duration,
    /// Maximum time for capability probing
    pub probe_timeout: Duration,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            binary: "ffmpeg".to_string(),
            mux_timeout: Duration::from_secs(1800), // 30 minutes per clip
            probe_timeout: Duration::from_secs(15),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_stays_within_bounds() {
        let config = ExportConfig::default();
        assert!(config.default_concurrency >= MIN_CONCURRENCY);
        assert!(config.default_concurrency <= MAX_CONCURRENCY);
    }

    #[test]
    fn default_mode_needs_no_encoder() {
        let config = SteamDvrConfig::default();
        assert_eq!(config.export.default_mode, EncodingMode::FastCopy);
        assert!(!config.export.delete_sources);
    }
}

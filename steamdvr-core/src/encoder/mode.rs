//! Export encoding modes and their FFmpeg parameter tables.

use std::fmt;
use std::str::FromStr;

/// How a batch of clips is converted to MP4.
///
/// `FastCopy` remuxes the streams without decoding; every other mode decodes
/// and re-encodes video to HEVC on the named encoder while audio is passed
/// through unchanged. Selected once per batch and applied to every job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum EncodingMode {
    /// Container remux only, no quality loss, output ≈ sum of inputs
    FastCopy,
    /// HEVC re-encode on NVIDIA NVENC
    NvencHevc,
    /// HEVC re-encode on AMD AMF
    AmfHevc,
    /// HEVC re-encode on Intel Quick Sync
    QuickSyncHevc,
    /// HEVC re-encode in software (libx265)
    CpuHevc,
}

impl EncodingMode {
    /// All modes, in probe/display order.
    pub const ALL: [EncodingMode; 5] = [
        EncodingMode::FastCopy,
        EncodingMode::NvencHevc,
        EncodingMode::AmfHevc,
        EncodingMode::QuickSyncHevc,
        EncodingMode::CpuHevc,
    ];

    /// Whether this mode copies streams instead of re-encoding.
    pub fn is_copy(&self) -> bool {
        matches!(self, EncodingMode::FastCopy)
    }

    /// FFmpeg encoder name for the video stream, None for stream copy.
    pub fn ffmpeg_video_codec(&self) -> Option<&'static str> {
        match self {
            EncodingMode::FastCopy => None,
            EncodingMode::NvencHevc => Some("hevc_nvenc"),
            EncodingMode::AmfHevc => Some("hevc_amf"),
            EncodingMode::QuickSyncHevc => Some("hevc_qsv"),
            EncodingMode::CpuHevc => Some("libx265"),
        }
    }

    /// Video codec arguments for the final mux/encode invocation.
    ///
    /// Re-encoding modes use constant-quality HEVC tuned for visually
    /// lossless output at a smaller size, with a bounded maximum bitrate.
    /// Audio is always copied.
    pub fn video_args(&self) -> Vec<&'static str> {
        match self {
            EncodingMode::FastCopy => vec!["-c:v", "copy"],
            EncodingMode::NvencHevc => vec![
                "-c:v", "hevc_nvenc", "-preset", "p5", "-rc", "vbr", "-cq", "23", "-maxrate",
                "50M", "-bufsize", "100M",
            ],
            EncodingMode::AmfHevc => vec![
                "-c:v", "hevc_amf", "-quality", "quality", "-rc", "cqp", "-qp_i", "23", "-qp_p",
                "23",
            ],
            EncodingMode::QuickSyncHevc => vec![
                "-c:v",
                "hevc_qsv",
                "-preset",
                "slower",
                "-global_quality",
                "23",
                "-maxrate",
                "50M",
            ],
            EncodingMode::CpuHevc => vec![
                "-c:v", "libx265", "-preset", "medium", "-crf", "23", "-maxrate", "50M",
                "-bufsize", "100M",
            ],
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EncodingMode::FastCopy => "fast-copy",
            EncodingMode::NvencHevc => "nvenc-hevc",
            EncodingMode::AmfHevc => "amf-hevc",
            EncodingMode::QuickSyncHevc => "quicksync-hevc",
            EncodingMode::CpuHevc => "cpu-hevc",
        };
        write!(f, "{name}")
    }
}

impl FromStr for EncodingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast-copy" | "fastcopy" | "copy" => Ok(EncodingMode::FastCopy),
            "nvenc-hevc" | "nvenc" => Ok(EncodingMode::NvencHevc),
            "amf-hevc" | "amf" => Ok(EncodingMode::AmfHevc),
            "quicksync-hevc" | "qsv" => Ok(EncodingMode::QuickSyncHevc),
            "cpu-hevc" | "cpu" | "x265" => Ok(EncodingMode::CpuHevc),
            _ => Err(format!("Unknown encoding mode: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_copy_has_no_encoder() {
        assert!(EncodingMode::FastCopy.is_copy());
        assert_eq!(EncodingMode::FastCopy.ffmpeg_video_codec(), None);
        assert_eq!(EncodingMode::FastCopy.video_args(), vec!["-c:v", "copy"]);
    }

    #[test]
    fn hardware_modes_name_their_encoder() {
        assert_eq!(
            EncodingMode::NvencHevc.ffmpeg_video_codec(),
            Some("hevc_nvenc")
        );
        assert_eq!(EncodingMode::AmfHevc.ffmpeg_video_codec(), Some("hevc_amf"));
        assert_eq!(
            EncodingMode::QuickSyncHevc.ffmpeg_video_codec(),
            Some("hevc_qsv")
        );
        assert_eq!(EncodingMode::CpuHevc.ffmpeg_video_codec(), Some("libx265"));
    }

    #[test]
    fn reencode_args_reference_their_codec() {
        for mode in EncodingMode::ALL {
            let Some(codec) = mode.ffmpeg_video_codec() else {
                continue;
            };
            assert!(mode.video_args().contains(&codec));
        }
    }

    #[test]
    fn mode_names_round_trip() {
        for mode in EncodingMode::ALL {
            let parsed: EncodingMode = mode.to_string().parse().unwrap();
            assert_eq!(parsed, mode);
        }
    }
}

//! One convertible recording and its layout invariants.

use std::path::PathBuf;

use chrono::{DateTime, Local};

use super::LibraryError;

/// Whether a recording was clipped manually or captured in the background.
///
/// Steam keeps manual clips under `gamerecordings/clips` and the rolling
/// background recordings under `gamerecordings/video`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipKind {
    Manual,
    Background,
}

impl std::fmt::Display for ClipKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClipKind::Manual => write!(f, "manual"),
            ClipKind::Background => write!(f, "background"),
        }
    }
}

/// Identifies one convertible recording.
///
/// Built by the locator at scan time, immutable afterwards, and consumed
/// exactly once by a scheduler worker.
#[derive(Debug, Clone)]
pub struct ClipJob {
    /// Clip directory this job was built from (deleted on successful export
    /// when source deletion is requested)
    pub source_root: PathBuf,
    /// Owning application id as it appears in the folder name. Usually a
    /// numeric Steam app id, but non-Steam shortcuts produce arbitrary ids,
    /// so it is kept verbatim.
    pub application_id: String,
    /// Resolved human-readable name, or the raw id if unresolved
    pub display_name: String,
    /// Capture time, from the clip directory's modification time
    pub timestamp: DateTime<Local>,
    /// Manual clip or background recording
    pub kind: ClipKind,
    /// Container init segment for the video stream (`init-stream0.m4s`)
    pub init_video_segment: PathBuf,
    /// Container init segment for the audio stream (`init-stream1.m4s`)
    pub init_audio_segment: PathBuf,
    /// Video data chunks in sequence-number order
    pub video_chunks: Vec<PathBuf>,
    /// Audio data chunks in sequence-number order
    pub audio_chunks: Vec<PathBuf>,
    /// Total size of all segment files, for the export size report
    pub input_bytes: u64,
}

impl ClipJob {
    /// Check the layout invariants: both init segments on disk and at least
    /// one data chunk per stream. An init segment without chunks is not a
    /// playable stream and is rejected the same as a missing init segment.
    ///
    /// # Errors
    ///
    /// - `LibraryError::InvalidLayout` - A required segment file is missing
    pub fn validate(&self) -> Result<(), LibraryError> {
        let fail = |reason: &str| {
            Err(LibraryError::InvalidLayout {
                path: self.source_root.clone(),
                reason: reason.to_string(),
            })
        };

        if !self.init_video_segment.is_file() {
            return fail("missing video init segment (init-stream0.m4s)");
        }
        if !self.init_audio_segment.is_file() {
            return fail("missing audio init segment (init-stream1.m4s)");
        }
        if self.video_chunks.is_empty() {
            return fail("no video data chunks");
        }
        if self.audio_chunks.is_empty() {
            return fail("no audio data chunks");
        }
        Ok(())
    }

    /// Output file name for this job under the export naming contract:
    /// `"{display_name} {YYYY}.{MM}.{DD} - {HH}.{MM}.{SS}.{NN}.DVR.mp4"`.
    ///
    /// `collision` fills the two-digit `NN` field; the scheduler assigns a
    /// distinct value per job before dispatch so names never collide.
    pub fn output_file_name(&self, collision: u32) -> String {
        format!(
            "{} {}.{:02}.DVR.mp4",
            self.display_name,
            self.timestamp.format("%Y.%m.%d - %H.%M.%S"),
            collision
        )
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn job_with_name(display_name: &str) -> ClipJob {
        ClipJob {
            source_root: PathBuf::from("/clips/bg_440_20250103_181530"),
            application_id: "440".to_string(),
            display_name: display_name.to_string(),
            timestamp: Local.with_ymd_and_hms(2025, 1, 3, 18, 15, 30).unwrap(),
            kind: ClipKind::Background,
            init_video_segment: PathBuf::from("init-stream0.m4s"),
            init_audio_segment: PathBuf::from("init-stream1.m4s"),
            video_chunks: vec![PathBuf::from("chunk-stream0-00001.m4s")],
            audio_chunks: vec![PathBuf::from("chunk-stream1-00001.m4s")],
            input_bytes: 0,
        }
    }

    #[test]
    fn output_name_matches_contract() {
        let job = job_with_name("Team Fortress 2");
        assert_eq!(
            job.output_file_name(0),
            "Team Fortress 2 2025.01.03 - 18.15.30.00.DVR.mp4"
        );
    }

    #[test]
    fn collision_counter_fills_two_digit_field() {
        let job = job_with_name("Team Fortress 2");
        assert_eq!(
            job.output_file_name(1),
            "Team Fortress 2 2025.01.03 - 18.15.30.01.DVR.mp4"
        );
        assert_eq!(
            job.output_file_name(12),
            "Team Fortress 2 2025.01.03 - 18.15.30.12.DVR.mp4"
        );
    }

    #[test]
    fn timestamp_fields_are_zero_padded() {
        let mut job = job_with_name("Game");
        job.timestamp = Local.with_ymd_and_hms(2025, 7, 4, 9, 5, 2).unwrap();
        assert_eq!(
            job.output_file_name(0),
            "Game 2025.07.04 - 09.05.02.00.DVR.mp4"
        );
    }

    #[test]
    fn validation_rejects_chunkless_streams() {
        // Init segment paths do not exist on disk either, but the chunk
        // check must fire for a job whose chunk list is empty.
        let mut job = job_with_name("Game");
        job.video_chunks.clear();
        let err = job.validate().unwrap_err();
        assert!(matches!(err, LibraryError::InvalidLayout { .. }));
    }
}

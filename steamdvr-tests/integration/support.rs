//! Shared fixtures: on-disk clip layouts and scheduler wiring.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, TimeZone};
use steamdvr_core::encoder::EncodingMode;
use steamdvr_core::export::{ExportScheduler, ProgressEvent};
use steamdvr_core::library::{ClipJob, ClipKind};
use steamdvr_core::reconstruct::{SegmentReconstructor, SimulationFfmpeg};
use tokio::sync::mpsc;

/// Write one clip folder with a single recording session.
///
/// Mirrors Steam's on-disk layout: a `clip_<appid>_<date>_<time>` folder
/// containing a nested session directory with `session.mpd`, per-stream
/// init segments, and numbered data chunks.
pub fn write_clip(
    parent: &Path,
    folder: &str,
    video_chunks: &[&[u8]],
    audio_chunks: &[&[u8]],
) -> PathBuf {
    let clip_dir = parent.join(folder);
    let session = clip_dir.join("fg").join(format!("{folder}-session"));
    fs::create_dir_all(&session).unwrap();
    fs::write(session.join("session.mpd"), b"<MPD/>").unwrap();
    fs::write(session.join("init-stream0.m4s"), b"VINIT").unwrap();
    fs::write(session.join("init-stream1.m4s"), b"AINIT").unwrap();
    for (i, data) in video_chunks.iter().enumerate() {
        fs::write(session.join(format!("chunk-stream0-{i}.m4s")), data).unwrap();
    }
    for (i, data) in audio_chunks.iter().enumerate() {
        fs::write(session.join(format!("chunk-stream1-{i}.m4s")), data).unwrap();
    }
    clip_dir
}

/// Build a job directly, bypassing discovery, with a fixed timestamp so
/// output names are deterministic.
pub fn manual_job(session_dir: &Path, display_name: &str, hour: u32) -> ClipJob {
    fs::create_dir_all(session_dir).unwrap();
    let init_video = session_dir.join("init-stream0.m4s");
    let init_audio = session_dir.join("init-stream1.m4s");
    fs::write(&init_video, b"VINIT").unwrap();
    fs::write(&init_audio, b"AINIT").unwrap();
    let chunk_video = session_dir.join("chunk-stream0-0.m4s");
    let chunk_audio = session_dir.join("chunk-stream1-0.m4s");
    fs::write(&chunk_video, b"vvvv").unwrap();
    fs::write(&chunk_audio, b"aa").unwrap();

    ClipJob {
        source_root: session_dir.to_path_buf(),
        application_id: "440".to_string(),
        display_name: display_name.to_string(),
        timestamp: Local.with_ymd_and_hms(2025, 1, 3, hour, 15, 30).unwrap(),
        kind: ClipKind::Manual,
        init_video_segment: init_video,
        init_audio_segment: init_audio,
        video_chunks: vec![chunk_video],
        audio_chunks: vec![chunk_audio],
        input_bytes: 16,
    }
}

/// Scheduler backed by the given simulation, with every mode available.
pub fn scheduler_with(ffmpeg: Arc<SimulationFfmpeg>, temp_dir: &Path) -> ExportScheduler {
    let reconstructor = Arc::new(SegmentReconstructor::new(ffmpeg, temp_dir.to_path_buf()));
    ExportScheduler::new(reconstructor, EncodingMode::ALL.into_iter().collect())
}

/// Scheduler whose probe reported only the given modes.
pub fn scheduler_with_modes(
    ffmpeg: Arc<SimulationFfmpeg>,
    temp_dir: &Path,
    modes: HashSet<EncodingMode>,
) -> ExportScheduler {
    let reconstructor = Arc::new(SegmentReconstructor::new(ffmpeg, temp_dir.to_path_buf()));
    ExportScheduler::new(reconstructor, modes)
}

/// Drain the event stream until the batch reports completion.
pub async fn collect_events(
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
) -> Vec<ProgressEvent> {
    let mut collected = Vec::new();
    while let Some(event) = events.recv().await {
        let finished = matches!(event, ProgressEvent::BatchFinished { .. });
        collected.push(event);
        if finished {
            break;
        }
    }
    collected
}

/// Files left in a directory, or empty if it was never created.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

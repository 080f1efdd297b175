//! Full pipeline tests: discovery through export to final files on disk.

use std::collections::HashMap;
use std::fs;
use std::sync::Arc;

use steamdvr_core::encoder::EncodingMode;
use steamdvr_core::export::ExportOptions;
use steamdvr_core::library::{AppNames, ClipLocator};
use steamdvr_core::reconstruct::SimulationFfmpeg;

use crate::support;

fn tf2_names() -> AppNames {
    AppNames::from_map(HashMap::from([(
        "440".to_string(),
        "Team Fortress 2".to_string(),
    )]))
}

#[tokio::test]
async fn discovered_clips_export_and_sources_are_deleted() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("clips");
    fs::create_dir_all(&root).unwrap();

    let first = support::write_clip(&root, "clip_440_20250103_181530", &[b"v1", b"v2"], &[b"a1"]);
    let second = support::write_clip(&root, "clip_440_20250104_090000", &[b"v"], &[b"a"]);
    let third = support::write_clip(&root, "clip_440_20250105_120000", &[b"x"], &[b"y"]);

    let scan = ClipLocator::new(vec![root.clone()], tf2_names())
        .scan()
        .await
        .unwrap();
    assert_eq!(scan.jobs.len(), 3);
    assert_eq!(scan.skipped, 0);
    assert!(scan.jobs.iter().all(|j| j.display_name == "Team Fortress 2"));

    let ffmpeg = Arc::new(SimulationFfmpeg::new());
    let scheduler = support::scheduler_with(ffmpeg.clone(), &tmp.path().join("work"));
    let output_dir = tmp.path().join("out");
    let (handle, events) = scheduler
        .start(
            scan.jobs,
            ExportOptions {
                mode: EncodingMode::FastCopy,
                concurrency: 2,
                output_dir: output_dir.clone(),
                delete_sources: true,
            },
        )
        .unwrap();

    support::collect_events(events).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.succeeded, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.cancelled, 0);
    assert!(summary.warnings.is_empty());
    assert_eq!(ffmpeg.invocations(), 3);

    let outputs = support::dir_entries(&output_dir);
    assert_eq!(outputs.len(), 3);
    for output in &outputs {
        let name = output.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("Team Fortress 2 "), "unexpected name {name}");
        assert!(name.ends_with(".DVR.mp4"), "unexpected name {name}");
    }

    // The simulation writes video bytes then audio bytes.
    let total_output: u64 = outputs
        .iter()
        .map(|p| fs::metadata(p).unwrap().len())
        .sum();
    assert_eq!(summary.total_bytes_after, total_output);
    assert_eq!(summary.total_bytes_before, summary.total_bytes_after);

    for source in [&first, &second, &third] {
        assert!(!source.exists(), "source {} not deleted", source.display());
    }
}

#[tokio::test]
async fn output_names_are_deterministic_with_collision_counters() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = vec![
        support::manual_job(&tmp.path().join("a"), "Team Fortress 2", 18),
        support::manual_job(&tmp.path().join("b"), "Team Fortress 2", 18),
        support::manual_job(&tmp.path().join("c"), "Team Fortress 2", 19),
    ];

    let ffmpeg = Arc::new(SimulationFfmpeg::new());
    let scheduler = support::scheduler_with(ffmpeg, &tmp.path().join("work"));
    let output_dir = tmp.path().join("out");
    let (handle, events) = scheduler
        .start(
            jobs,
            ExportOptions {
                mode: EncodingMode::FastCopy,
                concurrency: 1,
                output_dir: output_dir.clone(),
                delete_sources: false,
            },
        )
        .unwrap();
    support::collect_events(events).await;
    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.succeeded, 3);

    for expected in [
        "Team Fortress 2 2025.01.03 - 18.15.30.00.DVR.mp4",
        "Team Fortress 2 2025.01.03 - 18.15.30.01.DVR.mp4",
        "Team Fortress 2 2025.01.03 - 19.15.30.00.DVR.mp4",
    ] {
        assert!(
            output_dir.join(expected).is_file(),
            "missing output {expected}"
        );
    }
}

#[tokio::test]
async fn broken_session_fails_without_touching_ffmpeg() {
    let tmp = tempfile::tempdir().unwrap();
    let good = support::manual_job(&tmp.path().join("good"), "Half-Life 2", 10);
    let mut bad = support::manual_job(&tmp.path().join("bad"), "Half-Life 2", 11);
    fs::remove_file(&bad.init_audio_segment).unwrap();
    bad.audio_chunks.clear();

    let good_root = good.source_root.clone();
    let bad_root = bad.source_root.clone();

    let ffmpeg = Arc::new(SimulationFfmpeg::new());
    let scheduler = support::scheduler_with(ffmpeg.clone(), &tmp.path().join("work"));
    let (handle, events) = scheduler
        .start(
            vec![good, bad],
            ExportOptions {
                mode: EncodingMode::FastCopy,
                concurrency: 1,
                output_dir: tmp.path().join("out"),
                delete_sources: true,
            },
        )
        .unwrap();
    support::collect_events(events).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    // Only the healthy session reached the encoder.
    assert_eq!(ffmpeg.invocations(), 1);

    assert!(!good_root.exists());
    assert!(bad_root.exists());
}

#[tokio::test]
async fn scan_skips_sessions_missing_an_init_segment() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("clips");
    fs::create_dir_all(&root).unwrap();

    support::write_clip(&root, "clip_440_20250103_181530", &[b"v"], &[b"a"]);
    let broken = support::write_clip(&root, "clip_440_20250104_090000", &[b"v"], &[b"a"]);
    let session = broken.join("fg").join("clip_440_20250104_090000-session");
    fs::remove_file(session.join("init-stream1.m4s")).unwrap();

    let scan = ClipLocator::new(vec![root], tf2_names()).scan().await.unwrap();
    assert_eq!(scan.jobs.len(), 1);
    assert_eq!(scan.skipped, 1);
}

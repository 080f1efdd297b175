//! Scheduler control tests: cancellation, live concurrency, mode fallback.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use steamdvr_core::encoder::EncodingMode;
use steamdvr_core::export::{ExportOptions, ProgressEvent};
use steamdvr_core::reconstruct::SimulationFfmpeg;

use crate::support;

#[tokio::test]
async fn cancel_drains_running_and_queued_jobs() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = vec![
        support::manual_job(&tmp.path().join("a"), "Portal 2", 10),
        support::manual_job(&tmp.path().join("b"), "Portal 2", 11),
        support::manual_job(&tmp.path().join("c"), "Portal 2", 12),
    ];

    let ffmpeg = Arc::new(SimulationFfmpeg::new().with_delay(Duration::from_secs(60)));
    let temp_dir = tmp.path().join("work");
    let scheduler = support::scheduler_with(ffmpeg.clone(), &temp_dir);
    let output_dir = tmp.path().join("out");
    let (handle, mut events) = scheduler
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

    // Cancel once the first job reaches its encoder; the other two are
    // still queued.
    while let Some(event) = events.recv().await {
        if matches!(
            event,
            ProgressEvent::JobPhase {
                phase: steamdvr_core::reconstruct::Phase::Encoding,
                ..
            }
        ) {
            break;
        }
    }
    handle.cancel();

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.cancelled, 3);
    assert_eq!(summary.succeeded, 0);
    assert_eq!(summary.failed, 0);
    // Only the running job ever reached the encoder.
    assert_eq!(ffmpeg.invocations(), 1);

    // No partial outputs and no transient stream files survive.
    assert!(support::dir_entries(&output_dir).is_empty());
    assert!(support::dir_entries(&temp_dir).is_empty());
}

#[tokio::test]
async fn raising_concurrency_dispatches_more_workers() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs: Vec<_> = (0u32..4)
        .map(|i| support::manual_job(&tmp.path().join(format!("s{i}")), "Portal 2", 10 + i))
        .collect();

    let ffmpeg = Arc::new(SimulationFfmpeg::new().with_delay(Duration::from_millis(300)));
    let scheduler = support::scheduler_with(ffmpeg.clone(), &tmp.path().join("work"));
    let (handle, events) = scheduler
        .start(
            jobs,
            ExportOptions {
                mode: EncodingMode::FastCopy,
                concurrency: 1,
                output_dir: tmp.path().join("out"),
                delete_sources: false,
            },
        )
        .unwrap();

    handle.adjust_concurrency(4);
    support::collect_events(events).await;
    let summary = handle.wait().await.unwrap();

    assert_eq!(summary.succeeded, 4);
    assert!(
        ffmpeg.observed_max_active() >= 2,
        "pool never grew past one worker"
    );
}

#[tokio::test]
async fn unavailable_mode_falls_back_with_one_warning() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = vec![support::manual_job(&tmp.path().join("a"), "Portal 2", 10)];

    let ffmpeg = Arc::new(SimulationFfmpeg::new());
    let scheduler = support::scheduler_with_modes(
        ffmpeg,
        &tmp.path().join("work"),
        HashSet::from([EncodingMode::FastCopy]),
    );
    let (handle, events) = scheduler
        .start(
            jobs,
            ExportOptions {
                mode: EncodingMode::NvencHevc,
                concurrency: 1,
                output_dir: tmp.path().join("out"),
                delete_sources: false,
            },
        )
        .unwrap();

    let events = support::collect_events(events).await;
    let warnings = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Warning { .. }))
        .count();
    assert_eq!(warnings, 1);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::BatchStarted {
            mode: EncodingMode::FastCopy,
            ..
        }
    )));

    let summary = handle.wait().await.unwrap();
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.warnings.len(), 1);
}

#[tokio::test]
async fn job_events_arrive_in_lifecycle_order() {
    let tmp = tempfile::tempdir().unwrap();
    let jobs = vec![support::manual_job(&tmp.path().join("a"), "Portal 2", 10)];

    let ffmpeg = Arc::new(SimulationFfmpeg::new());
    let scheduler = support::scheduler_with(ffmpeg, &tmp.path().join("work"));
    let (handle, events) = scheduler
        .start(
            jobs,
            ExportOptions {
                mode: EncodingMode::FastCopy,
                concurrency: 1,
                output_dir: tmp.path().join("out"),
                delete_sources: false,
            },
        )
        .unwrap();

    let events = support::collect_events(events).await;
    handle.wait().await.unwrap();

    // Phase events carry live aggregate counts like the lifecycle events.
    for event in &events {
        if let ProgressEvent::JobPhase { counts, .. } = event {
            assert_eq!(counts.total, 1);
            assert_eq!(counts.completed, 0);
            assert_eq!(counts.active, 1);
        }
    }

    let kinds: Vec<&'static str> = events
        .iter()
        .map(|e| match e {
            ProgressEvent::BatchStarted { .. } => "batch-started",
            ProgressEvent::Warning { .. } => "warning",
            ProgressEvent::JobStarted { .. } => "job-started",
            ProgressEvent::JobPhase { .. } => "job-phase",
            ProgressEvent::JobFinished { .. } => "job-finished",
            ProgressEvent::BatchFinished { .. } => "batch-finished",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "batch-started",
            "job-started",
            "job-phase",
            "job-phase",
            "job-phase",
            "job-finished",
            "batch-finished",
        ]
    );
}

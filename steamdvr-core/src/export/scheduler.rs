//! Concurrent export batch execution.
//!
//! A batch runs as a single spawned actor task that owns all scheduling
//! state. Workers are per-job spawned tasks reporting back over a channel;
//! the actor dispatches from a FIFO queue whenever a slot frees up, so
//! concurrency adjustments and cancellation take effect without touching
//! running jobs.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::report::{self, Summary};
use super::{BatchCounts, ExportError, ExportOptions, JobTag, ProgressEvent};
use crate::config::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::encoder::EncodingMode;
use crate::library::ClipJob;
use crate::reconstruct::{JobResult, Phase, SegmentReconstructor};

/// Commands accepted by a running batch.
#[derive(Debug)]
enum SchedulerCommand {
    AdjustConcurrency(usize),
    Cancel,
}

/// Control handle for a running export batch.
pub struct ExportHandle {
    commands: mpsc::UnboundedSender<SchedulerCommand>,
    summary: oneshot::Receiver<Summary>,
}

impl ExportHandle {
    /// Change the worker limit for subsequent dispatches.
    ///
    /// Values outside the supported range are clamped. Lowering the limit
    /// never interrupts jobs already running; the pool shrinks as they
    /// finish.
    pub fn adjust_concurrency(&self, limit: usize) {
        let _ = self
            .commands
            .send(SchedulerCommand::AdjustConcurrency(limit));
    }

    /// Cancel the batch: queued jobs are dropped immediately, running jobs
    /// are signalled and drained.
    pub fn cancel(&self) {
        let _ = self.commands.send(SchedulerCommand::Cancel);
    }

    /// Wait for the batch to finish and return its summary.
    pub async fn wait(self) -> Result<Summary, ExportError> {
        self.summary.await.map_err(|_| ExportError::Aborted)
    }
}

/// Schedules clip exports over a bounded worker pool.
pub struct ExportScheduler {
    reconstructor: Arc<SegmentReconstructor>,
    available_modes: HashSet<EncodingMode>,
}

impl ExportScheduler {
    pub fn new(
        reconstructor: Arc<SegmentReconstructor>,
        available_modes: HashSet<EncodingMode>,
    ) -> Self {
        Self {
            reconstructor,
            available_modes,
        }
    }

    /// Start a batch over `jobs` in submission order.
    ///
    /// Returns a control handle and the progress event stream. The batch
    /// runs to completion even if the handle and event receiver are
    /// dropped.
    pub fn start(
        &self,
        jobs: Vec<ClipJob>,
        options: ExportOptions,
    ) -> Result<(ExportHandle, mpsc::UnboundedReceiver<ProgressEvent>), ExportError> {
        std::fs::create_dir_all(&options.output_dir).map_err(|source| {
            ExportError::OutputDir {
                path: options.output_dir.clone(),
                source,
            }
        })?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (summary_tx, summary_rx) = oneshot::channel();

        let batch = Batch {
            reconstructor: self.reconstructor.clone(),
            available_modes: self.available_modes.clone(),
            options,
            events: event_tx,
        };
        tokio::spawn(async move {
            let summary = batch.run(jobs, command_rx).await;
            let _ = summary_tx.send(summary);
        });

        Ok((
            ExportHandle {
                commands: command_tx,
                summary: summary_rx,
            },
            event_rx,
        ))
    }
}

struct Batch {
    reconstructor: Arc<SegmentReconstructor>,
    available_modes: HashSet<EncodingMode>,
    options: ExportOptions,
    events: mpsc::UnboundedSender<ProgressEvent>,
}

/// Messages from worker tasks back to the batch actor.
///
/// One channel carries both kinds so phase reports of a job are processed
/// before its completion.
enum WorkerEvent {
    Phase { index: usize, phase: Phase },
    Done { index: usize, result: JobResult },
}

impl Batch {
    async fn run(self, jobs: Vec<ClipJob>, mut commands: mpsc::UnboundedReceiver<SchedulerCommand>) -> Summary {
        let mode = self.resolve_mode();
        let total = jobs.len();
        let mut warnings = Vec::new();
        if mode != self.options.mode {
            let message = format!(
                "Encoder for {} is not available, falling back to {}",
                self.options.mode,
                EncodingMode::FastCopy
            );
            tracing::warn!("{message}");
            self.emit(ProgressEvent::Warning {
                message: message.clone(),
            });
            warnings.push(message);
        }
        self.emit(ProgressEvent::BatchStarted { total, mode });

        // Output paths are assigned up front so name collisions within the
        // batch resolve deterministically in submission order.
        let mut assigned = HashSet::new();
        let mut queue: VecDeque<(usize, ClipJob, PathBuf)> = jobs
            .into_iter()
            .enumerate()
            .map(|(index, job)| {
                let output = assign_output_path(&job, &self.options.output_dir, &mut assigned);
                (index, job, output)
            })
            .collect();

        let (cancel_tx, _) = watch::channel(false);
        let (worker_tx, mut worker_rx) = mpsc::unbounded_channel::<WorkerEvent>();

        let mut limit = clamp_concurrency(self.options.concurrency);
        let mut active: Vec<Option<ClipJob>> = Vec::new();
        let mut active_count = 0usize;
        let mut finished: Vec<(ClipJob, JobResult)> = Vec::new();
        let mut cancelled = false;
        let mut commands_open = true;

        active.resize_with(total, || None);

        loop {
            while !cancelled && active_count < limit {
                let Some((index, job, output)) = queue.pop_front() else {
                    break;
                };
                self.dispatch(index, &job, &output, mode, &cancel_tx, &worker_tx, total, finished.len(), active_count + 1);
                active[index] = Some(job);
                active_count += 1;
            }

            if active_count == 0 && (queue.is_empty() || cancelled) {
                break;
            }

            tokio::select! {
                Some(event) = worker_rx.recv() => match event {
                    WorkerEvent::Phase { index, phase } => {
                        // Late phase reports of an already-finished job are
                        // dropped; the job has a terminal event anyway.
                        if let Some(job) = active[index].as_ref() {
                            self.emit(ProgressEvent::JobPhase {
                                job: JobTag {
                                    index,
                                    display_name: job.display_name.clone(),
                                },
                                phase,
                                counts: BatchCounts {
                                    total,
                                    completed: finished.len(),
                                    active: active_count,
                                },
                            });
                        }
                    }
                    WorkerEvent::Done { index, result } => {
                        let Some(job) = active[index].take() else {
                            continue;
                        };
                        active_count -= 1;
                        self.emit(ProgressEvent::JobFinished {
                            job: JobTag {
                                index,
                                display_name: job.display_name.clone(),
                            },
                            result: result.clone(),
                            counts: BatchCounts {
                                total,
                                completed: finished.len() + 1,
                                active: active_count,
                            },
                        });
                        finished.push((job, result));
                    }
                },
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(SchedulerCommand::AdjustConcurrency(requested)) => {
                            limit = clamp_concurrency(requested);
                            tracing::info!("Worker limit adjusted to {limit}");
                        }
                        Some(SchedulerCommand::Cancel) => {
                            if !cancelled {
                                cancelled = true;
                                tracing::info!("Export batch cancelled, draining running jobs");
                                let _ = cancel_tx.send(true);
                                while let Some((index, job, _output)) = queue.pop_front() {
                                    self.emit(ProgressEvent::JobFinished {
                                        job: JobTag {
                                            index,
                                            display_name: job.display_name.clone(),
                                        },
                                        result: JobResult::Cancelled,
                                        counts: BatchCounts {
                                            total,
                                            completed: finished.len() + 1,
                                            active: active_count,
                                        },
                                    });
                                    finished.push((job, JobResult::Cancelled));
                                }
                            }
                        }
                        // All handles dropped; the batch keeps running.
                        None => commands_open = false,
                    }
                }
            }
        }

        let mut summary = Summary {
            warnings,
            ..Summary::default()
        };
        for (job, result) in &finished {
            match result {
                JobResult::Success {
                    output_size_bytes, ..
                } => {
                    summary.succeeded += 1;
                    summary.total_bytes_before += job.input_bytes;
                    summary.total_bytes_after += output_size_bytes;
                }
                JobResult::Failed { .. } => summary.failed += 1,
                JobResult::Cancelled => summary.cancelled += 1,
            }
        }

        if self.options.delete_sources && summary.succeeded > 0 {
            summary
                .warnings
                .extend(report::delete_exported_sources(&finished).await);
        }

        self.emit(ProgressEvent::BatchFinished {
            summary: summary.clone(),
        });
        summary
    }

    #[allow(clippy::too_many_arguments)]
    fn dispatch(
        &self,
        index: usize,
        job: &ClipJob,
        output: &Path,
        mode: EncodingMode,
        cancel_tx: &watch::Sender<bool>,
        worker_tx: &mpsc::UnboundedSender<WorkerEvent>,
        total: usize,
        completed: usize,
        active: usize,
    ) {
        self.emit(ProgressEvent::JobStarted {
            job: JobTag {
                index,
                display_name: job.display_name.clone(),
            },
            counts: BatchCounts {
                total,
                completed,
                active,
            },
        });

        let reconstructor = self.reconstructor.clone();
        let job = job.clone();
        let output = output.to_path_buf();
        let cancel_rx = cancel_tx.subscribe();
        let worker_tx = worker_tx.clone();
        tokio::spawn(async move {
            let phase_tx = worker_tx.clone();
            let on_phase = move |phase| {
                let _ = phase_tx.send(WorkerEvent::Phase { index, phase });
            };
            let result = reconstructor
                .reconstruct(&job, mode, &output, cancel_rx, &on_phase)
                .await;
            let _ = worker_tx.send(WorkerEvent::Done { index, result });
        });
    }

    fn resolve_mode(&self) -> EncodingMode {
        if self.options.mode.is_copy() || self.available_modes.contains(&self.options.mode) {
            self.options.mode
        } else {
            EncodingMode::FastCopy
        }
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.events.send(event);
    }
}

fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Pick the first free output path, bumping the collision counter past
/// files already on disk and names already claimed by this batch.
fn assign_output_path(job: &ClipJob, output_dir: &Path, assigned: &mut HashSet<PathBuf>) -> PathBuf {
    let mut collision = 0u32;
    loop {
        let candidate = output_dir.join(job.output_file_name(collision));
        if !candidate.exists() && !assigned.contains(&candidate) {
            assigned.insert(candidate.clone());
            return candidate;
        }
        collision += 1;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::library::ClipKind;

    fn job_at(hour: u32) -> ClipJob {
        ClipJob {
            source_root: PathBuf::from("/clips/clip_440"),
            application_id: "440".to_string(),
            display_name: "Team Fortress 2".to_string(),
            timestamp: Local.with_ymd_and_hms(2025, 1, 3, hour, 15, 30).unwrap(),
            kind: ClipKind::Manual,
            init_video_segment: PathBuf::from("init-stream0.m4s"),
            init_audio_segment: PathBuf::from("init-stream1.m4s"),
            video_chunks: Vec::new(),
            audio_chunks: Vec::new(),
            input_bytes: 0,
        }
    }

    #[test]
    fn concurrency_is_clamped_to_supported_range() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
        assert_eq!(clamp_concurrency(64), 16);
    }

    #[test]
    fn colliding_names_get_distinct_counters() {
        let tmp = tempfile::tempdir().unwrap();
        let mut assigned = HashSet::new();

        let first = assign_output_path(&job_at(18), tmp.path(), &mut assigned);
        let second = assign_output_path(&job_at(18), tmp.path(), &mut assigned);
        let other = assign_output_path(&job_at(19), tmp.path(), &mut assigned);

        assert!(first.to_string_lossy().ends_with("18.15.30.00.DVR.mp4"));
        assert!(second.to_string_lossy().ends_with("18.15.30.01.DVR.mp4"));
        assert!(other.to_string_lossy().ends_with("19.15.30.00.DVR.mp4"));
    }

    #[test]
    fn existing_files_bump_the_counter() {
        let tmp = tempfile::tempdir().unwrap();
        let job = job_at(18);
        std::fs::write(tmp.path().join(job.output_file_name(0)), b"x").unwrap();

        let mut assigned = HashSet::new();
        let assigned_path = assign_output_path(&job, tmp.path(), &mut assigned);
        assert!(
            assigned_path
                .to_string_lossy()
                .ends_with("18.15.30.01.DVR.mp4")
        );
    }
}

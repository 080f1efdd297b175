//! Assembly of one clip into its final MP4.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

use super::ffmpeg::Ffmpeg;
use super::{FailReason, JobResult, Phase, ReconstructError};
use crate::encoder::EncodingMode;
use crate::library::ClipJob;

/// Reconstructs single clips: concatenate segments, then mux.
///
/// One instance is shared by all scheduler workers; reconstruction itself
/// holds no state between jobs.
pub struct SegmentReconstructor {
    ffmpeg: Arc<dyn Ffmpeg>,
    temp_dir: PathBuf,
}

impl SegmentReconstructor {
    /// Create a reconstructor writing transient streams under `temp_dir`.
    pub fn new(ffmpeg: Arc<dyn Ffmpeg>, temp_dir: PathBuf) -> Self {
        Self { ffmpeg, temp_dir }
    }

    /// Reconstruct one job into `output_path`.
    ///
    /// Never panics a worker: every failure is folded into the returned
    /// [`JobResult`]. Transient combined-stream files are removed on every
    /// exit path; a partial output file is removed on failure and
    /// cancellation.
    pub async fn reconstruct(
        &self,
        job: &ClipJob,
        mode: EncodingMode,
        output_path: &Path,
        mut cancel: watch::Receiver<bool>,
        on_phase: &(dyn Fn(Phase) + Send + Sync),
    ) -> JobResult {
        if *cancel.borrow() {
            return JobResult::Cancelled;
        }

        on_phase(Phase::Extracting);
        if let Err(e) = job.validate() {
            return JobResult::Failed {
                reason: FailReason::InvalidLayout(e.to_string()),
            };
        }

        // The guard removes the combined streams on drop, covering success,
        // failure and cancellation alike.
        let streams = match TempStreams::create(&self.temp_dir, output_path) {
            Ok(streams) => streams,
            Err(e) => {
                return JobResult::Failed {
                    reason: FailReason::EncodeError(format!(
                        "failed to create transient stream files: {e}"
                    )),
                };
            }
        };

        on_phase(Phase::Concatenating);
        let concatenated = async {
            concat_stream(&job.init_video_segment, &job.video_chunks, &streams.video).await?;
            concat_stream(&job.init_audio_segment, &job.audio_chunks, &streams.audio).await
        }
        .await;
        if let Err(e) = concatenated {
            return JobResult::Failed {
                reason: FailReason::EncodeError(format!("stream concatenation failed: {e}")),
            };
        }

        if *cancel.borrow() {
            return JobResult::Cancelled;
        }

        on_phase(Phase::Encoding);
        match self
            .ffmpeg
            .mux(&streams.video, &streams.audio, output_path, mode, &mut cancel)
            .await
        {
            Ok(()) => {}
            Err(ReconstructError::Cancelled) => {
                remove_partial(output_path).await;
                return JobResult::Cancelled;
            }
            Err(e) => {
                remove_partial(output_path).await;
                return JobResult::Failed {
                    reason: FailReason::EncodeError(e.to_string()),
                };
            }
        }

        // Cancellation that fired during the mux but after the subprocess
        // exited still wins over success.
        if *cancel.borrow() {
            remove_partial(output_path).await;
            return JobResult::Cancelled;
        }

        match tokio::fs::metadata(output_path).await {
            Ok(metadata) => JobResult::Success {
                output_path: output_path.to_path_buf(),
                output_size_bytes: metadata.len(),
            },
            Err(e) => JobResult::Failed {
                reason: FailReason::EncodeError(format!("output file missing after mux: {e}")),
            },
        }
    }
}

/// Byte-concatenate an init segment and its ordered chunks into `dest`.
///
/// Ordering is load-bearing: writing chunks out of sequence produces a
/// corrupt or desynchronized stream. Gaps in the numbering are written
/// through as-is, yielding a shorter clip rather than a failure.
async fn concat_stream(
    init: &Path,
    chunks: &[PathBuf],
    dest: &Path,
) -> Result<(), ReconstructError> {
    let mut out = tokio::fs::File::create(dest).await?;
    for part in std::iter::once(init).chain(chunks.iter().map(PathBuf::as_path)) {
        let mut src = tokio::fs::File::open(part).await?;
        tokio::io::copy(&mut src, &mut out).await?;
    }
    out.flush().await?;
    Ok(())
}

async fn remove_partial(output_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(output_path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(
            "Failed to remove partial output {}: {e}",
            output_path.display()
        );
    }
}

/// Transient combined-stream files, removed unconditionally on drop.
struct TempStreams {
    video: PathBuf,
    audio: PathBuf,
}

impl TempStreams {
    fn create(temp_dir: &Path, output_path: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(temp_dir)?;
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip".to_string());
        Ok(Self {
            video: temp_dir.join(format!("{stem}.video.m4s.tmp")),
            audio: temp_dir.join(format!("{stem}.audio.m4s.tmp")),
        })
    }
}

impl Drop for TempStreams {
    fn drop(&mut self) {
        for path in [&self.video, &self.audio] {
            if let Err(e) = std::fs::remove_file(path)
                && e.kind() != std::io::ErrorKind::NotFound
            {
                tracing::warn!("Failed to remove transient stream {}: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use chrono::Local;

    use super::*;
    use crate::library::ClipKind;
    use crate::reconstruct::ffmpeg::SimulationFfmpeg;

    fn write_job(dir: &Path, video_chunks: &[&[u8]], audio_chunks: &[&[u8]]) -> ClipJob {
        fs::create_dir_all(dir).unwrap();
        let init_video = dir.join("init-stream0.m4s");
        let init_audio = dir.join("init-stream1.m4s");
        fs::write(&init_video, b"VINIT").unwrap();
        fs::write(&init_audio, b"AINIT").unwrap();

        let mut video = Vec::new();
        for (i, data) in video_chunks.iter().enumerate() {
            let path = dir.join(format!("chunk-stream0-{i}.m4s"));
            fs::write(&path, data).unwrap();
            video.push(path);
        }
        let mut audio = Vec::new();
        for (i, data) in audio_chunks.iter().enumerate() {
            let path = dir.join(format!("chunk-stream1-{i}.m4s"));
            fs::write(&path, data).unwrap();
            audio.push(path);
        }

        ClipJob {
            source_root: dir.to_path_buf(),
            application_id: "440".to_string(),
            display_name: "Team Fortress 2".to_string(),
            timestamp: Local::now(),
            kind: ClipKind::Manual,
            init_video_segment: init_video,
            init_audio_segment: init_audio,
            video_chunks: video,
            audio_chunks: audio,
            input_bytes: 0,
        }
    }

    fn no_phase() -> impl Fn(Phase) + Send + Sync {
        |_| {}
    }

    #[tokio::test]
    async fn fast_copy_writes_concatenated_output() {
        let tmp = tempfile::tempdir().unwrap();
        let job = write_job(&tmp.path().join("clip"), &[b"v1", b"v2"], &[b"a1"]);
        let output = tmp.path().join("out.mp4");

        let reconstructor = SegmentReconstructor::new(
            Arc::new(SimulationFfmpeg::new()),
            tmp.path().join("tmp"),
        );
        let (_tx, rx) = watch::channel(false);
        let result = reconstructor
            .reconstruct(&job, EncodingMode::FastCopy, &output, rx, &no_phase())
            .await;

        let JobResult::Success {
            output_size_bytes, ..
        } = result
        else {
            panic!("expected success, got {result:?}");
        };
        // VINIT v1 v2 + AINIT a1
        assert_eq!(output_size_bytes, 9 + 7);
        assert_eq!(fs::read(&output).unwrap(), b"VINITv1v2AINITa1");
    }

    #[tokio::test]
    async fn transient_streams_are_removed_on_success_and_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let temp_dir = tmp.path().join("tmp");
        let job = write_job(&tmp.path().join("clip"), &[b"v"], &[b"a"]);

        let ok = SegmentReconstructor::new(Arc::new(SimulationFfmpeg::new()), temp_dir.clone());
        let (_tx, rx) = watch::channel(false);
        ok.reconstruct(
            &job,
            EncodingMode::FastCopy,
            &tmp.path().join("ok.mp4"),
            rx,
            &no_phase(),
        )
        .await;

        let failing = SegmentReconstructor::new(
            Arc::new(SimulationFfmpeg::new().failing("boom")),
            temp_dir.clone(),
        );
        let (_tx, rx) = watch::channel(false);
        let result = failing
            .reconstruct(
                &job,
                EncodingMode::FastCopy,
                &tmp.path().join("bad.mp4"),
                rx,
                &no_phase(),
            )
            .await;
        assert!(matches!(result, JobResult::Failed { .. }));

        let leftovers: Vec<_> = fs::read_dir(&temp_dir).unwrap().collect();
        assert!(leftovers.is_empty(), "transient files left: {leftovers:?}");
    }

    #[tokio::test]
    async fn invalid_layout_fails_before_any_subprocess() {
        let tmp = tempfile::tempdir().unwrap();
        let mut job = write_job(&tmp.path().join("clip"), &[b"v"], &[b"a"]);
        fs::remove_file(&job.init_audio_segment).unwrap();
        job.audio_chunks.clear();

        let ffmpeg = Arc::new(SimulationFfmpeg::new());
        let reconstructor = SegmentReconstructor::new(ffmpeg.clone(), tmp.path().join("tmp"));
        let (_tx, rx) = watch::channel(false);
        let result = reconstructor
            .reconstruct(
                &job,
                EncodingMode::FastCopy,
                &tmp.path().join("out.mp4"),
                rx,
                &no_phase(),
            )
            .await;

        assert!(matches!(
            result,
            JobResult::Failed {
                reason: FailReason::InvalidLayout(_)
            }
        ));
        assert_eq!(ffmpeg.invocations(), 0);
    }

    #[tokio::test]
    async fn cancellation_removes_partial_output() {
        let tmp = tempfile::tempdir().unwrap();
        let job = write_job(&tmp.path().join("clip"), &[b"v"], &[b"a"]);
        let output = tmp.path().join("out.mp4");

        let reconstructor = SegmentReconstructor::new(
            Arc::new(SimulationFfmpeg::new().with_delay(std::time::Duration::from_secs(60))),
            tmp.path().join("tmp"),
        );
        let (tx, rx) = watch::channel(false);

        let handle = {
            let job = job.clone();
            let output = output.clone();
            let reconstructor = Arc::new(reconstructor);
            tokio::spawn(async move {
                reconstructor
                    .reconstruct(&job, EncodingMode::FastCopy, &output, rx, &|_| {})
                    .await
            })
        };

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let result = handle.await.unwrap();

        assert!(result.is_cancelled());
        assert!(!output.exists());
    }

    #[tokio::test]
    async fn phases_are_reported_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let job = write_job(&tmp.path().join("clip"), &[b"v"], &[b"a"]);

        let phases = Mutex::new(Vec::new());
        let reconstructor = SegmentReconstructor::new(
            Arc::new(SimulationFfmpeg::new()),
            tmp.path().join("tmp"),
        );
        let (_tx, rx) = watch::channel(false);
        reconstructor
            .reconstruct(
                &job,
                EncodingMode::FastCopy,
                &tmp.path().join("out.mp4"),
                rx,
                &|phase| phases.lock().unwrap().push(phase),
            )
            .await;

        assert_eq!(
            *phases.lock().unwrap(),
            vec![Phase::Extracting, Phase::Concatenating, Phase::Encoding]
        );
    }
}

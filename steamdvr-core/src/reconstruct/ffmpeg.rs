//! FFmpeg abstraction for both production and simulation use.

use std::path::Path;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::watch;

use super::ReconstructError;
use crate::config::FfmpegConfig;
use crate::encoder::EncodingMode;

/// Seam over the FFmpeg subprocess so reconstruction is testable without a
/// real toolchain.
#[async_trait]
pub trait Ffmpeg: Send + Sync {
    /// Mux the combined video and audio streams into one MP4.
    ///
    /// `FastCopy` stream-copies both streams; re-encode modes apply the
    /// mode's video encoder arguments and copy audio. If `cancel` fires
    /// while the subprocess runs, it is sent a termination signal and its
    /// exit awaited before `ReconstructError::Cancelled` is returned.
    ///
    /// # Errors
    ///
    /// - `ReconstructError::EncodeError` - Subprocess failed; carries stderr
    /// - `ReconstructError::Cancelled` - Cancellation fired mid-run
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        mode: EncodingMode,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), ReconstructError>;
}

/// Resolves once the cancel flag is raised; pends forever otherwise.
pub(crate) async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender dropped without cancelling; nothing left to wait for.
            std::future::pending::<()>().await;
        }
    }
}

/// Production implementation driving the `ffmpeg` binary.
pub struct ProductionFfmpeg {
    config: FfmpegConfig,
}

impl ProductionFfmpeg {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Ffmpeg for ProductionFfmpeg {
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        mode: EncodingMode,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), ReconstructError> {
        let start_time = Instant::now();

        let mut cmd = tokio::process::Command::new(&self.config.binary);
        cmd.arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-i")
            .arg(audio)
            .args(mode.video_args())
            .arg("-c:a")
            .arg("copy")
            .arg("-movflags")
            .arg("+faststart")
            .arg("-f")
            .arg("mp4")
            .arg(output);

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        tracing::debug!("Executing FFmpeg mux ({mode}): {:?}", cmd);

        let mut child = cmd.spawn().map_err(|e| ReconstructError::EncodeError {
            details: format!("failed to spawn {}: {e}", self.config.binary),
        })?;

        // Drain stderr concurrently so a chatty encoder can't fill the pipe
        // and stall the child.
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut text = String::new();
            if let Some(mut stderr) = stderr {
                let _ = stderr.read_to_string(&mut text).await;
            }
            text
        });

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| ReconstructError::EncodeError {
                details: format!("failed to wait on ffmpeg: {e}"),
            })?,
            _ = cancelled(cancel) => {
                tracing::info!("Cancellation: terminating FFmpeg for {}", output.display());
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                return Err(ReconstructError::Cancelled);
            }
            _ = tokio::time::sleep(self.config.mux_timeout) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                stderr_task.abort();
                return Err(ReconstructError::EncodeError {
                    details: format!("ffmpeg timed out after {:?}", self.config.mux_timeout),
                });
            }
        };

        let stderr_text = stderr_task.await.unwrap_or_default();

        if !status.success() {
            tracing::error!("FFmpeg failed with {status}: {stderr_text}");
            return Err(ReconstructError::EncodeError {
                details: format!("ffmpeg exited with {status}: {stderr_text}"),
            });
        }

        let output_size = tokio::fs::metadata(output).await.map(|m| m.len()).unwrap_or(0);
        if output_size == 0 {
            return Err(ReconstructError::EncodeError {
                details: "ffmpeg produced an empty output file".to_string(),
            });
        }

        tracing::info!(
            "Muxed {} ({} bytes) in {:.2}s",
            output.display(),
            output_size,
            start_time.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Simulation implementation for tests.
///
/// Writes the byte-concatenation of both input streams to the output path,
/// so output sizes track input sizes the way FastCopy does, and honors
/// cancellation during its configurable processing delay. Tracks invocation
/// and concurrency counts for scheduler tests.
#[cfg(any(test, feature = "test-utils"))]
pub struct SimulationFfmpeg {
    available: bool,
    delay: std::time::Duration,
    fail_with: Option<String>,
    invocations: std::sync::atomic::AtomicUsize,
    active: std::sync::atomic::AtomicUsize,
    observed_max_active: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl SimulationFfmpeg {
    pub fn new() -> Self {
        Self {
            available: true,
            delay: std::time::Duration::ZERO,
            fail_with: None,
            invocations: std::sync::atomic::AtomicUsize::new(0),
            active: std::sync::atomic::AtomicUsize::new(0),
            observed_max_active: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Simulate per-invocation processing time.
    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Make every invocation fail with the given diagnostic text.
    pub fn failing(mut self, details: impl Into<String>) -> Self {
        self.fail_with = Some(details.into());
        self
    }

    /// Simulate FFmpeg being unavailable.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// How many mux invocations have started.
    pub fn invocations(&self) -> usize {
        self.invocations.load(std::sync::atomic::Ordering::SeqCst)
    }

    /// Highest number of simultaneously running mux invocations observed.
    pub fn observed_max_active(&self) -> usize {
        self.observed_max_active
            .load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
impl Default for SimulationFfmpeg {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl Ffmpeg for SimulationFfmpeg {
    async fn mux(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        _mode: EncodingMode,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<(), ReconstructError> {
        use std::sync::atomic::Ordering;

        self.invocations.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.observed_max_active.fetch_max(now_active, Ordering::SeqCst);

        let result = async {
            if !self.available {
                return Err(ReconstructError::EncodeError {
                    details: "ffmpeg not available in simulation".to_string(),
                });
            }

            if self.delay > std::time::Duration::ZERO {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => {}
                    _ = cancelled(cancel) => return Err(ReconstructError::Cancelled),
                }
            } else if *cancel.borrow() {
                return Err(ReconstructError::Cancelled);
            }

            if let Some(details) = &self.fail_with {
                return Err(ReconstructError::EncodeError {
                    details: details.clone(),
                });
            }

            let mut bytes = tokio::fs::read(video).await?;
            bytes.extend(tokio::fs::read(audio).await?);
            tokio::fs::write(output, bytes).await?;
            Ok(())
        }
        .await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn simulation_concatenates_both_streams() {
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("video.m4s");
        let audio = tmp.path().join("audio.m4s");
        let output = tmp.path().join("out.mp4");
        tokio::fs::write(&video, b"vvvv").await.unwrap();
        tokio::fs::write(&audio, b"aa").await.unwrap();

        let ffmpeg = SimulationFfmpeg::new();
        let (_tx, mut rx) = watch::channel(false);
        ffmpeg
            .mux(&video, &audio, &output, EncodingMode::FastCopy, &mut rx)
            .await
            .unwrap();

        let written = tokio::fs::read(&output).await.unwrap();
        assert_eq!(written, b"vvvvaa");
        assert_eq!(ffmpeg.invocations(), 1);
    }

    #[tokio::test]
    async fn simulation_cancel_interrupts_delay() {
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("video.m4s");
        let audio = tmp.path().join("audio.m4s");
        tokio::fs::write(&video, b"v").await.unwrap();
        tokio::fs::write(&audio, b"a").await.unwrap();

        let ffmpeg = SimulationFfmpeg::new().with_delay(Duration::from_secs(60));
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();

        let result = ffmpeg
            .mux(
                &video,
                &audio,
                &tmp.path().join("out.mp4"),
                EncodingMode::FastCopy,
                &mut rx,
            )
            .await;
        assert!(matches!(result, Err(ReconstructError::Cancelled)));
    }

    #[tokio::test]
    async fn simulation_unavailable_fails_with_diagnostics() {
        let tmp = tempfile::tempdir().unwrap();
        let video = tmp.path().join("video.m4s");
        let audio = tmp.path().join("audio.m4s");
        tokio::fs::write(&video, b"v").await.unwrap();
        tokio::fs::write(&audio, b"a").await.unwrap();

        let ffmpeg = SimulationFfmpeg::new().unavailable();
        let (_tx, mut rx) = watch::channel(false);
        let result = ffmpeg
            .mux(
                &video,
                &audio,
                &tmp.path().join("out.mp4"),
                EncodingMode::FastCopy,
                &mut rx,
            )
            .await;
        assert!(matches!(result, Err(ReconstructError::EncodeError { .. })));
    }
}

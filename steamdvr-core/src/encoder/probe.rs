//! Hardware encoder capability probing.
//!
//! Asks the FFmpeg toolchain which HEVC encoders were compiled in and are
//! usable on this host. Probing is best effort: a failure to detect any one
//! encoder marks it unavailable, never fails the probe as a whole, and
//! `FastCopy` is always reported available since it needs no encoder.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use tokio::sync::Mutex;

use super::mode::EncodingMode;
use super::EncoderError;

/// Detect available encoding modes by inspecting `ffmpeg -encoders`.
///
/// Short-lived probe subprocesses are always awaited to completion, so no
/// zombie processes are left behind even when probing fails. A failed or
/// timed-out listing yields `{FastCopy}`.
pub async fn detect_modes(binary: &str, timeout: Duration) -> HashSet<EncodingMode> {
    let mut command = tokio::process::Command::new(binary);
    command
        .arg("-hide_banner")
        .arg("-encoders")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        // A hung binary must not outlive the timeout below.
        .kill_on_drop(true);

    let listing = match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
        Ok(Ok(output)) => {
            tracing::warn!(
                "FFmpeg encoder listing exited with {}; assuming fast-copy only",
                output.status
            );
            String::new()
        }
        Ok(Err(e)) => {
            tracing::warn!("Failed to run {binary} for encoder probe: {e}");
            String::new()
        }
        Err(_) => {
            tracing::warn!("Encoder probe timed out after {timeout:?}");
            String::new()
        }
    };

    let modes = parse_encoder_listing(&listing);
    tracing::info!(
        "Encoder probe detected {} mode(s): {}",
        modes.len(),
        format_modes(&modes)
    );
    modes
}

/// Parse an `ffmpeg -encoders` listing into the set of usable modes.
///
/// `FastCopy` is unconditionally present.
pub fn parse_encoder_listing(listing: &str) -> HashSet<EncodingMode> {
    let mut modes = HashSet::new();
    modes.insert(EncodingMode::FastCopy);

    for mode in [
        EncodingMode::NvencHevc,
        EncodingMode::AmfHevc,
        EncodingMode::QuickSyncHevc,
        EncodingMode::CpuHevc,
    ] {
        if let Some(codec) = mode.ffmpeg_video_codec()
            && listing.contains(codec)
        {
            modes.insert(mode);
        }
    }

    modes
}

/// Check that the FFmpeg binary runs at all, returning its version line.
///
/// # Errors
///
/// - `EncoderError::FfmpegMissing` - Binary could not be executed
/// - `EncoderError::ProbeFailed` - Binary ran but reported an error
pub async fn verify_installation(binary: &str) -> Result<String, EncoderError> {
    let output = tokio::process::Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await
        .map_err(|_| EncoderError::FfmpegMissing {
            binary: binary.to_string(),
        })?;

    if !output.status.success() {
        return Err(EncoderError::ProbeFailed {
            reason: format!("ffmpeg -version exited with {}", output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().next().unwrap_or("ffmpeg").to_string())
}

/// Probe result holder that runs detection once and caches the answer.
///
/// Owned by whoever drives a batch; never process-global. `refresh` discards
/// the cached result and probes again.
pub struct CachedProbe {
    binary: String,
    timeout: Duration,
    cached: Mutex<Option<HashSet<EncodingMode>>>,
}

impl CachedProbe {
    /// Create a probe for the given FFmpeg binary.
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            cached: Mutex::new(None),
        }
    }

    /// Detected modes, probing on first call and caching afterwards.
    pub async fn detect(&self) -> HashSet<EncodingMode> {
        let mut cached = self.cached.lock().await;
        if let Some(modes) = cached.as_ref() {
            return modes.clone();
        }
        let modes = detect_modes(&self.binary, self.timeout).await;
        *cached = Some(modes.clone());
        modes
    }

    /// Drop the cached result and probe again.
    pub async fn refresh(&self) -> HashSet<EncodingMode> {
        {
            let mut cached = self.cached.lock().await;
            *cached = None;
        }
        self.detect().await
    }
}

fn format_modes(modes: &HashSet<EncodingMode>) -> String {
    let mut names: Vec<String> = modes.iter().map(|m| m.to_string()).collect();
    names.sort();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Trimmed from a real `ffmpeg -hide_banner -encoders` run on a machine
    // with NVENC and libx265 but no AMD or Intel hardware.
    const NVIDIA_LISTING: &str = "\
 V....D libx264              libx264 H.264 / AVC / MPEG-4 AVC
 V....D libx265              libx265 H.265 / HEVC
 V....D h264_nvenc           NVIDIA NVENC H.264 encoder (codec h264)
 V....D hevc_nvenc           NVIDIA NVENC hevc encoder (codec hevc)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn parses_nvenc_and_software_hevc() {
        let modes = parse_encoder_listing(NVIDIA_LISTING);
        assert!(modes.contains(&EncodingMode::FastCopy));
        assert!(modes.contains(&EncodingMode::NvencHevc));
        assert!(modes.contains(&EncodingMode::CpuHevc));
        assert!(!modes.contains(&EncodingMode::AmfHevc));
        assert!(!modes.contains(&EncodingMode::QuickSyncHevc));
    }

    #[test]
    fn empty_listing_still_offers_fast_copy() {
        let modes = parse_encoder_listing("");
        assert_eq!(modes.len(), 1);
        assert!(modes.contains(&EncodingMode::FastCopy));
    }

    #[tokio::test]
    async fn missing_binary_degrades_to_fast_copy() {
        let modes = detect_modes(
            "steamdvr-test-no-such-binary",
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(modes.len(), 1);
        assert!(modes.contains(&EncodingMode::FastCopy));
    }

    #[tokio::test]
    async fn cached_probe_only_runs_once() {
        let probe = CachedProbe::new("steamdvr-test-no-such-binary", Duration::from_secs(5));
        let first = probe.detect().await;
        let second = probe.detect().await;
        assert_eq!(first, second);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timed_out_probe_kills_its_subprocess() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let pid_file = tmp.path().join("pid");
        let binary = tmp.path().join("ffmpeg");
        std::fs::write(
            &binary,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 600\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&binary, std::fs::Permissions::from_mode(0o755)).unwrap();

        let modes = detect_modes(
            binary.to_str().unwrap(),
            Duration::from_millis(300),
        )
        .await;
        assert_eq!(modes.len(), 1);
        assert!(modes.contains(&EncodingMode::FastCopy));

        let pid: u32 = std::fs::read_to_string(&pid_file)
            .unwrap()
            .trim()
            .parse()
            .unwrap();
        // The kill is delivered when the timed-out future drops; give the
        // runtime a moment to reap before asserting the process is gone.
        for _ in 0..50 {
            if !std::process::Command::new("kill")
                .args(["-0", &pid.to_string()])
                .status()
                .unwrap()
                .success()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("probe subprocess (pid {pid}) still running after the probe timed out");
    }
}

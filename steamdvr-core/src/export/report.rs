//! Batch outcome accounting and post-export source deletion.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::library::ClipJob;
use crate::reconstruct::JobResult;

/// Final accounting for one export batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    /// Jobs that produced a playable output file.
    pub succeeded: usize,
    /// Jobs that failed with a layout or encode error.
    pub failed: usize,
    /// Jobs cancelled before or during processing.
    pub cancelled: usize,
    /// Combined size of the source segments of succeeded jobs.
    pub total_bytes_before: u64,
    /// Combined size of the output files of succeeded jobs.
    pub total_bytes_after: u64,
    /// Non-fatal problems worth surfacing, in occurrence order.
    pub warnings: Vec<String>,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.cancelled
    }

    /// True when every job succeeded and nothing was worth warning about.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.cancelled == 0 && self.warnings.is_empty()
    }
}

/// Delete the source directories of fully exported clips.
///
/// A clip directory may hold several recording sessions, each exported as
/// its own job. The directory is removed only when every job it produced
/// succeeded; a failed or cancelled sibling keeps the whole directory on
/// disk. Deletion failures are reported as warnings, never as errors.
pub(crate) async fn delete_exported_sources(finished: &[(ClipJob, JobResult)]) -> Vec<String> {
    let mut fully_succeeded: HashMap<PathBuf, bool> = HashMap::new();
    for (job, result) in finished {
        let entry = fully_succeeded
            .entry(job.source_root.clone())
            .or_insert(true);
        *entry &= result.is_success();
    }

    let mut warnings = Vec::new();
    let mut roots: Vec<_> = fully_succeeded
        .into_iter()
        .filter_map(|(root, ok)| ok.then_some(root))
        .collect();
    roots.sort();

    for root in roots {
        match tokio::fs::remove_dir_all(&root).await {
            Ok(()) => {
                tracing::info!("Deleted source clip directory {}", root.display());
            }
            Err(e) => {
                let warning = format!("Failed to delete source {}: {e}", root.display());
                tracing::warn!("{warning}");
                warnings.push(warning);
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use chrono::Local;

    use super::*;
    use crate::library::ClipKind;
    use crate::reconstruct::FailReason;

    fn job_for(root: &Path) -> ClipJob {
        ClipJob {
            source_root: root.to_path_buf(),
            application_id: "440".to_string(),
            display_name: "Team Fortress 2".to_string(),
            timestamp: Local::now(),
            kind: ClipKind::Manual,
            init_video_segment: root.join("init-stream0.m4s"),
            init_audio_segment: root.join("init-stream1.m4s"),
            video_chunks: Vec::new(),
            audio_chunks: Vec::new(),
            input_bytes: 0,
        }
    }

    fn success() -> JobResult {
        JobResult::Success {
            output_path: PathBuf::from("out.mp4"),
            output_size_bytes: 1,
        }
    }

    #[tokio::test]
    async fn deletes_only_fully_succeeded_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let clean = tmp.path().join("clip_clean");
        let mixed = tmp.path().join("clip_mixed");
        fs::create_dir_all(&clean).unwrap();
        fs::create_dir_all(&mixed).unwrap();

        let finished = vec![
            (job_for(&clean), success()),
            (job_for(&mixed), success()),
            (
                job_for(&mixed),
                JobResult::Failed {
                    reason: FailReason::EncodeError("boom".to_string()),
                },
            ),
        ];

        let warnings = delete_exported_sources(&finished).await;
        assert!(warnings.is_empty());
        assert!(!clean.exists());
        assert!(mixed.exists());
    }

    #[tokio::test]
    async fn missing_root_becomes_warning() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("never_created");

        let warnings = delete_exported_sources(&[(job_for(&gone), success())]).await;
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("never_created"));
    }
}

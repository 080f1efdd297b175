//! Recordings-root walking and clip job construction.
//!
//! Two root layouts are understood, matching where Steam actually puts
//! recordings:
//!
//! - a `userdata` directory: numeric Steam-id children, each with
//!   `gamerecordings/clips` and `gamerecordings/video` subtrees, plus an
//!   optional custom record path configured in `config/localconfig.vdf`;
//! - a recordings directory itself (`clips`, `video`, or any directory whose
//!   children are clip folders named `<prefix>_<appid>_<date>_<time>`).
//!
//! Each clip folder holds one or more session data directories (identified
//! by a `session.mpd` manifest) with the actual init segments and numbered
//! chunks. Every session directory becomes one [`ClipJob`]; clips with a
//! broken layout are logged, counted, and skipped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

use super::clip::{ClipJob, ClipKind};
use super::names::AppNames;
use super::LibraryError;

const SESSION_MANIFEST: &str = "session.mpd";
const VIDEO_STREAM: usize = 0;
const AUDIO_STREAM: usize = 1;

/// Result of scanning the recordings roots.
#[derive(Debug)]
pub struct ScanOutcome {
    /// Valid jobs, newest first
    pub jobs: Vec<ClipJob>,
    /// Session directories rejected for an invalid layout
    pub skipped: usize,
}

/// Walks recordings roots and yields structured clip jobs.
pub struct ClipLocator {
    roots: Vec<PathBuf>,
    names: AppNames,
}

impl ClipLocator {
    /// Create a locator over the given roots.
    pub fn new(roots: Vec<PathBuf>, names: AppNames) -> Self {
        Self { roots, names }
    }

    /// Scan all roots and build jobs for every playable session.
    ///
    /// # Errors
    ///
    /// - `LibraryError::RootNotFound` - A configured root does not exist
    /// - `LibraryError::Io` - Directory listing failed
    pub async fn scan(&self) -> Result<ScanOutcome, LibraryError> {
        let mut jobs = Vec::new();
        let mut skipped = 0usize;

        for root in &self.roots {
            if !root.is_dir() {
                return Err(LibraryError::RootNotFound { path: root.clone() });
            }

            for (clip_dir, kind) in collect_clip_dirs(root).await? {
                let sessions = session_dirs(&clip_dir).await?;
                if sessions.is_empty() {
                    tracing::warn!("No session manifest under {}, skipping", clip_dir.display());
                    skipped += 1;
                    continue;
                }

                for session_dir in sessions {
                    match build_job(&clip_dir, &session_dir, kind, &self.names).await {
                        Ok(job) => jobs.push(job),
                        Err(LibraryError::InvalidLayout { path, reason }) => {
                            tracing::warn!("Skipping {}: {reason}", path.display());
                            skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        jobs.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        tracing::info!(
            "Located {} exportable session(s), skipped {} invalid",
            jobs.len(),
            skipped
        );
        Ok(ScanOutcome { jobs, skipped })
    }
}

/// Gather clip folders under one root, tagged manual/background.
async fn collect_clip_dirs(root: &Path) -> Result<Vec<(PathBuf, ClipKind)>, LibraryError> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    // The root may itself be a directory of clip folders.
    push_clip_children(root, kind_for_dir(root), &mut found, &mut seen).await?;

    // Or a recordings directory with clips/video subtrees.
    for (sub, kind) in [("clips", ClipKind::Manual), ("video", ClipKind::Background)] {
        let dir = root.join(sub);
        if dir.is_dir() {
            push_clip_children(&dir, kind, &mut found, &mut seen).await?;
        }
    }

    // Or a Steam userdata directory: numeric account dirs with
    // gamerecordings underneath, possibly redirected to a custom path.
    let mut entries = tokio::fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_account_dir = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
        if !is_account_dir {
            continue;
        }

        let mut record_bases = vec![path.join("gamerecordings")];
        if let Some(custom) = custom_record_path(&path).await {
            tracing::debug!("Custom record path for {}: {}", path.display(), custom.display());
            record_bases.push(custom);
        }

        for base in record_bases {
            for (sub, kind) in [("clips", ClipKind::Manual), ("video", ClipKind::Background)] {
                let dir = base.join(sub);
                if dir.is_dir() {
                    push_clip_children(&dir, kind, &mut found, &mut seen).await?;
                }
            }
        }
    }

    Ok(found)
}

/// Append child directories that look like clip folders (`name_with_underscores`).
async fn push_clip_children(
    dir: &Path,
    kind: ClipKind,
    found: &mut Vec<(PathBuf, ClipKind)>,
    seen: &mut HashSet<PathBuf>,
) -> Result<(), LibraryError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_clip_folder = path.is_dir()
            && path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains('_'));
        if is_clip_folder && seen.insert(path.clone()) {
            found.push((path, kind));
        }
    }
    Ok(())
}

fn kind_for_dir(dir: &Path) -> ClipKind {
    match dir.file_name().and_then(|n| n.to_str()) {
        Some("video") => ClipKind::Background,
        _ => ClipKind::Manual,
    }
}

/// Find every directory under a clip folder that carries a session manifest.
async fn session_dirs(clip_dir: &Path) -> Result<Vec<PathBuf>, LibraryError> {
    let mut sessions = Vec::new();
    let mut stack = vec![clip_dir.to_path_buf()];

    while let Some(dir) = stack.pop() {
        if dir.join(SESSION_MANIFEST).is_file() {
            sessions.push(dir);
            continue;
        }
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            }
        }
    }

    sessions.sort();
    Ok(sessions)
}

/// Resolve a custom `BackgroundRecordPath` from a Steam account's
/// `config/localconfig.vdf`, if one is configured.
async fn custom_record_path(account_dir: &Path) -> Option<PathBuf> {
    let localconfig = account_dir.join("config").join("localconfig.vdf");
    let text = tokio::fs::read_to_string(&localconfig).await.ok()?;

    for line in text.lines() {
        let Some((_, rest)) = line.split_once("\"BackgroundRecordPath\"") else {
            continue;
        };
        let value = rest.trim().trim_matches(|c| c == '"' || c == ' ');
        if !value.is_empty() {
            return Some(PathBuf::from(value));
        }
    }
    None
}

/// Build a job from one session directory of a clip folder.
async fn build_job(
    clip_dir: &Path,
    session_dir: &Path,
    kind: ClipKind,
    names: &AppNames,
) -> Result<ClipJob, LibraryError> {
    let folder_name = clip_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let application_id = folder_name
        .split('_')
        .nth(1)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| LibraryError::InvalidLayout {
            path: clip_dir.to_path_buf(),
            reason: "folder name carries no application id".to_string(),
        })?
        .to_string();

    let timestamp = clip_timestamp(clip_dir, folder_name).await;

    let init_video_segment = session_dir.join(format!("init-stream{VIDEO_STREAM}.m4s"));
    let init_audio_segment = session_dir.join(format!("init-stream{AUDIO_STREAM}.m4s"));
    let video_chunks = collect_chunks(session_dir, VIDEO_STREAM).await?;
    let audio_chunks = collect_chunks(session_dir, AUDIO_STREAM).await?;

    let mut input_bytes = 0u64;
    for path in [&init_video_segment, &init_audio_segment]
        .into_iter()
        .chain(video_chunks.iter())
        .chain(audio_chunks.iter())
    {
        if let Ok(metadata) = tokio::fs::metadata(path).await {
            input_bytes += metadata.len();
        }
    }

    let job = ClipJob {
        source_root: clip_dir.to_path_buf(),
        display_name: names.resolve(&application_id),
        application_id,
        timestamp,
        kind,
        init_video_segment,
        init_audio_segment,
        video_chunks,
        audio_chunks,
        input_bytes,
    };
    job.validate()?;
    Ok(job)
}

/// Capture time: directory mtime, with the `YYYYMMDD_HHMMSS` folder-name
/// suffix as fallback when mtime is unreadable.
async fn clip_timestamp(clip_dir: &Path, folder_name: &str) -> DateTime<Local> {
    if let Ok(metadata) = tokio::fs::metadata(clip_dir).await
        && let Ok(modified) = metadata.modified()
    {
        return DateTime::<Local>::from(modified);
    }

    let parts: Vec<&str> = folder_name.split('_').collect();
    if parts.len() >= 3 {
        let raw = format!("{}{}", parts[parts.len() - 2], parts[parts.len() - 1]);
        if let Ok(naive) = NaiveDateTime::parse_from_str(&raw, "%Y%m%d%H%M%S")
            && let Some(local) = Local.from_local_datetime(&naive).earliest()
        {
            return local;
        }
    }

    tracing::warn!(
        "No usable timestamp for {}, falling back to now",
        clip_dir.display()
    );
    Local::now()
}

/// Data chunks of one stream, ordered by the embedded sequence number.
///
/// Lexicographic order is wrong here: Steam does not zero-pad sequence
/// numbers consistently, so `chunk-stream0-10.m4s` must sort after
/// `chunk-stream0-9.m4s`. Gaps in the numbering are kept as-is.
async fn collect_chunks(session_dir: &Path, stream: usize) -> Result<Vec<PathBuf>, LibraryError> {
    let prefix = format!("chunk-stream{stream}-");
    let mut numbered: Vec<(u64, PathBuf)> = Vec::new();

    let mut entries = tokio::fs::read_dir(session_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(middle) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".m4s"))
        else {
            continue;
        };
        match middle.parse::<u64>() {
            Ok(sequence) => numbered.push((sequence, path)),
            Err(_) => {
                tracing::debug!("Ignoring chunk with unparsable sequence: {name}");
            }
        }
    }

    numbered.sort_by_key(|(sequence, _)| *sequence);
    Ok(numbered.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    /// Write a session directory with init segments and the given chunk
    /// sequence numbers for both streams.
    fn write_session(dir: &Path, video_seqs: &[u64], audio_seqs: &[u64]) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("session.mpd"), b"<MPD/>").unwrap();
        fs::write(dir.join("init-stream0.m4s"), b"vinit").unwrap();
        fs::write(dir.join("init-stream1.m4s"), b"ainit").unwrap();
        for seq in video_seqs {
            fs::write(dir.join(format!("chunk-stream0-{seq}.m4s")), b"v").unwrap();
        }
        for seq in audio_seqs {
            fs::write(dir.join(format!("chunk-stream1-{seq}.m4s")), b"a").unwrap();
        }
    }

    #[tokio::test]
    async fn chunks_sort_numerically_not_lexicographically() {
        let tmp = tempfile::tempdir().unwrap();
        let clip = tmp.path().join("clips").join("clip_440_20250103_181530");
        write_session(&clip.join("data"), &[10, 2, 1], &[1]);

        let locator = ClipLocator::new(vec![tmp.path().to_path_buf()], AppNames::empty());
        let outcome = locator.scan().await.unwrap();

        assert_eq!(outcome.jobs.len(), 1);
        let names: Vec<String> = outcome.jobs[0]
            .video_chunks
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "chunk-stream0-1.m4s",
                "chunk-stream0-2.m4s",
                "chunk-stream0-10.m4s"
            ]
        );
    }

    #[tokio::test]
    async fn missing_audio_init_is_counted_as_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let session = tmp
            .path()
            .join("clips")
            .join("clip_440_20250103_181530")
            .join("data");
        write_session(&session, &[1], &[1]);
        fs::remove_file(session.join("init-stream1.m4s")).unwrap();

        let locator = ClipLocator::new(vec![tmp.path().to_path_buf()], AppNames::empty());
        let outcome = locator.scan().await.unwrap();

        assert!(outcome.jobs.is_empty());
        assert_eq!(outcome.skipped, 1);
    }

    #[tokio::test]
    async fn userdata_layout_tags_clip_kinds() {
        let tmp = tempfile::tempdir().unwrap();
        let recordings = tmp.path().join("1234567").join("gamerecordings");
        write_session(
            &recordings.join("clips").join("clip_440_20250101_120000").join("d"),
            &[1],
            &[1],
        );
        write_session(
            &recordings.join("video").join("bg_730_20250102_120000").join("d"),
            &[1],
            &[1],
        );

        let locator = ClipLocator::new(vec![tmp.path().to_path_buf()], AppNames::empty());
        let outcome = locator.scan().await.unwrap();

        assert_eq!(outcome.jobs.len(), 2);
        // Newest first: the background recording has the later name-derived
        // ordering but both share a scan-time mtime, so look up by id.
        let manual = outcome
            .jobs
            .iter()
            .find(|j| j.application_id == "440")
            .unwrap();
        let background = outcome
            .jobs
            .iter()
            .find(|j| j.application_id == "730")
            .unwrap();
        assert_eq!(manual.kind, ClipKind::Manual);
        assert_eq!(background.kind, ClipKind::Background);
    }

    #[tokio::test]
    async fn custom_record_path_is_followed() {
        let tmp = tempfile::tempdir().unwrap();
        let custom = tempfile::tempdir().unwrap();
        write_session(
            &custom.path().join("clips").join("clip_570_20250101_100000").join("d"),
            &[1],
            &[1],
        );

        let account = tmp.path().join("1234567");
        fs::create_dir_all(account.join("gamerecordings")).unwrap();
        fs::create_dir_all(account.join("config")).unwrap();
        fs::write(
            account.join("config").join("localconfig.vdf"),
            format!(
                "\"UserLocalConfigStore\"\n{{\n\t\"BackgroundRecordPath\"\t\t\"{}\"\n}}\n",
                custom.path().display()
            ),
        )
        .unwrap();

        let locator = ClipLocator::new(vec![tmp.path().to_path_buf()], AppNames::empty());
        let outcome = locator.scan().await.unwrap();

        assert_eq!(outcome.jobs.len(), 1);
        assert_eq!(outcome.jobs[0].application_id, "570");
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let locator = ClipLocator::new(
            vec![PathBuf::from("/definitely/not/here")],
            AppNames::empty(),
        );
        let err = locator.scan().await.unwrap_err();
        assert!(matches!(err, LibraryError::RootNotFound { .. }));
    }
}

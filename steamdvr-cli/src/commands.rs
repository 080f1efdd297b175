//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;

use clap::Subcommand;
use steamdvr_core::config::SteamDvrConfig;
use steamdvr_core::encoder::{CachedProbe, EncodingMode, verify_installation};
use steamdvr_core::export::{ExportOptions, ExportScheduler, ProgressEvent, Summary};
use steamdvr_core::library::{AppNames, ClipLocator};
use steamdvr_core::reconstruct::{JobResult, ProductionFfmpeg, SegmentReconstructor};
use steamdvr_core::{Result, SteamDvrError};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Detect which encoders the local FFmpeg installation provides
    Probe {
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List exportable clips found under the recordings roots
    List {
        /// Recordings root to scan (repeatable)
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,
        /// JSON file mapping application ids to display names
        #[arg(long)]
        names: Option<PathBuf>,
        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Export clips to MP4 files
    Export {
        /// Recordings root to scan (repeatable)
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,
        /// Directory receiving the exported files
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
        /// Encoding mode; falls back to fast-copy if unavailable
        #[arg(short, long, default_value = "fast-copy")]
        mode: EncodingMode,
        /// Number of clips to process in parallel (1-16)
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// JSON file mapping application ids to display names
        #[arg(long)]
        names: Option<PathBuf>,
        /// Delete source clip directories after successful export
        #[arg(long)]
        delete_sources: bool,
        /// Print a machine-readable JSON summary instead of text
        #[arg(long)]
        json: bool,
    },
}

/// Outcome of a command, mapped to the process exit code.
pub enum CommandOutcome {
    Clean,
    Degraded,
}

impl CommandOutcome {
    pub fn code(&self) -> i32 {
        match self {
            CommandOutcome::Clean => 0,
            CommandOutcome::Degraded => 1,
        }
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> Result<CommandOutcome> {
    match command {
        Commands::Probe { json } => probe_encoders(json).await,
        Commands::List { root, names, json } => list_clips(root, names, json).await,
        Commands::Export {
            root,
            output,
            mode,
            concurrency,
            names,
            delete_sources,
            json,
        } => export_clips(root, output, mode, concurrency, names, delete_sources, json).await,
    }
}

/// Probe the local FFmpeg installation for usable encoders
async fn probe_encoders(json: bool) -> Result<CommandOutcome> {
    let config = SteamDvrConfig::default();
    let version = verify_installation(&config.ffmpeg.binary).await?;
    let probe = CachedProbe::new(config.ffmpeg.binary.as_str(), config.ffmpeg.probe_timeout);
    let modes = probe.detect().await;

    let available: Vec<EncodingMode> = EncodingMode::ALL
        .iter()
        .copied()
        .filter(|mode| modes.contains(mode))
        .collect();

    if json {
        let listing: Vec<String> = available.iter().map(|mode| mode.to_string()).collect();
        print_json(&serde_json::json!({
            "ffmpeg": version,
            "modes": listing,
        }))?;
    } else {
        println!("FFmpeg: {version}");
        println!("Available encoding modes:");
        for mode in available {
            println!("  {mode}");
        }
    }
    Ok(CommandOutcome::Clean)
}

/// List exportable clips without touching them
async fn list_clips(
    roots: Vec<PathBuf>,
    names: Option<PathBuf>,
    json: bool,
) -> Result<CommandOutcome> {
    let names = load_names(names).await?;
    let outcome = ClipLocator::new(roots, names).scan().await?;

    if json {
        let listing: Vec<_> = outcome
            .jobs
            .iter()
            .map(|job| {
                serde_json::json!({
                    "name": job.output_file_name(0),
                    "application_id": job.application_id.clone(),
                    "kind": format!("{:?}", job.kind),
                    "source": job.source_root.display().to_string(),
                    "input_bytes": job.input_bytes,
                })
            })
            .collect();
        print_json(&listing)?;
    } else {
        for job in &outcome.jobs {
            println!(
                "{}  ({:.1} MB)",
                job.output_file_name(0),
                job.input_bytes as f64 / 1_000_000.0
            );
        }
        println!("{} clip(s) found", outcome.jobs.len());
        if outcome.skipped > 0 {
            println!("{} clip(s) skipped due to invalid layout", outcome.skipped);
        }
    }
    Ok(CommandOutcome::Clean)
}

/// Run a full export batch, streaming progress to the console
#[allow(clippy::too_many_arguments)]
async fn export_clips(
    roots: Vec<PathBuf>,
    output: PathBuf,
    mode: EncodingMode,
    concurrency: Option<usize>,
    names: Option<PathBuf>,
    delete_sources: bool,
    json: bool,
) -> Result<CommandOutcome> {
    let config = SteamDvrConfig::default();
    verify_installation(&config.ffmpeg.binary).await?;
    let probe = CachedProbe::new(config.ffmpeg.binary.as_str(), config.ffmpeg.probe_timeout);
    let available = probe.detect().await;

    let names = load_names(names).await?;
    let scan = ClipLocator::new(roots, names).scan().await?;
    if scan.skipped > 0 {
        eprintln!("Skipping {} clip(s) with invalid layout", scan.skipped);
    }
    if scan.jobs.is_empty() {
        println!("No exportable clips found");
        return Ok(CommandOutcome::Clean);
    }

    let temp_dir = config
        .export
        .temp_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("steamdvr"));
    let ffmpeg = Arc::new(ProductionFfmpeg::new(config.ffmpeg.clone()));
    let reconstructor = Arc::new(SegmentReconstructor::new(ffmpeg, temp_dir));
    let scheduler = ExportScheduler::new(reconstructor, available);

    let options = ExportOptions {
        mode,
        concurrency: concurrency.unwrap_or(config.export.default_concurrency),
        output_dir: output,
        delete_sources,
    };
    let (handle, mut events) = scheduler
        .start(scan.jobs, options)
        .map_err(SteamDvrError::Export)?;

    let mut cancel_requested = false;
    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(ProgressEvent::BatchFinished { .. }) | None => break,
                    Some(event) => {
                        if !json {
                            print_event(&event);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !cancel_requested => {
                eprintln!("Cancelling, waiting for running exports to stop...");
                handle.cancel();
                cancel_requested = true;
            }
        }
    }

    let summary = handle.wait().await.map_err(SteamDvrError::Export)?;
    if json {
        print_json(&summary)?;
    } else {
        print_summary(&summary);
    }

    if summary.failed > 0 || summary.cancelled > 0 {
        Ok(CommandOutcome::Degraded)
    } else {
        Ok(CommandOutcome::Clean)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let text =
        serde_json::to_string_pretty(value).map_err(|e| SteamDvrError::Configuration {
            reason: format!("failed to encode JSON output: {e}"),
        })?;
    println!("{text}");
    Ok(())
}

async fn load_names(path: Option<PathBuf>) -> Result<AppNames> {
    match path {
        Some(path) => Ok(AppNames::load(&path).await?),
        None => Ok(AppNames::empty()),
    }
}

fn print_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::BatchStarted { total, mode } => {
            println!("Exporting {total} clip(s) with {mode}");
        }
        ProgressEvent::Warning { message } => {
            eprintln!("Warning: {message}");
        }
        ProgressEvent::JobStarted { job, counts } => {
            println!(
                "[{}/{}] {} ...",
                counts.completed + counts.active,
                counts.total,
                job.display_name
            );
        }
        ProgressEvent::JobFinished { job, result, counts } => match result {
            JobResult::Success { output_path, .. } => {
                println!(
                    "[{}/{}] {} -> {}",
                    counts.completed,
                    counts.total,
                    job.display_name,
                    output_path.display()
                );
            }
            JobResult::Failed { reason } => {
                eprintln!(
                    "[{}/{}] {} failed: {reason}",
                    counts.completed, counts.total, job.display_name
                );
            }
            JobResult::Cancelled => {
                println!(
                    "[{}/{}] {} cancelled",
                    counts.completed, counts.total, job.display_name
                );
            }
        },
        // Phase transitions are debug-level detail
        ProgressEvent::JobPhase { job, phase, .. } => {
            tracing::debug!("{}: {phase}", job.display_name);
        }
        ProgressEvent::BatchFinished { .. } => {}
    }
}

fn print_summary(summary: &Summary) {
    println!(
        "Done: {} succeeded, {} failed, {} cancelled",
        summary.succeeded, summary.failed, summary.cancelled
    );
    if summary.succeeded > 0 {
        println!(
            "Size: {:.1} MB -> {:.1} MB",
            summary.total_bytes_before as f64 / 1_000_000.0,
            summary.total_bytes_after as f64 / 1_000_000.0
        );
    }
    for warning in &summary.warnings {
        eprintln!("Warning: {warning}");
    }
}

use anyhow::{bail, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aurora::{
    CaptureBackend, FailureLog, FfmpegCapture, FinalizationPipeline, FollowRecorder,
    HttpRemotePlayback, RemotePlayback, SequentialDriver, Settings, SourceRef,
};

/// Record remote playback to tagged FLAC files, one file per track.
#[derive(Parser, Debug)]
#[command(name = "aurora", version)]
struct Cli {
    /// Single track link/URI, or a text file with one link per line
    source: Option<String>,

    /// Playlist link/URI for sequential recording
    #[arg(long)]
    playlist: Option<String>,

    /// Album link/URI for sequential recording
    #[arg(long)]
    album: Option<String>,

    /// Start recording from this track index (1-based)
    #[arg(long = "track-no", default_value_t = 1)]
    track_no: usize,

    /// Follow whatever the player plays instead of driving a queue
    #[arg(long)]
    follow: bool,

    /// Override the capture input device
    #[arg(long)]
    device: Option<String>,

    /// Override the capture tool path
    #[arg(long = "capture-tool")]
    capture_tool: Option<String>,

    /// Override the output base directory
    #[arg(long)]
    out: Option<PathBuf>,

    /// Disable the header rewrite step
    #[arg(long = "no-rewrite")]
    no_rewrite: bool,

    /// Configuration file
    #[arg(long, default_value = "config/aurora")]
    config: String,
}

/// Internal files that must never be fed back in as a link list.
const RESERVED_INPUTS: &[&str] = &["failed_tracks.txt"];

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    info!("Aurora Recorder v{}", env!("CARGO_PKG_VERSION"));
    info!("Notice: recording streams may violate Terms of Service.");
    info!("Use only for personal/private purposes and comply with local laws.");

    let mut settings = Settings::load(&cli.config)?;
    if let Some(device) = &cli.device {
        settings.recording.audio_device = device.clone();
    }
    if let Some(tool) = &cli.capture_tool {
        settings.recording.capture_tool_path = tool.clone();
    }
    if let Some(out) = &cli.out {
        settings.recording.output_directory = out.clone();
    }
    if cli.no_rewrite {
        settings.recording.rewrite_headers_enabled = false;
    }
    let settings = Arc::new(settings);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupt received, shutting down");
                cancel.cancel();
            }
        });
    }

    let remote: Arc<dyn RemotePlayback> =
        Arc::new(HttpRemotePlayback::new(&settings.upstream)?);
    let backend: Arc<dyn CaptureBackend> = Arc::new(FfmpegCapture::new(
        settings.recording.capture_tool_path.clone(),
    ));
    let failures = FailureLog::new(
        settings
            .recording
            .output_directory
            .join(aurora::fs::FAILED_TRACKS),
    );
    let pipeline = FinalizationPipeline::spawn(settings.clone(), failures.clone())?;

    let result = if cli.follow {
        let mut follower = FollowRecorder::new(
            settings.clone(),
            remote.clone(),
            backend.clone(),
            pipeline.sender(),
        );
        follower.run(&cancel).await
    } else {
        let mut driver = SequentialDriver::new(
            settings.clone(),
            remote.clone(),
            backend.clone(),
            pipeline.sender(),
            failures.clone(),
        );
        run_sources(&cli, &mut driver, &cancel).await
    };

    // All sender clones are gone once the driver/follower is dropped, so
    // the pipeline can drain and stop.
    pipeline.shutdown().await?;
    result
}

async fn run_sources(
    cli: &Cli,
    driver: &mut SequentialDriver,
    cancel: &CancellationToken,
) -> Result<()> {
    if let Some(collection) = cli.album.as_deref().or(cli.playlist.as_deref()) {
        let source = match SourceRef::parse(collection) {
            Some(source) => source,
            None => bail!("Invalid or unsupported album/playlist link: {collection}"),
        };
        let summary = driver.run(&source, cli.track_no, cancel).await?;
        info!(
            "Done: {} recorded, {} skipped, {} failed",
            summary.recorded, summary.skipped, summary.failed
        );
        return Ok(());
    }

    let Some(input) = cli.source.as_deref() else {
        bail!("No source given. Pass a track/playlist/album link or a links file.");
    };

    let path = std::path::Path::new(input);
    let is_links_file = path.is_file()
        && path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("txt"))
            .unwrap_or(false);

    if is_links_file {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if RESERVED_INPUTS.contains(&name.as_str()) {
            bail!("{name} is a reserved internal file and cannot be used as input");
        }

        let content = std::fs::read_to_string(path)?;
        let links: Vec<&str> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        info!("{} link(s) loaded from {}", links.len(), name);

        for (i, link) in links.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            info!("({}/{}) {}", i + 1, links.len(), link);
            match SourceRef::parse(link) {
                Some(source) => {
                    let summary = driver.run(&source, cli.track_no, cancel).await?;
                    info!(
                        "Done: {} recorded, {} skipped, {} failed",
                        summary.recorded, summary.skipped, summary.failed
                    );
                }
                None => warn!("Invalid or unsupported link: {link}"),
            }
        }
        return Ok(());
    }

    match SourceRef::parse(input) {
        Some(source) => {
            let summary = driver.run(&source, cli.track_no, cancel).await?;
            info!(
                "Done: {} recorded, {} skipped, {} failed",
                summary.recorded, summary.skipped, summary.failed
            );
            Ok(())
        }
        None => bail!("Invalid or unsupported track link: {input}"),
    }
}

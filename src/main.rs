use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use encore::{
    util, AppProfile, ChromiumDriver, EventStore, PageDriver, RecordingOptions, RecordingSession,
    SessionId, SessionReplayer, SnapshotStore, StageLoader,
};

#[derive(Parser)]
#[command(name = "encore", version, about = "Record, replay, and stage-isolate browser sessions")]
struct Cli {
    /// Override the data directory (default ~/.encore)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record a session against a page
    Record {
        /// HTML file or URL to drive
        html: String,
        /// Target-app profile (enables stage labels and snapshot capture)
        #[arg(long)]
        profile: Option<PathBuf>,
        /// Capture stage snapshots while recording (requires --profile)
        #[arg(long)]
        capture_snapshots: bool,
        #[arg(long)]
        headless: bool,
        #[arg(long, default_value = "recordings")]
        recordings_dir: PathBuf,
        #[arg(long, default_value = "snapshots")]
        snapshots_dir: PathBuf,
    },
    /// Replay a recorded session
    Replay {
        /// Session id of the recording
        session: String,
        /// Page override; defaults to the page stored in the recording
        #[arg(long)]
        html: Option<String>,
        /// Playback speed multiplier (2.0 compresses, 0.5 stretches)
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
        #[arg(long)]
        headless: bool,
        /// Stop all page timers once the replay finishes
        #[arg(long)]
        freeze: bool,
        #[arg(long, default_value = "recordings")]
        recordings_dir: PathBuf,
    },
    /// List recorded sessions
    List {
        #[arg(long, default_value = "recordings")]
        recordings_dir: PathBuf,
    },
    /// List captured stage snapshots for a session
    Stages {
        session: String,
        #[arg(long)]
        profile: Option<PathBuf>,
        #[arg(long, default_value = "snapshots")]
        snapshots_dir: PathBuf,
    },
    /// Restore a stage snapshot and hand control back to the app
    LoadStage {
        session: String,
        /// Stage to enter; consumes the snapshot for the preceding stage
        stage: i64,
        #[arg(long)]
        html: String,
        #[arg(long)]
        profile: PathBuf,
        #[arg(long)]
        headless: bool,
        #[arg(long, default_value = "snapshots")]
        snapshots_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    util::init_data_dir(cli.data_dir.clone());

    // Initialize logging to file (~/.encore/logs/encore.log)
    fs::create_dir_all(util::logs_dir())?;

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(util::log_file_path())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(log_file)
        .with_ansi(false) // Disable ANSI colors in log file
        .init();

    match cli.command {
        Command::Record {
            html,
            profile,
            capture_snapshots,
            headless,
            recordings_dir,
            snapshots_dir,
        } => {
            record(
                html,
                profile,
                capture_snapshots,
                headless,
                recordings_dir,
                snapshots_dir,
            )
            .await
        }
        Command::Replay {
            session,
            html,
            speed,
            headless,
            freeze,
            recordings_dir,
        } => replay(session, html, speed, headless, freeze, recordings_dir).await,
        Command::List { recordings_dir } => list(recordings_dir),
        Command::Stages {
            session,
            profile,
            snapshots_dir,
        } => stages(session, profile, snapshots_dir),
        Command::LoadStage {
            session,
            stage,
            html,
            profile,
            headless,
            snapshots_dir,
        } => load_stage(session, stage, html, profile, headless, snapshots_dir).await,
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let handle = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
    token
}

async fn record(
    html: String,
    profile_path: Option<PathBuf>,
    capture_snapshots: bool,
    headless: bool,
    recordings_dir: PathBuf,
    snapshots_dir: PathBuf,
) -> Result<()> {
    let profile = profile_path
        .as_deref()
        .map(AppProfile::load)
        .transpose()?;
    if capture_snapshots && profile.is_none() {
        anyhow::bail!("--capture-snapshots requires --profile");
    }

    let mut session = RecordingSession::new(
        html.clone(),
        EventStore::new(recordings_dir),
        SnapshotStore::new(snapshots_dir),
    )
    .with_options(RecordingOptions {
        capture_snapshots,
        ..RecordingOptions::default()
    });
    if let Some(profile) = profile {
        session = session.with_profile(profile);
    }

    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::launch(headless).await?);

    println!("Recording {html}");
    println!("Interact with the page; press Ctrl+S in the page (or close it) to save.");

    let cancel = cancel_on_ctrl_c();
    let summary = session.record(driver, &cancel).await?;

    println!(
        "Saved {} ({} events, {:.1}s) -> {}",
        summary.session_id,
        summary.event_count,
        summary.duration_seconds,
        summary.path.display()
    );
    if !summary.stages_captured.is_empty() {
        println!("Stages captured: {:?}", summary.stages_captured);
    }
    Ok(())
}

async fn replay(
    session: String,
    html: Option<String>,
    speed: f64,
    headless: bool,
    freeze: bool,
    recordings_dir: PathBuf,
) -> Result<()> {
    let store = EventStore::new(recordings_dir);
    let recording = store.load(&SessionId::from_string(session))?;
    let target = html.unwrap_or_else(|| recording.html_path.clone());

    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::launch(headless).await?);
    driver.navigate(&util::page_url(&target)).await?;

    println!(
        "Replaying {} ({} events, {:.1}s at {speed}x)",
        recording.session_id,
        recording.events.len(),
        recording.duration_seconds
    );

    let cancel = cancel_on_ctrl_c();
    let replayer = SessionReplayer::new();
    let summary = replayer.replay(&recording, &driver, speed, &cancel).await?;

    println!(
        "Replay {}: {}/{} events dispatched, {} failed, {:.1}s",
        if summary.cancelled { "cancelled" } else { "complete" },
        summary.dispatched,
        summary.events_total,
        summary.failed,
        summary.wall_clock.as_secs_f64()
    );

    if freeze && !summary.cancelled {
        replayer.freeze_page(&driver).await?;
        println!("Page timers stopped.");
    }

    if !summary.cancelled {
        println!("Browser stays open; press Ctrl+C to exit.");
        cancel.cancelled().await;
    }
    Ok(())
}

fn list(recordings_dir: PathBuf) -> Result<()> {
    let store = EventStore::new(recordings_dir);
    let sessions = store.list()?;
    if sessions.is_empty() {
        println!("No recordings found in {}", store.root().display());
        return Ok(());
    }

    println!("Recordings in {}:", store.root().display());
    for id in sessions {
        match store.load(&id) {
            Ok(recording) => println!(
                "  {}  {:.1}s, {} events, {}",
                id,
                recording.duration_seconds,
                recording.events.len(),
                recording.started_at.format("%Y-%m-%d %H:%M:%S")
            ),
            Err(err) => println!("  {id}  (unreadable: {err})"),
        }
    }
    Ok(())
}

fn stages(session: String, profile_path: Option<PathBuf>, snapshots_dir: PathBuf) -> Result<()> {
    let store = SnapshotStore::new(snapshots_dir);
    let profile = profile_path
        .as_deref()
        .map(AppProfile::load)
        .transpose()?;

    let session = SessionId::from_string(session);
    let numbers = store.stage_numbers(&session)?;
    if numbers.is_empty() {
        println!("No snapshots captured for {session}");
        return Ok(());
    }

    println!("Stages captured for {session}:");
    for stage in numbers {
        let label = profile
            .as_ref()
            .map(|p| p.stage_name(stage))
            .unwrap_or_else(|| format!("stage {stage}"));
        let snapshot = store.load(&session, stage)?;
        println!("  {stage}  {label}  (at {:.1}s)", snapshot.captured_at);
    }
    Ok(())
}

async fn load_stage(
    session: String,
    stage: i64,
    html: String,
    profile_path: PathBuf,
    headless: bool,
    snapshots_dir: PathBuf,
) -> Result<()> {
    let profile = AppProfile::load(&profile_path)?;
    let loader = StageLoader::new(SnapshotStore::new(snapshots_dir), profile.clone());
    let session = SessionId::from_string(session);

    let driver: Arc<dyn PageDriver> = Arc::new(ChromiumDriver::launch(headless).await?);
    driver.navigate(&util::page_url(&html)).await?;
    // Let the app's own startup settle before overwriting its state.
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;

    let report = loader.load_stage(&session, stage, &driver).await?;

    println!(
        "Loaded {} at stage {} ({}) from the stage-{} snapshot",
        session,
        report.target_stage,
        profile.stage_name(report.target_stage),
        report.restored_stage
    );
    println!(
        "  {} variables injected, markup {}",
        report.injected,
        if report.markup_restored { "restored" } else { "not restored" }
    );
    if !report.failed.is_empty() {
        println!("  Failed injections: {}", report.failed.join(", "));
    }
    if !report.entry_invoked {
        println!("  No entry hook invoked for stage {stage}");
    }

    println!("Browser stays open; press Ctrl+C to exit.");
    cancel_on_ctrl_c().cancelled().await;
    Ok(())
}

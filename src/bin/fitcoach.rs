//! CLI binary for fitcoach.

use clap::{Args, Parser, Subcommand};
use fitcoach::capture::{FrameSource, ImageSequenceSource, StillFrameSource};
use fitcoach::chat::TrainerChatClient;
use fitcoach::evaluation::EvaluationClient;
use fitcoach::server::{StaticSiteServer, effective_port};
use fitcoach::shell::{FrameSourceFactory, Session};
use fitcoach::speech::{CpalSink, sink_from_config, synthesizer_from_config};
use fitcoach::viewport::{HeadlessBackend, VrmModel, loader_from_config};
use fitcoach::{
    AppShell, CoachConfig, ShellServices, TrainerCatalog, TrainingMenu, ViewportContainer,
    ViewportSize, coach_dirs, logging,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// fitcoach: camera-driven fitness coaching with a VRM trainer.
#[derive(Parser)]
#[command(name = "fitcoach", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Run a training session until Ctrl+C. Lines typed on stdin are sent
    /// to the trainer chat.
    Run(RunArgs),

    /// Serve the built web UI.
    Serve(ServeArgs),

    /// List trainers and their poses.
    Catalog,

    /// Print the humanoid summary of a VRM file.
    Inspect {
        /// VRM (GLB) file to inspect.
        file: PathBuf,
    },

    /// List audio output devices.
    Devices,
}

#[derive(Args, Default)]
struct RunArgs {
    /// Trainer id (defaults to the first catalog entry).
    #[arg(long)]
    trainer: Option<String>,

    /// Training menu.
    #[arg(long)]
    menu: Option<TrainingMenu>,

    /// Image file or directory replayed as the camera feed.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Seed for pose selection.
    #[arg(long)]
    seed: Option<u64>,

    /// Do not speak trainer lines.
    #[arg(long)]
    mute: bool,
}

#[derive(Args)]
struct ServeArgs {
    /// Directory holding the built UI (overrides the configured one).
    #[arg(long)]
    dist: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = CoachConfig::load_or_default(cli.config.as_deref())?;
    let log_guard = logging::init_tracing(&config.logging, &coach_dirs::logs_dir())?;
    if let Some(dir) = log_guard.log_dir() {
        info!(dir = %dir.display(), "writing log files");
    }

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run_session(config, args).await,
        Command::Serve(args) => serve(config, args).await,
        Command::Catalog => list_catalog(&config),
        Command::Inspect { file } => inspect(&file),
        Command::Devices => list_devices(),
    }
}

fn ctrl_c_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });
    cancel
}

fn frame_factory(path: Option<PathBuf>, size: ViewportSize) -> FrameSourceFactory {
    match path {
        Some(path) => Arc::new(move || {
            Box::new(ImageSequenceSource::new(path.clone())) as Box<dyn FrameSource>
        }),
        None => {
            warn!("no capture frames configured, sending blank frames");
            Arc::new(move || {
                Box::new(StillFrameSource::solid(size.width, size.height, [0, 0, 0, 255]))
                    as Box<dyn FrameSource>
            })
        }
    }
}

async fn run_session(config: CoachConfig, args: RunArgs) -> anyhow::Result<()> {
    println!("fitcoach v{}", env!("CARGO_PKG_VERSION"));

    let catalog = Arc::new(TrainerCatalog::load(&config.catalog)?);
    let timeout = config.backend.timeout();
    let size = ViewportSize::new(config.viewport.width, config.viewport.height);

    let services = ShellServices {
        catalog,
        loader: loader_from_config(&config.assets, timeout)?,
        render: Arc::new(HeadlessBackend::new()),
        evaluator: Arc::new(EvaluationClient::from_config(&config.backend)?),
        synthesizer: synthesizer_from_config(&config.speech, timeout)?,
        sink: sink_from_config(&config.speech),
        chat: Some(TrainerChatClient::from_config(&config.backend)?),
        frames: frame_factory(args.frames.or(config.capture.frames.clone()), size),
        viewport: config.viewport.clone(),
        capture_interval: config.capture.interval(),
        speech_enabled: config.speech.enabled && !args.mute,
        max_chat_history: config.backend.max_chat_history,
    };

    let mut shell = AppShell::new(services);
    if let Some(seed) = args.seed {
        shell = shell.with_pose_seed(seed);
    }
    if let Some(id) = &args.trainer {
        shell.select_trainer(id)?;
    }
    if let Some(menu) = args.menu {
        shell.select_menu(menu)?;
    }

    let container = ViewportContainer::new(size);
    let cancel = ctrl_c_token();
    let session = shell.start_session(container.handle())?;
    let trainer = session.trainer().name.clone();
    println!(
        "\n{trainer} is watching your {}. Type a question and press Enter to ask. Press Ctrl+C to stop.\n",
        session.menu()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut ticker = tokio::time::interval(Duration::from_millis(250));
    let mut shown: Option<String> = None;
    'session: loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => print_overlay(session, &trainer, &mut shown),
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(question)) if !question.trim().is_empty() => {
                    let reply = session.ask(&question);
                    tokio::pin!(reply);
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break 'session,
                            _ = ticker.tick() => print_overlay(session, &trainer, &mut shown),
                            reply = &mut reply => {
                                if let Err(e) = reply {
                                    warn!(error = %e, "trainer chat failed");
                                }
                                break;
                            }
                        }
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => stdin_open = false,
            },
        }
    }

    shell.return_to_title().await?;
    shell.shutdown().await;
    Ok(())
}

/// Print the overlay when it changed since the last call.
fn print_overlay(session: &Session, trainer: &str, shown: &mut Option<String>) {
    if let Some(text) = overlay_update(session.overlay(), shown) {
        println!("{trainer}: {text}");
    }
}

/// Record `overlay` in `shown`, returning the text to print if it is new.
fn overlay_update(overlay: Option<String>, shown: &mut Option<String>) -> Option<String> {
    if overlay == *shown {
        return None;
    }
    shown.clone_from(&overlay);
    overlay
}

async fn serve(config: CoachConfig, args: ServeArgs) -> anyhow::Result<()> {
    let mut server_config = config.server.clone();
    if let Some(dist) = args.dist {
        server_config.dist_dir = dist;
    }
    server_config.port = effective_port(&server_config, std::env::var("PORT").ok().as_deref());

    let server = StaticSiteServer::start(&server_config).await?;
    println!(
        "Serving {} on http://{}. Press Ctrl+C to stop.",
        server_config.dist_dir.display(),
        server.addr()
    );

    ctrl_c_token().cancelled().await;
    server.shutdown().await;
    Ok(())
}

fn list_catalog(config: &CoachConfig) -> anyhow::Result<()> {
    let catalog = TrainerCatalog::load(&config.catalog)?;
    for trainer in catalog.trainers() {
        println!(
            "{} ({}): model {}, voice {}",
            trainer.id, trainer.name, trainer.model_url, trainer.voice_id
        );
        for pose in trainer.pose_names() {
            let marker = if pose == trainer.default_pose { "*" } else { " " };
            println!("  {marker} {pose}");
        }
    }
    Ok(())
}

fn inspect(file: &std::path::Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(file)?;
    let model = VrmModel::parse(&bytes)?;
    println!("file:        {}", file.display());
    println!("name:        {}", model.name.as_deref().unwrap_or("<unnamed>"));
    println!("version:     {:?}", model.version);
    println!("size:        {} bytes, {} nodes", model.byte_len, model.node_count);
    println!("bones:       {}", model.bones.len());
    for (bone, node) in &model.bones {
        println!("  {:<18} node {node}", bone.as_str());
    }
    let expressions: Vec<&str> = model.expressions.iter().map(|e| e.as_str()).collect();
    println!("expressions: {}", expressions.join(", "));
    Ok(())
}

fn list_devices() -> anyhow::Result<()> {
    println!("Output devices:");
    for name in CpalSink::list_output_devices()? {
        println!("  - {name}");
    }
    Ok(())
}

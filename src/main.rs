use clap::{Parser, Subcommand};
use eink_frame::config::{Config, ConfigSource};
use eink_frame::e_paper_display::{EpdError, Panel};
use eink_frame::panel_worker::{FrameSink, PanelHandle};
use eink_frame::scheduler::{
    await_connectivity, show_image, spawn_signal_listener, spawn_ticker, Scheduler,
    ShutdownSignals,
};
use eink_frame::source::{HttpImageSource, ImageSource};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "eink-frame", about = "Shows the current image from an image service on a 7.5\" e-paper panel")]
struct Args {
    /// Config file to use instead of the default search path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the version
    Version,
    #[command(flatten)]
    Panel(PanelCommand),
}

/// Commands that need the configuration and the panel.
#[derive(Debug, Subcommand)]
enum PanelCommand {
    /// Clear the screen
    Clear,
    /// Show the image that is current right now
    Current,
    /// Show one image by id
    Display { id: String },
    /// Keep the screen up to date until SIGTERM or SIGINT
    Service,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    let command = match args.command {
        Command::Version => {
            println!("eink-frame {}", VERSION);
            return ExitCode::SUCCESS;
        }
        Command::Panel(command) => command,
    };

    let (config, source) = match Config::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("eink-frame: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let level = if config.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
    match source {
        ConfigSource::File(path) => info!("Using config file {}", path.display()),
        ConfigSource::Defaults => info!("No config file found, using defaults"),
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    match runtime.block_on(run(command, config)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: PanelCommand, config: Config) -> Result<(), Box<dyn Error>> {
    match command {
        PanelCommand::Clear => {
            let (panel, worker) = one_shot_panel(&config)?;
            info!("Clearing screen");
            panel.clear().await?;
            stop_worker(panel, worker).await;
        }
        PanelCommand::Current => {
            let source = HttpImageSource::new(&config.api.endpoint)?;
            let (panel, worker) = one_shot_panel(&config)?;
            let id = source.current_id().await?;
            info!("Current image is {}", id);
            show_image(&source, &panel, &id).await?;
            stop_worker(panel, worker).await;
        }
        PanelCommand::Display { id } => {
            let source = HttpImageSource::new(&config.api.endpoint)?;
            let (panel, worker) = one_shot_panel(&config)?;
            show_image(&source, &panel, &id).await?;
            stop_worker(panel, worker).await;
        }
        PanelCommand::Service => service(config).await?,
    }
    Ok(())
}

/// One-shot commands fail outright when the panel cannot be opened.
fn one_shot_panel(config: &Config) -> Result<(PanelHandle, JoinHandle<()>), EpdError> {
    let panel = Panel::detect(&config.panel)?;
    PanelHandle::spawn(panel)
}

async fn stop_worker(panel: PanelHandle, worker: JoinHandle<()>) {
    drop(panel);
    match tokio::task::spawn_blocking(move || worker.join()).await {
        Ok(Ok(())) => {}
        _ => warn!("Panel worker did not stop cleanly"),
    }
}

async fn service(config: Config) -> Result<(), Box<dyn Error>> {
    info!("Starting eink-frame {}", VERSION);
    let signals = ShutdownSignals::register()?;
    let source = HttpImageSource::new(&config.api.endpoint)?;
    let (panel, worker) = PanelHandle::spawn(Panel::probe(&config.panel))?;

    let shutdown = CancellationToken::new();
    let (events, receiver) = mpsc::channel(4);
    let listener = spawn_signal_listener(signals, events.clone(), shutdown.clone());

    await_connectivity(
        &source,
        config.api.startup_attempts,
        config.api.startup_backoff(),
        &shutdown,
    )
    .await;

    let ticker = spawn_ticker(events, config.api.poll_period(), shutdown.clone());

    Scheduler::new(source, panel.clone(), config.clear_after())
        .run(receiver, shutdown.clone())
        .await;

    shutdown.cancel();
    listener.abort();
    ticker.await?;
    stop_worker(panel, worker).await;
    info!("Stopped");
    Ok(())
}

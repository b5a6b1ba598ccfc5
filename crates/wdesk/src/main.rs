//! wdesk - self-update host for Weaviate Desktop.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use wdesk_platform::AppPaths;
use wdesk_update::ReleaseVersion;

mod app;
mod error;
mod logging;
mod settings;

use app::App;
use error::AppError;
use settings::AppSettings;

const APP_DIR: &str = "wdesk";

#[derive(Parser)]
#[command(name = "wdesk")]
#[command(author, version, about = "Check for and install Weaviate Desktop updates")]
struct Cli {
    /// Enable debug logging for this run
    #[arg(long, global = true)]
    debug: bool,

    /// Version tag of the running build
    #[arg(
        long,
        global = true,
        env = "WDESK_CURRENT_VERSION",
        default_value = concat!("v", env!("CARGO_PKG_VERSION"))
    )]
    current_version: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report whether a newer release is published
    Check,
    /// Download, verify and install the latest release
    Update {
        /// Relaunch into the new version once it is installed
        #[arg(long)]
        restart: bool,
    },
    /// Periodically check and install updates until one is applied
    Watch {
        /// Relaunch into the new version once it is installed
        #[arg(long)]
        restart: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            app::report_failure(&error);
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let paths = AppPaths::new(APP_DIR)?;
    if let Err(error) = paths.ensure_dirs() {
        eprintln!("Failed to create application directories: {error}");
    }

    let (settings, load_error) = AppSettings::load_or_default(&paths);
    logging::init_logging(
        &paths.log_file(),
        cli.debug || settings.debug_logging,
        settings.max_log_size_bytes,
    );

    match load_error {
        Some(error) => log::warn!("{error}, using defaults"),
        None => match settings.save_if_missing(&paths) {
            Ok(true) => log::info!(
                "Wrote default settings to {}",
                paths.settings_file().display()
            ),
            Ok(false) => {}
            Err(error) => log::warn!("Failed to write default settings: {error}"),
        },
    }

    let current: ReleaseVersion = cli.current_version.parse()?;
    log::debug!("Running {} {current}", settings.app_name);

    let mut app = App::new(settings, &paths, current)?;
    match cli.command {
        Commands::Check => app.check().await,
        Commands::Update { restart } => app.update(restart).await,
        Commands::Watch { restart } => app.watch(restart).await,
    }
}

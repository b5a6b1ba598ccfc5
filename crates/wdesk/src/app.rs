use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use wdesk_platform::{AppPaths, Platform};
use wdesk_update::{
    GithubReleaseSource, ReleaseVersion, SigstoreVerifier, SourceConfig, UpdateEvent, Updater,
    UpdaterConfig,
};

use crate::error::AppError;
use crate::settings::AppSettings;

const EVENT_BUFFER: usize = 64;

/// Wires settings into a ready-to-use updater and drives it for the CLI.
pub struct App {
    settings: AppSettings,
    updater: Updater,
}

impl App {
    pub fn new(
        settings: AppSettings,
        paths: &AppPaths,
        current: ReleaseVersion,
    ) -> Result<Self, AppError> {
        let platform = Platform::current()?;

        let mut source_config =
            SourceConfig::new(&settings.release_owner, &settings.file_name, platform);
        source_config.api_base_url.clone_from(&settings.api_base_url);
        source_config.token = settings.update_token();
        source_config.download_dir = paths.update_download_dir();
        source_config.metadata_timeout = Duration::from_secs(settings.metadata_timeout_secs);
        source_config.download_timeout = Duration::from_secs(settings.download_timeout_secs);

        let verifier = Arc::new(SigstoreVerifier::for_github_release(
            &settings.release_owner,
            &settings.file_name,
        ));
        let source = GithubReleaseSource::new(source_config, verifier)?;

        let mut updater = Updater::new(
            current,
            UpdaterConfig {
                owner: settings.release_owner.clone(),
                file_name: settings.file_name.clone(),
                platform,
            },
            Arc::new(source),
        );
        updater.set_event_sender(spawn_event_printer());

        Ok(Self { settings, updater })
    }

    pub async fn check(&self) -> Result<(), AppError> {
        let check = self.updater.check_for_updates().await?;

        if check.exists {
            println!(
                "{} {} is available ({}), you are on {}",
                self.settings.app_name,
                check.latest_version,
                check.size,
                self.updater.version()
            );
            println!("Release notes: {}", check.release_url);
        } else {
            println!(
                "{} {} is up to date",
                self.settings.app_name,
                self.updater.version()
            );
        }
        Ok(())
    }

    pub async fn update(&mut self, restart: bool) -> Result<(), AppError> {
        self.updater.run().await?;

        if !self.updater.is_restart_pending() {
            println!("Already on the latest version ({})", self.updater.version());
            return Ok(());
        }

        self.finish(restart)
    }

    /// Re-run the update every `check_interval_secs` until one is applied.
    /// Transient failures are logged and retried on the next tick.
    pub async fn watch(&mut self, restart: bool) -> Result<(), AppError> {
        let period = Duration::from_secs(self.settings.check_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        info!("Watching for updates every {}s", period.as_secs());

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Stopping update watch");
                    return Ok(());
                }
            }

            match self.updater.run().await {
                Ok(()) if self.updater.is_restart_pending() => return self.finish(restart),
                Ok(()) => debug!("No update applied, next check in {}s", period.as_secs()),
                Err(error) if error.is_rollback_failure() => return Err(error.into()),
                Err(error) => warn!("Update attempt failed: {error}"),
            }
        }
    }

    fn finish(&self, restart: bool) -> Result<(), AppError> {
        if restart || self.settings.auto_restart {
            println!("Update applied, restarting");
            self.updater.restart()?;
        } else {
            println!("Update applied, restart {} to use it", self.settings.app_name);
        }
        Ok(())
    }
}

fn spawn_event_printer() -> mpsc::Sender<UpdateEvent> {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                UpdateEvent::DownloadProgress(percent) => {
                    eprint!("\rDownloading update: {percent:>5.1}%");
                    if percent >= 100.0 {
                        eprintln!();
                    }
                }
                UpdateEvent::RestartRequired => debug!("Restart required event received"),
            }
        }
    });

    tx
}

/// Log the outcome of a command. Rollback failures are escalated because the
/// installation may need manual repair.
pub fn report_failure(error: &AppError) {
    match error {
        AppError::Update(update) if update.is_rollback_failure() => {
            error!("{update}");
            eprintln!("Update failed and the previous version could not be restored: {update}");
        }
        other => {
            error!("{other}");
            eprintln!("Error: {other}");
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::mpsc;
use wdesk_platform::{InstallTarget, Platform};

use crate::apply::{ApplyError, FileOps, StdFileOps, apply_update};
use crate::process::{ExecutableResolver, OsExecutable, OsProcess, ProcessSpawner};
use crate::progress::ProgressFn;
use crate::release::ReleaseVersion;
use crate::source::{ReleaseSource, SourceError};

const GITHUB_WEB_BASE: &str = "https://github.com";

/// Notifications for the shell hosting the updater.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateEvent {
    DownloadProgress(f64),
    RestartRequired,
}

/// Caller-facing summary of an update check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCheck {
    pub exists: bool,
    pub latest_version: String,
    pub size: String,
    pub release_url: String,
}

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to check for updates: {0}")]
    Check(#[source] SourceError),
    #[error("failed to download update: {0}")]
    Download(#[source] SourceError),
    #[error("failed to resolve current executable: {0}")]
    Executable(#[source] std::io::Error),
    #[error("failed to apply update: {0}")]
    Apply(#[source] ApplyError),
    #[error("failed to start new process: {0}")]
    Restart(#[source] std::io::Error),
}

impl UpdateError {
    /// The swap failed and the previous executable could not be put back.
    #[must_use]
    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, Self::Apply(ApplyError::RollbackFailed { .. }))
    }

    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::Download(error) if error.is_verification_failure())
    }
}

#[derive(Debug, Clone)]
pub struct UpdaterConfig {
    pub owner: String,
    pub file_name: String,
    pub platform: Platform,
}

/// Checks for, applies and restarts into new releases of the running
/// application.
///
/// `run` is not reentrant; callers trigger it from a single timer or menu
/// action.
pub struct Updater {
    current: ReleaseVersion,
    config: UpdaterConfig,
    source: Arc<dyn ReleaseSource>,
    resolver: Arc<dyn ExecutableResolver>,
    spawner: Arc<dyn ProcessSpawner>,
    file_ops: Arc<dyn FileOps>,
    events: Option<mpsc::Sender<UpdateEvent>>,
    pending_restart: Option<PathBuf>,
}

impl Updater {
    pub fn new(
        current: ReleaseVersion,
        config: UpdaterConfig,
        source: Arc<dyn ReleaseSource>,
    ) -> Self {
        Self {
            current,
            config,
            source,
            resolver: Arc::new(OsExecutable),
            spawner: Arc::new(OsProcess),
            file_ops: Arc::new(StdFileOps),
            events: None,
            pending_restart: None,
        }
    }

    #[must_use]
    pub fn with_executable_resolver(mut self, resolver: Arc<dyn ExecutableResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn with_process_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    #[must_use]
    pub fn with_file_ops(mut self, file_ops: Arc<dyn FileOps>) -> Self {
        self.file_ops = file_ops;
        self
    }

    /// Route download progress and restart notifications to the shell.
    pub fn set_event_sender(&mut self, events: mpsc::Sender<UpdateEvent>) {
        self.events = Some(events);
    }

    /// The running version as it was tagged.
    #[must_use]
    pub fn version(&self) -> &str {
        self.current.original()
    }

    #[must_use]
    pub fn release_url_for(&self, tag: &str) -> String {
        format!(
            "{GITHUB_WEB_BASE}/{}/{}/releases/tag/{tag}",
            self.config.owner, self.config.file_name
        )
    }

    #[must_use]
    pub fn current_release_url(&self) -> String {
        self.release_url_for(self.version())
    }

    #[must_use]
    pub fn is_restart_pending(&self) -> bool {
        self.pending_restart.is_some()
    }

    /// Ask the release source whether a newer version is published.
    ///
    /// # Errors
    /// Returns an error if the release metadata cannot be fetched or parsed.
    pub async fn check_for_updates(&self) -> Result<UpdateCheck, UpdateError> {
        debug!("Checking for updates, current version {}", self.version());

        let check = self
            .source
            .new_version_exists(&self.current)
            .await
            .map_err(UpdateError::Check)?;

        debug!(
            "Update check: exists={} version={} size={}",
            check.exists, check.latest, check.size
        );

        Ok(UpdateCheck {
            exists: check.exists,
            latest_version: check.latest.original().to_string(),
            size: check.size,
            release_url: self.release_url_for(check.latest.original()),
        })
    }

    /// Check, download, verify and apply the latest release.
    ///
    /// Does nothing once an update has been applied and is waiting for a
    /// restart.
    ///
    /// # Errors
    /// Returns the first failure; the installation is left on the current
    /// version unless the swap completed.
    pub async fn run(&mut self) -> Result<(), UpdateError> {
        if self.pending_restart.is_some() {
            debug!("Update already applied, need to restart");
            return Ok(());
        }

        let check = self.check_for_updates().await?;
        if !check.exists {
            debug!("No updates available for {}", self.version());
            return Ok(());
        }

        info!("Running update to {}", check.latest_version);

        let target = self.install_target()?;
        let extracted = self
            .source
            .download(Some(self.progress_callback()))
            .await
            .map_err(|error| {
                error!("Failed to download update: {error}");
                UpdateError::Download(error)
            })?;
        debug!("Update downloaded to {}", extracted.display());

        apply_update(self.file_ops.as_ref(), &target, &extracted).map_err(|error| {
            error!("Failed to apply update: {error}");
            UpdateError::Apply(error)
        })?;

        info!("Update {} applied, restart required", check.latest_version);
        self.pending_restart = Some(target.executable().to_path_buf());
        self.emit(UpdateEvent::RestartRequired);
        Ok(())
    }

    /// Relaunch into the applied update and exit. Does nothing when no update
    /// is pending.
    ///
    /// # Errors
    /// Returns an error if the new process cannot be started; the current
    /// process keeps running in that case.
    pub fn restart(&self) -> Result<(), UpdateError> {
        let Some(executable) = &self.pending_restart else {
            debug!("No need to restart");
            return Ok(());
        };

        self.spawner
            .spawn(executable)
            .map_err(UpdateError::Restart)?;
        self.spawner.exit();
        Ok(())
    }

    fn install_target(&self) -> Result<InstallTarget, UpdateError> {
        let executable = self
            .resolver
            .current_executable()
            .map_err(UpdateError::Executable)?;
        Ok(InstallTarget::resolve(
            executable,
            self.config.platform,
            &self.config.file_name,
        ))
    }

    fn progress_callback(&self) -> ProgressFn {
        let events = self.events.clone();
        Arc::new(move |percent| {
            debug!("Download progress: {percent:.2}%");
            if let Some(events) = &events
                && let Err(error) = events.try_send(UpdateEvent::DownloadProgress(percent))
            {
                debug!("Dropped progress event: {error}");
            }
        })
    }

    fn emit(&self, event: UpdateEvent) {
        if let Some(events) = &self.events
            && let Err(error) = events.try_send(event)
        {
            debug!("Dropped update event: {error}");
        }
    }
}

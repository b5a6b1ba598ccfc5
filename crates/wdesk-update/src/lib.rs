//! Self-update subsystem for the desktop app.
//!
//! The pieces compose bottom-up:
//! - [`ProgressReader`] reports download progress in percent.
//! - [`SigstoreVerifier`] checks a release archive against its CI signature.
//! - [`GithubReleaseSource`] finds, downloads, verifies and unpacks releases.
//! - [`Updater`] swaps the running executable for a new release and restarts.

mod apply;
mod archive;
mod process;
mod progress;
mod release;
mod source;
mod updater;
mod verify;

/// Executable swap with rollback.
pub use apply::{ApplyError, FileOps, StdFileOps, SwapStep, apply_update};
/// Seams for locating and relaunching the running process.
pub use process::{ExecutableResolver, OsExecutable, OsProcess, ProcessSpawner};
pub use progress::{ProgressFn, ProgressReader};
/// Release tags, metadata and size formatting.
pub use release::{InvalidVersion, ReleaseAsset, ReleaseInfo, ReleaseVersion, format_size};
/// GitHub-backed release feed.
pub use source::{
    DOWNLOAD_TIMEOUT, GITHUB_API_BASE, GithubReleaseSource, METADATA_TIMEOUT, ReleaseSource,
    SourceConfig, SourceError, VersionCheck,
};
pub use updater::{UpdateCheck, UpdateError, UpdateEvent, Updater, UpdaterConfig};
pub use verify::{ArtifactVerifier, GITHUB_ACTIONS_OIDC_ISSUER, SigstoreVerifier, VerifyError};

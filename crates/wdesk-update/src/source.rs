use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use wdesk_platform::{Platform, UnsupportedPlatform};

use crate::archive::extract_zip;
use crate::progress::{ProgressFn, ProgressReader};
use crate::release::{ReleaseInfo, ReleaseVersion, format_size};
use crate::verify::{ArtifactVerifier, VerifyError};

pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const METADATA_TIMEOUT: Duration = Duration::from_secs(5);
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const BODY_SNIPPET_CHARS: usize = 160;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error(transparent)]
    UnsupportedPlatform(#[from] UnsupportedPlatform),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("{context}: {source}")]
    Request {
        context: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("unsuccessful request to {url}: HTTP {status}{body_snippet}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
        body_snippet: String,
    },
    #[error("malformed response, {reason}: {payload}")]
    MalformedResponse {
        reason: &'static str,
        payload: String,
    },
    #[error("failed to parse version {tag:?}")]
    InvalidVersion { tag: String },
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    #[error("download cancelled")]
    Cancelled,
    #[error("failed to verify downloaded asset {version}: {source}")]
    Verification {
        version: String,
        #[source]
        source: VerifyError,
    },
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
}

impl SourceError {
    fn request(context: &'static str, source: reqwest::Error) -> Self {
        Self::Request { context, source }
    }

    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    pub(crate) fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    fn malformed(reason: &'static str, payload: &[u8]) -> Self {
        Self::MalformedResponse {
            reason,
            payload: String::from_utf8_lossy(payload).into_owned(),
        }
    }

    /// Transport failures that may succeed when the caller tries again.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Timeout { .. })
    }

    #[must_use]
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Self::Verification { .. })
    }
}

/// Where releases are published and how to reach them.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub api_base_url: String,
    pub owner: String,
    pub file_name: String,
    pub token: Option<String>,
    pub platform: Platform,
    pub download_dir: PathBuf,
    pub metadata_timeout: Duration,
    pub download_timeout: Duration,
}

impl SourceConfig {
    #[must_use]
    pub fn new(owner: &str, file_name: &str, platform: Platform) -> Self {
        Self {
            api_base_url: GITHUB_API_BASE.to_string(),
            owner: owner.to_string(),
            file_name: file_name.to_string(),
            token: None,
            platform,
            download_dir: std::env::temp_dir().join(file_name),
            metadata_timeout: METADATA_TIMEOUT,
            download_timeout: DOWNLOAD_TIMEOUT,
        }
    }

    /// # Errors
    /// Returns an error when the running OS has no published assets.
    pub fn for_current_platform(owner: &str, file_name: &str) -> Result<Self, SourceError> {
        Ok(Self::new(owner, file_name, Platform::current()?))
    }

    #[must_use]
    pub fn latest_release_url(&self) -> String {
        format!(
            "{}/repos/{}/{}/releases/latest",
            self.api_base_url.trim_end_matches('/'),
            self.owner,
            self.file_name
        )
    }

    fn archive_name(&self) -> String {
        self.platform.archive_asset_name(&self.file_name)
    }

    fn signature_name(&self) -> String {
        self.platform.signature_asset_name(&self.file_name)
    }
}

/// Outcome of comparing the running version with the latest release.
#[derive(Debug, Clone)]
pub struct VersionCheck {
    pub exists: bool,
    pub latest: ReleaseVersion,
    pub size: String,
}

/// A remote feed of releases for this application.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Compare `current` with the latest published release.
    async fn new_version_exists(&self, current: &ReleaseVersion)
    -> Result<VersionCheck, SourceError>;

    /// Fetch, verify and unpack the latest release. Returns the directory the
    /// archive was extracted into.
    async fn download(&self, progress: Option<ProgressFn>) -> Result<PathBuf, SourceError>;
}

/// The archive and signature of one release, fetched into the download dir.
#[derive(Debug)]
struct DownloadedAssets {
    archive: PathBuf,
    signature: PathBuf,
    version: String,
}

/// Releases published as GitHub release assets, signed in CI.
pub struct GithubReleaseSource {
    client: reqwest::Client,
    config: SourceConfig,
    verifier: Arc<dyn ArtifactVerifier>,
}

impl GithubReleaseSource {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        config: SourceConfig,
        verifier: Arc<dyn ArtifactVerifier>,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(format!(
                "{}/{}/updater",
                config.file_name,
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(SourceError::ClientBuild)?;

        Ok(Self::with_client(client, config, verifier))
    }

    pub fn with_client(
        client: reqwest::Client,
        config: SourceConfig,
        verifier: Arc<dyn ArtifactVerifier>,
    ) -> Self {
        Self {
            client,
            config,
            verifier,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.token {
            Some(token) => request.header(AUTHORIZATION, format!("token {token}")),
            None => request,
        }
    }

    async fn fetch_latest_release(&self) -> Result<(ReleaseInfo, Vec<u8>), SourceError> {
        let url = self.config.latest_release_url();

        let response = self
            .authorized(self.client.get(&url))
            .timeout(self.config.metadata_timeout)
            .send()
            .await
            .map_err(|error| SourceError::request("failed to get latest release info", error))?;

        let status = response.status();
        let payload = response
            .bytes()
            .await
            .map_err(|error| SourceError::request("failed to read latest release info", error))?
            .to_vec();

        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url,
                status,
                body_snippet: response_snippet(&payload, BODY_SNIPPET_CHARS),
            });
        }

        let info = ReleaseInfo::from_json(&payload)
            .map_err(|_| SourceError::malformed("release payload is not valid JSON", &payload))?;
        Ok((info, payload))
    }

    async fn download_assets(
        &self,
        dir: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<DownloadedAssets, SourceError> {
        let (info, payload) = self.fetch_latest_release().await?;

        let archive_name = self.config.archive_name();
        let signature_name = self.config.signature_name();
        let (Some(archive_url), Some(signature_url), Some(tag)) = (
            info.asset_url(&archive_name),
            info.asset_url(&signature_name),
            info.tag.as_deref(),
        ) else {
            return Err(SourceError::malformed("asset details not found", &payload));
        };

        let assets = DownloadedAssets {
            archive: dir.join(&archive_name),
            signature: dir.join(&signature_name),
            version: tag.to_string(),
        };

        let cancel = CancellationToken::new();
        let timeout = self.config.download_timeout;
        let deadline = Instant::now() + timeout;

        let (archive_result, signature_result) = tokio::join!(
            run_until_cancelled(
                &cancel,
                deadline,
                timeout,
                self.fetch_asset(archive_url, &assets.archive, progress),
            ),
            run_until_cancelled(
                &cancel,
                deadline,
                timeout,
                self.fetch_asset(signature_url, &assets.signature, None),
            ),
        );
        first_error(archive_result, signature_result)?;

        Ok(assets)
    }

    async fn fetch_asset(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<ProgressFn>,
    ) -> Result<(), SourceError> {
        debug!("Downloading {url} to {}", dest.display());

        let response = self
            .authorized(self.client.get(url))
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|error| SourceError::request("asset download request failed", error))?;

        let status = response.status();
        if !status.is_success() {
            let _ = response.bytes().await;
            return Err(SourceError::HttpStatus {
                url: url.to_string(),
                status,
                body_snippet: String::new(),
            });
        }

        let total = response.content_length();
        let mut file = tokio::fs::File::create(dest).await.map_err(|error| {
            SourceError::io_with_path("failed to create download file", dest, &error)
        })?;

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other));
        let mut reader = ProgressReader::new(StreamReader::new(Box::pin(stream)), total, progress);

        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(|error| copy_error(dest, error))?;
        file.flush().await.map_err(|error| {
            SourceError::io_with_path("failed to flush download file", dest, &error)
        })?;

        debug!("Downloaded {} bytes to {}", reader.bytes_read(), dest.display());
        Ok(())
    }

    async fn verify_and_extract(
        &self,
        assets: &DownloadedAssets,
        dir: &Path,
    ) -> Result<(), SourceError> {
        self.verifier
            .verify(&assets.archive, &assets.signature, &assets.version)
            .await
            .map_err(|source| SourceError::Verification {
                version: assets.version.clone(),
                source,
            })?;

        let written = extract_zip(&assets.archive, dir)?;
        info!("Extracted {written} files from {}", assets.archive.display());
        Ok(())
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    async fn new_version_exists(
        &self,
        current: &ReleaseVersion,
    ) -> Result<VersionCheck, SourceError> {
        let (info, payload) = self.fetch_latest_release().await?;

        let archive_name = self.config.archive_name();
        let (Some(tag), Some(size)) = (info.tag.as_deref(), info.asset_size(&archive_name)) else {
            return Err(SourceError::malformed("asset details not found", &payload));
        };

        let latest = ReleaseVersion::parse(tag).ok_or_else(|| SourceError::InvalidVersion {
            tag: tag.to_string(),
        })?;

        Ok(VersionCheck {
            exists: latest.is_newer_than(current),
            latest,
            size: format_size(size),
        })
    }

    async fn download(&self, progress: Option<ProgressFn>) -> Result<PathBuf, SourceError> {
        let dir = self.config.download_dir.clone();

        if let Err(error) = tokio::fs::remove_dir_all(&dir).await
            && error.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to clear stale download dir {}: {error}", dir.display());
        }
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| SourceError::io_with_path("failed to create temp dir", &dir, &error))?;

        let assets = self.download_assets(&dir, progress).await?;
        let result = self.verify_and_extract(&assets, &dir).await;

        for path in [&assets.archive, &assets.signature] {
            if let Err(error) = tokio::fs::remove_file(path).await {
                debug!("Failed to remove {}: {error}", path.display());
            }
        }

        result.map(|()| dir)
    }
}

/// Drive `task` until it finishes, the shared scope is cancelled, or the
/// deadline passes. A failure cancels the scope for the sibling task.
async fn run_until_cancelled<F>(
    cancel: &CancellationToken,
    deadline: Instant,
    timeout: Duration,
    task: F,
) -> Result<(), SourceError>
where
    F: Future<Output = Result<(), SourceError>>,
{
    let result = tokio::select! {
        () = cancel.cancelled() => Err(SourceError::Cancelled),
        () = tokio::time::sleep_until(deadline) => Err(SourceError::Timeout {
            operation: "asset download",
            seconds: timeout.as_secs(),
        }),
        result = task => result,
    };

    if result.is_err() {
        cancel.cancel();
    }
    result
}

/// Pick the error that caused a cancellation over the cancellation itself.
fn first_error(
    first: Result<(), SourceError>,
    second: Result<(), SourceError>,
) -> Result<(), SourceError> {
    match (first, second) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(SourceError::Cancelled), Err(error)) | (Err(error), _) | (Ok(()), Err(error)) => {
            Err(error)
        }
    }
}

fn copy_error(dest: &Path, error: std::io::Error) -> SourceError {
    if !error
        .get_ref()
        .is_some_and(|inner| inner.is::<reqwest::Error>())
    {
        return SourceError::io_with_path("failed to write download data", dest, &error);
    }

    match error.into_inner().map(|inner| inner.downcast::<reqwest::Error>()) {
        Some(Ok(source)) => SourceError::request("download stream error", *source),
        _ => SourceError::io(
            "download stream error",
            std::io::Error::other(dest.display().to_string()),
        ),
    }
}

fn response_snippet(body: &[u8], max_chars: usize) -> String {
    let snippet: String = String::from_utf8_lossy(body).chars().take(max_chars).collect();
    if snippet.is_empty() {
        String::new()
    } else {
        format!(": {snippet}")
    }
}

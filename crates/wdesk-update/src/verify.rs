use std::path::Path;

use async_trait::async_trait;
use log::{debug, info};
use sigstore::bundle::Bundle;
use sigstore::bundle::verify::{Verifier, policy};
use thiserror::Error;

/// Issuer of the short-lived certificates minted for release workflow runs.
pub const GITHUB_ACTIONS_OIDC_ISSUER: &str = "https://token.actions.githubusercontent.com";

/// Verify the transparency log entry embedded in the bundle against the trust
/// root's log keys instead of querying the log service. A bundle without a
/// log entry and inclusion proof is still rejected.
const VERIFY_TLOG_OFFLINE: bool = true;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed loading signature bundle {path}: {details}")]
    Bundle { path: String, details: String },
    #[error("failed to open artifact {path}: {source}")]
    Artifact {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to retrieve trusted root: {0}")]
    TrustRoot(String),
    #[error("artifact rejected for identity {identity}: {details}")]
    Rejected { identity: String, details: String },
}

/// Checks a downloaded artifact against its detached signature bundle.
#[async_trait]
pub trait ArtifactVerifier: Send + Sync {
    /// Succeeds only when the bundle proves `artifact` was signed by the
    /// expected identity for `version`.
    async fn verify(&self, artifact: &Path, bundle: &Path, version: &str)
    -> Result<(), VerifyError>;
}

/// Keyless verification against the public Sigstore trust root and
/// transparency log.
#[derive(Debug, Clone)]
pub struct SigstoreVerifier {
    oidc_issuer: String,
    identity_prefix: String,
}

impl SigstoreVerifier {
    /// `identity_prefix` is completed with the release version to form the
    /// certificate subject, so a signature for one release cannot be replayed
    /// for another.
    pub fn new(oidc_issuer: impl Into<String>, identity_prefix: impl Into<String>) -> Self {
        Self {
            oidc_issuer: oidc_issuer.into(),
            identity_prefix: identity_prefix.into(),
        }
    }

    /// Verifier for artifacts produced by the `release.yml` workflow of
    /// `github.com/<owner>/<repo>` at a version tag.
    pub fn for_github_release(owner: &str, repo: &str) -> Self {
        Self::new(
            GITHUB_ACTIONS_OIDC_ISSUER,
            format!("https://github.com/{owner}/{repo}/.github/workflows/release.yml@refs/tags/"),
        )
    }

    #[must_use]
    pub fn expected_identity(&self, version: &str) -> String {
        format!("{}{version}", self.identity_prefix)
    }
}

#[async_trait]
impl ArtifactVerifier for SigstoreVerifier {
    async fn verify(
        &self,
        artifact: &Path,
        bundle: &Path,
        version: &str,
    ) -> Result<(), VerifyError> {
        debug!(
            "Verifying {} for version {version}",
            artifact.file_name().unwrap_or_default().to_string_lossy()
        );

        let bundle = load_bundle(bundle).await?;
        let input = tokio::fs::File::open(artifact)
            .await
            .map_err(|source| VerifyError::Artifact {
                path: artifact.display().to_string(),
                source,
            })?;

        let verifier = Verifier::production()
            .await
            .map_err(|error| VerifyError::TrustRoot(error.to_string()))?;

        let identity = self.expected_identity(version);
        let policy = policy::Identity::new(&identity, &self.oidc_issuer);

        verifier
            .verify(input, bundle, &policy, VERIFY_TLOG_OFFLINE)
            .await
            .map_err(|error| VerifyError::Rejected {
                identity: identity.clone(),
                details: error.to_string(),
            })?;

        info!("Signature verified for {identity}");
        Ok(())
    }
}

async fn load_bundle(path: &Path) -> Result<Bundle, VerifyError> {
    let bundle_error = |details: String| VerifyError::Bundle {
        path: path.display().to_string(),
        details,
    };

    let raw = tokio::fs::read(path)
        .await
        .map_err(|error| bundle_error(error.to_string()))?;
    serde_json::from_slice(&raw).map_err(|error| bundle_error(error.to_string()))
}

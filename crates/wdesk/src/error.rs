use thiserror::Error;
use wdesk_platform::{AppPathsError, UnsupportedPlatform};
use wdesk_update::{InvalidVersion, SourceError, UpdateError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Paths(#[from] AppPathsError),
    #[error(transparent)]
    Platform(#[from] UnsupportedPlatform),
    #[error("invalid current version: {0}")]
    CurrentVersion(#[from] InvalidVersion),
    #[error("failed to set up release source: {0}")]
    Source(#[from] SourceError),
    #[error(transparent)]
    Update(#[from] UpdateError),
}

impl AppError {
    /// Process exit code for the CLI. A failed rollback gets its own code so
    /// wrappers can tell a possibly broken installation apart.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Update(error) if error.is_rollback_failure() => 3,
            Self::Update(error) if error.is_verification_failure() => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;
    use wdesk_update::{SourceError, UpdateError};

    #[test]
    fn exit_code_distinguishes_failure_classes() {
        let check = AppError::Update(UpdateError::Check(SourceError::Cancelled));
        assert_eq!(check.exit_code(), 1);

        let restart = AppError::Update(UpdateError::Restart(std::io::Error::other("spawn")));
        assert_eq!(restart.exit_code(), 1);
    }
}

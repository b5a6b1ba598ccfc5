use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wdesk_platform::AppPaths;

/// Environment variable that overrides the stored release API credential.
pub const UPDATE_TOKEN_ENV: &str = "WDESK_UPDATE_TOKEN";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Repository and asset base name of published releases.
    #[serde(default = "default_file_name")]
    pub file_name: String,

    #[serde(default = "default_release_owner")]
    pub release_owner: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    #[serde(default)]
    pub update_token: Option<String>,

    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    #[serde(default)]
    pub auto_restart: bool,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,
}

fn default_app_name() -> String {
    "Weaviate Desktop".to_string()
}

fn default_file_name() -> String {
    "weaviate-desktop".to_string()
}

fn default_release_owner() -> String {
    "gkampitakis".to_string()
}

fn default_api_base_url() -> String {
    wdesk_update::GITHUB_API_BASE.to_string()
}

fn default_metadata_timeout() -> u64 {
    wdesk_update::METADATA_TIMEOUT.as_secs()
}

fn default_download_timeout() -> u64 {
    wdesk_update::DOWNLOAD_TIMEOUT.as_secs()
}

fn default_check_interval() -> u64 {
    60 * 60
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            file_name: default_file_name(),
            release_owner: default_release_owner(),
            api_base_url: default_api_base_url(),
            update_token: None,
            metadata_timeout_secs: default_metadata_timeout(),
            download_timeout_secs: default_download_timeout(),
            check_interval_secs: default_check_interval(),
            auto_restart: false,
            debug_logging: false,
            max_log_size_bytes: default_max_log_size_bytes(),
        }
    }
}

impl AppSettings {
    pub fn load(paths: &AppPaths) -> Result<Self, SettingsError> {
        Self::load_from(&paths.settings_file())
    }

    /// Read settings from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(SettingsError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Settings to start with plus the load failure, if any, so the caller can
    /// report it once logging is up.
    pub fn load_or_default(paths: &AppPaths) -> (Self, Option<SettingsError>) {
        match Self::load(paths) {
            Ok(settings) => (settings, None),
            Err(error) => (Self::default(), Some(error)),
        }
    }

    /// Write these settings on first run so users have a file to edit.
    /// Returns whether a file was written.
    pub fn save_if_missing(&self, paths: &AppPaths) -> Result<bool, std::io::Error> {
        if paths.settings_file().exists() {
            return Ok(false);
        }
        self.save(paths)?;
        Ok(true)
    }

    pub fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        paths.ensure_dirs()?;
        self.save_to(&paths.settings_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    /// The release API credential, preferring the environment over the file.
    pub fn update_token(&self) -> Option<String> {
        self.token_with_override(std::env::var(UPDATE_TOKEN_ENV).ok())
    }

    fn token_with_override(&self, from_env: Option<String>) -> Option<String> {
        from_env
            .filter(|token| !token.trim().is_empty())
            .or_else(|| self.update_token.clone())
    }
}

#[cfg(test)]
mod tests {
    use wdesk_platform::AppPaths;

    use super::{AppSettings, SettingsError};

    fn temp_paths(root: &std::path::Path) -> AppPaths {
        AppPaths {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
            data_dir: root.join("data"),
        }
    }

    #[test]
    fn invalid_file_is_reported_alongside_defaults() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = temp_paths(temp.path());
        paths.ensure_dirs().expect("dirs should be created");
        std::fs::write(paths.settings_file(), "[1, 2").expect("settings should be written");

        let (settings, error) = AppSettings::load_or_default(&paths);

        assert_eq!(settings, AppSettings::default());
        assert!(matches!(error, Some(SettingsError::Parse { .. })));
    }

    #[test]
    fn defaults_are_written_only_on_first_run() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let paths = temp_paths(temp.path());

        let (settings, error) = AppSettings::load_or_default(&paths);
        assert!(error.is_none());
        assert!(settings.save_if_missing(&paths).expect("first save should succeed"));

        let edited = AppSettings {
            auto_restart: true,
            ..AppSettings::default()
        };
        edited.save(&paths).expect("edited settings should save");
        assert!(!settings.save_if_missing(&paths).expect("second save should be skipped"));
        assert_eq!(
            AppSettings::load(&paths).expect("settings should load"),
            edited
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let temp = tempfile::tempdir().expect("tempdir should be created");

        let settings = AppSettings::load_from(&temp.path().join("settings.json"))
            .expect("missing settings should load as defaults");

        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.metadata_timeout_secs, 5);
        assert_eq!(settings.download_timeout_secs, 900);
        assert_eq!(settings.check_interval_secs, 3600);
        assert!(!settings.auto_restart);
    }

    #[test]
    fn partial_file_fills_remaining_fields() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, r#"{"release_owner":"acme","auto_restart":true}"#)
            .expect("settings should be written");

        let settings = AppSettings::load_from(&path).expect("partial settings should load");

        assert_eq!(settings.release_owner, "acme");
        assert!(settings.auto_restart);
        assert_eq!(settings.file_name, "weaviate-desktop");
        assert_eq!(settings.api_base_url, "https://api.github.com");
    }

    #[test]
    fn invalid_file_reports_parse_error() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("settings.json");
        std::fs::write(&path, "{not json").expect("settings should be written");

        let error = AppSettings::load_from(&path).expect_err("invalid settings should fail");

        assert!(matches!(error, SettingsError::Parse { .. }));
        assert!(error.to_string().contains("settings.json"));
    }

    #[test]
    fn save_then_load_preserves_changes() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("settings.json");
        let settings = AppSettings {
            check_interval_secs: 120,
            update_token: Some("stored".to_string()),
            ..AppSettings::default()
        };

        settings.save_to(&path).expect("settings should save");

        assert_eq!(
            AppSettings::load_from(&path).expect("saved settings should load"),
            settings
        );
    }

    #[test]
    fn environment_token_takes_precedence() {
        let settings = AppSettings {
            update_token: Some("stored".to_string()),
            ..AppSettings::default()
        };

        assert_eq!(
            settings.token_with_override(Some("from-env".to_string())),
            Some("from-env".to_string())
        );
        assert_eq!(
            settings.token_with_override(Some("  ".to_string())),
            Some("stored".to_string())
        );
        assert_eq!(
            settings.token_with_override(None),
            Some("stored".to_string())
        );
    }
}

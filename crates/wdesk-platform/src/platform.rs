use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported platform {os}")]
pub struct UnsupportedPlatform {
    pub os: String,
}

/// Operating systems that release assets are published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    MacOs,
    Windows,
    Linux,
}

impl Platform {
    /// Resolve the platform the process is running on.
    ///
    /// # Errors
    /// Returns an error when the running OS has no published assets.
    pub fn current() -> Result<Self, UnsupportedPlatform> {
        Self::from_os(std::env::consts::OS)
    }

    /// Map an OS identifier (as in `std::env::consts::OS`) to a platform.
    ///
    /// # Errors
    /// Returns an error for any OS other than macOS, Windows and Linux.
    pub fn from_os(os: &str) -> Result<Self, UnsupportedPlatform> {
        match os {
            "macos" => Ok(Self::MacOs),
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            other => Err(UnsupportedPlatform {
                os: other.to_string(),
            }),
        }
    }

    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::MacOs => "macos",
            Self::Windows => "windows",
            Self::Linux => "linux",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::MacOs => "macOS",
            Self::Windows => "Windows",
            Self::Linux => "Linux",
        }
    }

    /// Base name shared by the archive and signature assets, e.g.
    /// `weaviate-desktop.linux`.
    #[must_use]
    pub fn asset_base_name(self, file_name: &str) -> String {
        format!("{file_name}.{}", self.suffix())
    }

    #[must_use]
    pub fn archive_asset_name(self, file_name: &str) -> String {
        format!("{}.zip", self.asset_base_name(file_name))
    }

    #[must_use]
    pub fn signature_asset_name(self, file_name: &str) -> String {
        format!("{}.sig", self.asset_base_name(file_name))
    }

    /// Whether executables on this platform live inside an application bundle.
    #[must_use]
    pub fn uses_app_bundle(self) -> bool {
        matches!(self, Self::MacOs)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::{Platform, UnsupportedPlatform};

    #[test]
    fn from_os_maps_supported_systems() {
        assert_eq!(Platform::from_os("macos"), Ok(Platform::MacOs));
        assert_eq!(Platform::from_os("windows"), Ok(Platform::Windows));
        assert_eq!(Platform::from_os("linux"), Ok(Platform::Linux));
    }

    #[test]
    fn from_os_rejects_unknown_systems() {
        assert_eq!(
            Platform::from_os("freebsd"),
            Err(UnsupportedPlatform {
                os: "freebsd".to_string()
            })
        );
    }

    #[test]
    fn asset_names_use_platform_suffix() {
        assert_eq!(
            Platform::Linux.archive_asset_name("test-app"),
            "test-app.linux.zip"
        );
        assert_eq!(
            Platform::MacOs.signature_asset_name("test-app"),
            "test-app.macos.sig"
        );
        assert_eq!(
            Platform::Windows.asset_base_name("test-app"),
            "test-app.windows"
        );
    }

    #[test]
    fn only_macos_uses_bundles() {
        assert!(Platform::MacOs.uses_app_bundle());
        assert!(!Platform::Linux.uses_app_bundle());
        assert!(!Platform::Windows.uses_app_bundle());
    }
}

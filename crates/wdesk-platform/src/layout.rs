use std::path::{Path, PathBuf};

use crate::Platform;

const BUNDLE_EXECUTABLE_DIR: &str = "Contents/MacOS";

/// Where the running executable lives and what has to be swapped to replace it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    /// A standalone executable file.
    FlatBinary { executable: PathBuf },
    /// An executable at `<bundle_root>/Contents/MacOS/<name>`; the whole bundle
    /// directory is replaced.
    BundledBinary {
        bundle_root: PathBuf,
        executable: PathBuf,
    },
}

impl InstallTarget {
    /// Classify a canonical executable path.
    ///
    /// On bundle platforms an executable that does not sit in
    /// `Contents/MacOS/<file_name>` is treated as a flat binary.
    #[must_use]
    pub fn resolve(executable: PathBuf, platform: Platform, file_name: &str) -> Self {
        if platform.uses_app_bundle()
            && executable.ends_with(Path::new(BUNDLE_EXECUTABLE_DIR).join(file_name))
            && let Some(bundle_root) = executable.ancestors().nth(3)
        {
            return Self::BundledBinary {
                bundle_root: bundle_root.to_path_buf(),
                executable,
            };
        }

        Self::FlatBinary { executable }
    }

    /// The live executable that gets relaunched after an update.
    #[must_use]
    pub fn executable(&self) -> &Path {
        match self {
            Self::FlatBinary { executable } | Self::BundledBinary { executable, .. } => executable,
        }
    }

    /// The path that is renamed during the swap: the binary itself or the
    /// bundle directory.
    #[must_use]
    pub fn swap_path(&self) -> &Path {
        match self {
            Self::FlatBinary { executable } => executable,
            Self::BundledBinary { bundle_root, .. } => bundle_root,
        }
    }

    /// File name of [`Self::swap_path`]; an extracted update must contain an
    /// entry with this name.
    #[must_use]
    pub fn swap_name(&self) -> &std::ffi::OsStr {
        self.swap_path().file_name().unwrap_or_default()
    }

    /// Locate the executable file inside a copy of the swap root, e.g. the
    /// staged `.<name>.new` bundle.
    #[must_use]
    pub fn binary_within(&self, root: &Path) -> PathBuf {
        match self {
            Self::FlatBinary { .. } => root.to_path_buf(),
            Self::BundledBinary {
                bundle_root,
                executable,
            } => executable
                .strip_prefix(bundle_root)
                .map_or_else(|_| root.to_path_buf(), |inner| root.join(inner)),
        }
    }

    /// Sibling staging path `.<name>.new`.
    #[must_use]
    pub fn staged_path(&self) -> PathBuf {
        self.sibling("new")
    }

    /// Sibling backup path `.<name>.old`.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        self.sibling("old")
    }

    fn sibling(&self, extension: &str) -> PathBuf {
        let swap = self.swap_path();
        let dir = swap.parent().unwrap_or_else(|| Path::new(""));
        dir.join(format!(
            ".{}.{extension}",
            self.swap_name().to_string_lossy()
        ))
    }
}

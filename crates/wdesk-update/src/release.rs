use std::cmp::Ordering;
use std::collections::HashMap;

use semver::Version;
use serde::Deserialize;

/// A parsed release version that remembers how the tag was spelled.
#[derive(Debug, Clone)]
pub struct ReleaseVersion {
    original: String,
    version: Version,
}

impl ReleaseVersion {
    /// Parse a release tag such as `v1.2.3`, `1.2` or `1.0.0-beta.2`.
    pub fn parse(tag: &str) -> Option<Self> {
        let trimmed = tag.trim();
        let bare = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        parse_semver(bare).map(|version| Self {
            original: trimmed.to_string(),
            version,
        })
    }

    /// The tag exactly as published.
    #[must_use]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// Semver precedence: build metadata is ignored and a pre-release sorts
    /// below its release.
    #[must_use]
    pub fn precedence(&self, other: &Self) -> Ordering {
        let a = &self.version;
        let b = &other.version;
        (a.major, a.minor, a.patch)
            .cmp(&(b.major, b.minor, b.patch))
            .then_with(|| a.pre.cmp(&b.pre))
    }

    #[must_use]
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.precedence(other) == Ordering::Greater
    }
}

impl PartialEq for ReleaseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.precedence(other) == Ordering::Equal
    }
}

impl Eq for ReleaseVersion {}

impl PartialOrd for ReleaseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ReleaseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence(other)
    }
}

impl std::fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

impl std::str::FromStr for ReleaseVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| InvalidVersion {
            tag: s.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid version tag {tag:?}")]
pub struct InvalidVersion {
    pub tag: String,
}

fn parse_semver(version: &str) -> Option<Version> {
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }

    let (core, suffix) = split_semver_core_and_suffix(version);
    let mut parts = core.split('.');
    let major = parts.next()?.parse::<u64>().ok()?;
    let minor = parts.next().map(str::parse::<u64>).transpose().ok()?;
    let patch = parts.next().map(str::parse::<u64>).transpose().ok()?;

    if parts.next().is_some() {
        return None;
    }

    let normalized = match (minor, patch) {
        (None, None) => format!("{major}.0.0{suffix}"),
        (Some(minor), None) => format!("{major}.{minor}.0{suffix}"),
        (Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}{suffix}"),
        (None, Some(_)) => return None,
    };

    Version::parse(&normalized).ok()
}

fn split_semver_core_and_suffix(version: &str) -> (&str, &str) {
    let suffix_idx = version.find(['-', '+']).unwrap_or(version.len());
    (&version[..suffix_idx], &version[suffix_idx..])
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReleaseAsset {
    pub download_url: Option<String>,
    pub size: Option<u64>,
}

/// The parts of a "latest release" payload the updater relies on. Lives for a
/// single check or download.
#[derive(Debug, Clone, Default)]
pub struct ReleaseInfo {
    pub tag: Option<String>,
    pub assets: HashMap<String, ReleaseAsset>,
}

#[derive(Deserialize)]
struct RawRelease {
    #[serde(default)]
    tag_name: Option<String>,
    #[serde(default)]
    assets: Vec<RawAsset>,
}

#[derive(Deserialize)]
struct RawAsset {
    name: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    size: Option<u64>,
}

impl ReleaseInfo {
    /// Parse a release payload. Fields that are absent are kept as `None`
    /// so callers decide which ones they require.
    pub fn from_json(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: RawRelease = serde_json::from_slice(payload)?;
        let assets = raw
            .assets
            .into_iter()
            .map(|asset| {
                (
                    asset.name,
                    ReleaseAsset {
                        download_url: asset.url,
                        size: asset.size,
                    },
                )
            })
            .collect();

        Ok(Self {
            tag: raw.tag_name,
            assets,
        })
    }

    #[must_use]
    pub fn asset_url(&self, name: &str) -> Option<&str> {
        self.assets.get(name)?.download_url.as_deref()
    }

    #[must_use]
    pub fn asset_size(&self, name: &str) -> Option<u64> {
        self.assets.get(name)?.size
    }
}

/// Format a byte count with decimal units, e.g. `123456` -> `123 kB`.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["kB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1000 {
        return format!("{bytes} B");
    }

    let mut unit: u64 = 1000;
    let mut index = 0;
    while index + 1 < UNITS.len() && bytes / unit >= 1000 {
        unit *= 1000;
        index += 1;
    }

    let suffix = UNITS[index];
    let tenths = (u128::from(bytes) * 10 + u128::from(unit) / 2) / u128::from(unit);
    if tenths < 100 {
        format!("{}.{} {suffix}", tenths / 10, tenths % 10)
    } else {
        let whole = (u128::from(bytes) + u128::from(unit) / 2) / u128::from(unit);
        format!("{whole} {suffix}")
    }
}

//! Release asset naming.
//!
//! The release store publishes one gzip tarball per supported platform:
//!
//! | Platform          | Asset                                      |
//! |-------------------|--------------------------------------------|
//! | darwin-arm64      | `shebe-{version}-darwin-aarch64.tar.gz`    |
//! | darwin-x86_64     | `shebe-{version}-darwin-x86_64.tar.gz`     |
//! | linux-x86_64      | `shebe-{version}-linux-x86_64-musl.tar.gz` |
//!
//! Linux builds are statically linked against musl, so the musl archive is
//! used whatever libc the host has. Linux on arm64 and all of Windows have no
//! archive and are rejected rather than mapped to something close.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Arch, Os, Platform, PlatformError, ReleaseVersion, Result};

/// Name of the executable inside every release archive.
pub const BINARY_NAME: &str = "shebe-mcp";

/// File extension of release archives.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// A release asset file name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetName(String);

impl AssetName {
    /// The file name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AssetName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for AssetName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for AssetName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// How the version appears inside an asset name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionStyle {
    /// `shebe-v0.5.3-...`
    WithPrefix,
    /// `shebe-0.5.3-...`
    WithoutPrefix,
}

/// Suffix carried by Linux assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinuxSuffix {
    /// `...-linux-x86_64-musl.tar.gz`
    Musl,
    /// `...-linux-x86_64.tar.gz`
    None,
}

/// The naming scheme the release pipeline uses for its archives.
///
/// Published releases have used more than one scheme over time, so the
/// resolver checks which one a release actually follows instead of trusting
/// the default blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct NamingConvention {
    /// Archive name prefix (`shebe` or `shebe-mcp`).
    pub prefix: &'static str,
    /// Whether the tag's leading `v` is kept.
    pub version_style: VersionStyle,
    /// Linux libc suffix.
    pub linux_suffix: LinuxSuffix,
}

impl Default for NamingConvention {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl NamingConvention {
    /// The scheme current releases are published with.
    pub const DEFAULT: Self = Self {
        prefix: "shebe",
        version_style: VersionStyle::WithPrefix,
        linux_suffix: LinuxSuffix::Musl,
    };

    /// Every known scheme, [`Self::DEFAULT`] first.
    #[must_use]
    pub fn candidates() -> Vec<Self> {
        let mut all = Vec::with_capacity(8);
        for prefix in ["shebe", "shebe-mcp"] {
            for version_style in [VersionStyle::WithPrefix, VersionStyle::WithoutPrefix] {
                for linux_suffix in [LinuxSuffix::Musl, LinuxSuffix::None] {
                    all.push(Self {
                        prefix,
                        version_style,
                        linux_suffix,
                    });
                }
            }
        }
        all
    }
}

impl fmt::Display for NamingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = match self.version_style {
            VersionStyle::WithPrefix => "v{version}",
            VersionStyle::WithoutPrefix => "{version}",
        };
        let suffix = match self.linux_suffix {
            LinuxSuffix::Musl => "[-musl]",
            LinuxSuffix::None => "",
        };
        write!(f, "{}-{version}-{{os}}-{{arch}}{suffix}{ARCHIVE_EXTENSION}", self.prefix)
    }
}

/// Map a version and platform to its release asset name.
pub fn asset_name(version: &ReleaseVersion, platform: &Platform) -> Result<AssetName> {
    asset_name_with(&NamingConvention::DEFAULT, version, platform)
}

/// Map a version and platform to its asset name under a specific convention.
pub fn asset_name_with(
    convention: &NamingConvention,
    version: &ReleaseVersion,
    platform: &Platform,
) -> Result<AssetName> {
    let (os, arch, suffix) = platform_components(platform, convention.linux_suffix)?;
    let version = match convention.version_style {
        VersionStyle::WithPrefix => version.as_str(),
        VersionStyle::WithoutPrefix => version.without_prefix(),
    };

    Ok(AssetName(format!(
        "{}-{version}-{os}-{arch}{suffix}{ARCHIVE_EXTENSION}",
        convention.prefix
    )))
}

/// Fail with [`PlatformError::UnsupportedPlatform`] unless `platform` has a
/// published binary.
pub fn ensure_supported(platform: &Platform) -> Result<()> {
    platform_components(platform, LinuxSuffix::Musl).map(|_| ())
}

/// The OS, architecture and suffix components of an asset name.
fn platform_components(
    platform: &Platform,
    linux_suffix: LinuxSuffix,
) -> Result<(&'static str, &'static str, &'static str)> {
    let (os, suffix) = match platform.os {
        Os::MacOs => ("darwin", ""),
        Os::Linux => {
            let suffix = match linux_suffix {
                LinuxSuffix::Musl => "-musl",
                LinuxSuffix::None => "",
            };
            ("linux", suffix)
        }
        Os::Windows => {
            return Err(PlatformError::unsupported(
                platform,
                "no Windows builds are published",
            ));
        }
        Os::Other => {
            return Err(PlatformError::unsupported(
                platform,
                "only macOS and Linux builds are published",
            ));
        }
    };

    let arch = match (platform.os, platform.arch) {
        (Os::Linux, Arch::Arm64) => {
            return Err(PlatformError::unsupported(
                platform,
                "no Linux ARM builds are published",
            ));
        }
        (_, Arch::Arm64 | Arch::X86_64) => platform.arch.asset_str(),
        (_, Arch::X86) => {
            return Err(PlatformError::unsupported(
                platform,
                "32-bit x86 is not supported",
            ));
        }
        (_, Arch::Other) => {
            return Err(PlatformError::unsupported(
                platform,
                "only arm64 and x86_64 builds are published",
            ));
        }
    };

    Ok((os, arch, suffix))
}

/// File name of the executable for a platform.
#[must_use]
pub fn binary_file_name(platform: &Platform) -> String {
    if platform.os == Os::Windows {
        format!("{BINARY_NAME}.exe")
    } else {
        BINARY_NAME.to_string()
    }
}

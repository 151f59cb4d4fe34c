//! Host platform description.
//!
//! Handles mapping between:
//! - the compile-time target (`std::env::consts`, `target_env`)
//! - shebe platform strings (e.g., "darwin-arm64", "linux-x86_64-musl")

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PlatformError;

/// Operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// macOS.
    #[serde(rename = "darwin")]
    MacOs,
    /// Linux.
    Linux,
    /// Windows.
    Windows,
    /// Anything else (BSDs, wasm hosts, ...).
    Other,
}

impl Os {
    /// Get the current OS.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "darwin" | "macos" | "osx" | "mac" => Some(Self::MacOs),
            "linux" => Some(Self::Linux),
            "windows" | "win" => Some(Self::Windows),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// The OS component used in release asset names.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MacOs => "darwin",
            Self::Linux => "linux",
            Self::Windows => "windows",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit ARM (aarch64).
    Arm64,
    /// 64-bit x86.
    #[serde(rename = "x86_64")]
    X86_64,
    /// 32-bit x86.
    X86,
    /// Anything else.
    Other,
}

impl Arch {
    /// Get the current architecture.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_arch = "aarch64") {
            Self::Arm64
        } else if cfg!(target_arch = "x86_64") {
            Self::X86_64
        } else if cfg!(target_arch = "x86") {
            Self::X86
        } else {
            Self::Other
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "arm64" | "aarch64" => Some(Self::Arm64),
            "x86_64" | "amd64" | "x64" => Some(Self::X86_64),
            "x86" | "i386" | "i686" => Some(Self::X86),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// The architecture component used in release asset names.
    ///
    /// Release archives use Rust target naming, so arm64 is `aarch64`.
    #[must_use]
    pub const fn asset_str(self) -> &'static str {
        match self {
            Self::Arm64 => "aarch64",
            Self::X86_64 => "x86_64",
            Self::X86 => "x86",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arm64 => f.write_str("arm64"),
            other => f.write_str(other.asset_str()),
        }
    }
}

/// C library flavour of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Libc {
    /// glibc.
    Gnu,
    /// musl.
    Musl,
    /// Not applicable or not known (macOS, Windows).
    #[default]
    Unknown,
}

impl Libc {
    /// Get the libc the current binary was built against.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(target_env = "musl") {
            Self::Musl
        } else if cfg!(all(target_os = "linux", target_env = "gnu")) {
            Self::Gnu
        } else {
            Self::Unknown
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "gnu" | "glibc" => Some(Self::Gnu),
            "musl" => Some(Self::Musl),
            "unknown" => Some(Self::Unknown),
            _ => None,
        }
    }
}

impl fmt::Display for Libc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gnu => f.write_str("gnu"),
            Self::Musl => f.write_str("musl"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// A platform descriptor: OS, architecture and libc.
///
/// Every combination is representable. Whether a combination has a published
/// binary is decided by [`crate::asset_name`], never here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
    /// C library flavour.
    #[serde(default)]
    pub libc: Libc,
}

impl Platform {
    /// Create a new platform with an unknown libc.
    #[must_use]
    pub const fn new(os: Os, arch: Arch) -> Self {
        Self {
            os,
            arch,
            libc: Libc::Unknown,
        }
    }

    /// Set the libc flavour.
    #[must_use]
    pub const fn with_libc(mut self, libc: Libc) -> Self {
        self.libc = libc;
        self
    }

    /// Parse from a string like "darwin-arm64" or "linux-x86_64-musl".
    ///
    /// Architecture names may themselves contain an underscore but never a
    /// dash, so splitting on `-` is unambiguous.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let unknown = || PlatformError::UnknownPlatform(s.to_string());
        let parts: Vec<&str> = s.trim().split('-').collect();
        let (os, arch, libc) = match parts.as_slice() {
            [os, arch] => (*os, *arch, None),
            [os, arch, libc] => (*os, *arch, Some(*libc)),
            _ => return Err(unknown()),
        };

        let os = Os::parse(os).ok_or_else(unknown)?;
        let arch = Arch::parse(arch).ok_or_else(unknown)?;
        let libc = match libc {
            Some(libc) => Libc::parse(libc).ok_or_else(unknown)?,
            None => Libc::Unknown,
        };

        Ok(Self { os, arch, libc })
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)?;
        if self.libc != Libc::Unknown {
            write!(f, "-{}", self.libc)?;
        }
        Ok(())
    }
}

/// Describe the host this binary was compiled for.
///
/// Pure: the answer is fixed at compile time. Callers that need a different
/// platform (tests, cross-installs) construct a [`Platform`] directly instead.
#[must_use]
pub const fn detect_platform() -> Platform {
    Platform {
        os: Os::current(),
        arch: Arch::current(),
        libc: Libc::current(),
    }
}

/// Platforms with a published shebe-mcp binary.
#[must_use]
pub const fn supported_platforms() -> [Platform; 3] {
    [
        Platform::new(Os::MacOs, Arch::Arm64),
        Platform::new(Os::MacOs, Arch::X86_64),
        Platform::new(Os::Linux, Arch::X86_64).with_libc(Libc::Musl),
    ]
}

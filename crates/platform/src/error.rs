//! Error types for platform mapping.

use thiserror::Error;

/// Result type for platform and naming operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Errors raised while describing a platform or naming an asset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// No release asset is published for this platform.
    #[error("shebe does not support {platform}: {reason}")]
    UnsupportedPlatform {
        /// The rejected platform, rendered as `os-arch[-libc]`.
        platform: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Version string is not of the form `v<MAJOR>.<MINOR>.<PATCH>`.
    #[error("Invalid release version '{0}': expected v<MAJOR>.<MINOR>.<PATCH>")]
    InvalidVersion(String),

    /// Platform string could not be parsed.
    #[error("Unknown platform '{0}': expected <os>-<arch>[-<libc>]")]
    UnknownPlatform(String),
}

impl PlatformError {
    /// Create an unsupported platform error.
    #[must_use]
    pub fn unsupported(platform: impl ToString, reason: impl Into<String>) -> Self {
        Self::UnsupportedPlatform {
            platform: platform.to_string(),
            reason: reason.into(),
        }
    }
}

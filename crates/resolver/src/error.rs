//! Error types for binary acquisition.

use miette::Diagnostic;
use shebe_platform::PlatformError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for resolver operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while acquiring a shebe-mcp binary.
///
/// Every variant that involves the release store names the asset or tag that
/// was being looked for, so a naming drift between this crate and the
/// published releases can be diagnosed from the message alone.
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// No release asset exists for the host platform.
    #[error("Unsupported platform {platform}: {reason}")]
    #[diagnostic(
        code(shebe::resolver::unsupported_platform),
        help("Prebuilt binaries exist for darwin-arm64, darwin-x86_64 and linux-x86_64 only")
    )]
    UnsupportedPlatform {
        /// The rejected platform.
        platform: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Version string is not a release tag.
    #[error("Invalid release version '{0}'")]
    #[diagnostic(
        code(shebe::resolver::invalid_version),
        help("Versions look like v<MAJOR>.<MINOR>.<PATCH>, e.g. v0.5.3")
    )]
    InvalidVersion(String),

    /// The release, or the asset within it, does not exist.
    #[error(
        "Release asset '{asset}' not found for {requested}{}; available: {}",
        status_suffix(.status),
        available_list(.available)
    )]
    #[diagnostic(
        code(shebe::resolver::release_not_found),
        help("Check the release page; the naming scheme may have drifted from this resolver")
    )]
    ReleaseNotFound {
        /// The requested release (`latest` or a tag).
        requested: String,
        /// The asset name that was expected.
        asset: String,
        /// HTTP status, when the store answered with one.
        status: Option<u16>,
        /// Asset names the release does carry.
        available: Vec<String>,
    },

    /// Transport failure or unexpected server response.
    #[error("Network error while {context}{}", status_suffix(.status))]
    #[diagnostic(
        code(shebe::resolver::network),
        help("This is usually transient; retry with backoff")
    )]
    Network {
        /// What was being attempted.
        context: String,
        /// HTTP status, when there was a response.
        status: Option<u16>,
        /// Underlying transport error.
        #[source]
        source: Option<reqwest::Error>,
    },

    /// API quota exhausted.
    #[error("Release API rate limit exceeded (HTTP {status}){}", reset_suffix(.reset))]
    #[diagnostic(
        code(shebe::resolver::rate_limited),
        help("Wait for the quota to reset, or set GITHUB_TOKEN to raise the limit")
    )]
    RateLimited {
        /// HTTP status (403 or 429).
        status: u16,
        /// Unix time at which the quota resets, if reported.
        reset: Option<u64>,
        /// Whether the request carried a token.
        authenticated: bool,
    },

    /// Download was truncated or the archive stream is damaged.
    #[error("Corrupt archive '{asset}': {message}")]
    #[diagnostic(
        code(shebe::resolver::corrupt_archive),
        help("The download was incomplete or damaged; retrying once is safe")
    )]
    CorruptArchive {
        /// The asset being processed.
        asset: String,
        /// What was wrong.
        message: String,
    },

    /// Archive decoded fine but does not have the expected layout.
    #[error("Malformed archive '{asset}': {message}")]
    #[diagnostic(
        code(shebe::resolver::malformed_archive),
        help("The release archive must contain shebe-mcp at its root")
    )]
    MalformedArchive {
        /// The asset being processed.
        asset: String,
        /// What was wrong.
        message: String,
    },

    /// The host cancelled the acquisition.
    #[error("Acquisition cancelled")]
    #[diagnostic(code(shebe::resolver::cancelled))]
    Cancelled,

    /// The binary failed the MCP handshake probe.
    #[error("Probe of {} failed: {message}", .path.display())]
    #[diagnostic(code(shebe::resolver::probe))]
    Probe {
        /// The probed binary.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// The binary reports a different version than was requested.
    #[error("Binary reports '{reported}', expected {expected}")]
    #[diagnostic(
        code(shebe::resolver::version_mismatch),
        help("Remove the cache directory to force a fresh download")
    )]
    VersionMismatch {
        /// The version that was requested.
        expected: String,
        /// What the binary printed.
        reported: String,
    },

    /// Filesystem operation failed.
    #[error("I/O error during {operation}{}", path_suffix(.path))]
    #[diagnostic(code(shebe::resolver::io))]
    Io {
        /// The operation that failed.
        operation: String,
        /// The path involved, if any.
        path: Option<PathBuf>,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("JSON error while {context}")]
    #[diagnostic(code(shebe::resolver::json))]
    Json {
        /// What was being parsed or written.
        context: String,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    #[diagnostic(code(shebe::resolver::config))]
    Config(String),
}

#[allow(clippy::ref_option)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

#[allow(clippy::ref_option)]
fn reset_suffix(reset: &Option<u64>) -> String {
    reset
        .map(|r| format!(", resets at unix time {r}"))
        .unwrap_or_default()
}

#[allow(clippy::ref_option)]
fn path_suffix(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" on {}", p.display()))
        .unwrap_or_default()
}

const fn is_client_error(status: u16) -> bool {
    matches!(status, 400..=499) && status != 408
}

fn available_list(available: &[String]) -> String {
    if available.is_empty() {
        "(none)".to_string()
    } else {
        available.join(", ")
    }
}

impl Error {
    /// Create an I/O error with context.
    #[must_use]
    pub fn io(operation: impl Into<String>, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.as_ref().to_path_buf()),
            source,
        }
    }

    /// Create a network error from a transport failure.
    #[must_use]
    pub fn network(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            context: context.into(),
            status: source.status().map(|s| s.as_u16()),
            source: Some(source),
        }
    }

    /// Create a network error for an unexpected HTTP status.
    #[must_use]
    pub fn http_status(context: impl Into<String>, status: u16) -> Self {
        Self::Network {
            context: context.into(),
            status: Some(status),
            source: None,
        }
    }

    /// Create a corrupt archive error.
    #[must_use]
    pub fn corrupt(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            asset: asset.into(),
            message: message.into(),
        }
    }

    /// Create a malformed archive error.
    #[must_use]
    pub fn malformed(asset: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedArchive {
            asset: asset.into(),
            message: message.into(),
        }
    }

    /// Create a probe error.
    #[must_use]
    pub fn probe(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Probe {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    /// Whether retrying the same request later may succeed.
    ///
    /// Client errors other than 408 are answers, not outages.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network {
                status: Some(status),
                ..
            } => !is_client_error(*status),
            Self::Network { .. } | Self::RateLimited { .. } => true,
            _ => false,
        }
    }

    /// Whether the request should be repeated after a backoff.
    ///
    /// Rate limiting is transient but only lifts at its reset time, so it is
    /// not retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. }) && self.is_transient()
    }

    /// Whether the failure was in the downloaded archive itself.
    #[must_use]
    pub const fn is_archive_failure(&self) -> bool {
        matches!(
            self,
            Self::CorruptArchive { .. } | Self::MalformedArchive { .. }
        )
    }
}

impl From<PlatformError> for Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::UnsupportedPlatform { platform, reason } => {
                Self::UnsupportedPlatform { platform, reason }
            }
            PlatformError::InvalidVersion(v) => Self::InvalidVersion(v),
            PlatformError::UnknownPlatform(p) => {
                Self::Config(format!("unknown platform '{p}'"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_not_found_message_names_asset_and_status() {
        let err = Error::ReleaseNotFound {
            requested: "v0.5.3".into(),
            asset: "shebe-v0.5.3-darwin-aarch64.tar.gz".into(),
            status: Some(404),
            available: vec![],
        };
        let msg = err.to_string();
        assert!(msg.contains("shebe-v0.5.3-darwin-aarch64.tar.gz"));
        assert!(msg.contains("v0.5.3"));
        assert!(msg.contains("HTTP 404"));
    }

    #[test]
    fn test_rate_limited_message() {
        let err = Error::RateLimited {
            status: 403,
            reset: Some(1_700_000_000),
            authenticated: false,
        };
        assert_eq!(
            err.to_string(),
            "Release API rate limit exceeded (HTTP 403), resets at unix time 1700000000"
        );
        assert!(err.is_transient());
    }

    #[test]
    fn test_classification() {
        assert!(Error::http_status("fetching release", 502).is_transient());
        assert!(!Error::Cancelled.is_transient());
        assert!(Error::corrupt("a.tar.gz", "short").is_archive_failure());
        assert!(Error::malformed("a.tar.gz", "nested").is_archive_failure());
        assert!(!Error::InvalidVersion("x".into()).is_archive_failure());
    }

    #[test]
    fn test_client_errors_are_not_retryable() {
        let forbidden = Error::http_status("fetching latest release", 403);
        assert!(!forbidden.is_transient());
        assert!(!forbidden.is_retryable());

        assert!(Error::http_status("downloading", 408).is_retryable());
        assert!(Error::http_status("downloading", 503).is_retryable());
        assert!(
            Error::Network {
                context: "connecting".into(),
                status: None,
                source: None,
            }
            .is_retryable()
        );

        let limited = Error::RateLimited {
            status: 429,
            reset: None,
            authenticated: true,
        };
        assert!(limited.is_transient());
        assert!(!limited.is_retryable());
    }

    #[test]
    fn test_from_platform_error() {
        let err: Error = PlatformError::unsupported("windows-x86_64", "no builds").into();
        assert!(matches!(err, Error::UnsupportedPlatform { .. }));

        let err: Error = PlatformError::InvalidVersion("1.0".into()).into();
        assert!(matches!(err, Error::InvalidVersion(v) if v == "1.0"));
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            "rename",
            "/tmp/cache/shebe-v1.0.0",
            std::io::Error::other("boom"),
        );
        assert_eq!(
            err.to_string(),
            "I/O error during rename on /tmp/cache/shebe-v1.0.0"
        );
    }
}

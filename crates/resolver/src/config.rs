//! Resolver configuration.
//!
//! Defaults suit the published shebe releases. Every value can be overridden
//! programmatically with the `with_*` builders or, for hosts without their own
//! settings layer, from the environment via [`ResolverConfig::from_env`].

use secrecy::SecretString;
use shebe_platform::ReleaseVersion;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// Repository the releases are published under.
pub const DEFAULT_REPO: &str = "rhobimd-oss/shebe";

/// Base URL of the release store API.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Which release to acquire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VersionRequest {
    /// Whatever the release store marks as latest.
    #[default]
    Latest,
    /// A specific tag.
    Pinned(ReleaseVersion),
}

impl VersionRequest {
    /// Parse `latest` or a release tag.
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            Ok(Self::Latest)
        } else {
            Ok(Self::Pinned(ReleaseVersion::parse(s)?))
        }
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latest => f.write_str("latest"),
            Self::Pinned(v) => write!(f, "{v}"),
        }
    }
}

/// How failed acquisitions are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts for transient network failures.
    pub network_attempts: u32,
    /// Total attempts when the downloaded archive is corrupt or malformed.
    pub archive_attempts: u32,
    /// Delay before the first retry; doubled for each further one.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            network_attempts: 3,
            archive_attempts: 2,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            network_attempts: 1,
            archive_attempts: 1,
            initial_backoff: Duration::ZERO,
        }
    }

    /// Backoff before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }
}

/// Configuration for [`crate::Acquirer`] and [`crate::GithubReleaseStore`].
#[derive(Clone)]
pub struct ResolverConfig {
    /// `owner/name` of the repository publishing releases.
    pub repo: String,
    /// Base URL of the release store API.
    pub api_base: String,
    /// Directory binaries are cached in.
    pub cache_dir: Option<PathBuf>,
    /// Release to acquire.
    pub version: VersionRequest,
    /// Bearer token for the API; raises rate limits.
    pub token: Option<SecretString>,
    /// Upper bound for a whole acquisition. None waits indefinitely.
    pub timeout: Option<Duration>,
    /// Retry behaviour.
    pub retry: RetryPolicy,
    /// User-Agent sent with every request.
    pub user_agent: String,
}

impl fmt::Debug for ResolverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverConfig")
            .field("repo", &self.repo)
            .field("api_base", &self.api_base)
            .field("cache_dir", &self.cache_dir)
            .field("version", &self.version)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            repo: DEFAULT_REPO.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            cache_dir: None,
            version: VersionRequest::Latest,
            token: None,
            timeout: None,
            retry: RetryPolicy::default(),
            user_agent: format!("shebe-resolver/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ResolverConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from environment variables.
    ///
    /// | Variable              | Meaning                           |
    /// |-----------------------|-----------------------------------|
    /// | `SHEBE_REPO`          | `owner/name` of the repository    |
    /// | `SHEBE_RELEASE_API`   | API base URL                      |
    /// | `SHEBE_CACHE_DIR`     | cache directory                   |
    /// | `SHEBE_VERSION`       | `latest` or a tag                 |
    /// | `SHEBE_TIMEOUT_SECS`  | acquisition timeout in seconds    |
    /// | `GITHUB_TOKEN`        | API token (`GH_TOKEN` as fallback)|
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(repo) = non_empty("SHEBE_REPO") {
            config = config.with_repo(repo)?;
        }
        if let Some(api) = non_empty("SHEBE_RELEASE_API") {
            config.api_base = api;
        }
        if let Some(dir) = non_empty("SHEBE_CACHE_DIR") {
            config.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(version) = non_empty("SHEBE_VERSION") {
            config.version = VersionRequest::parse(&version)?;
        }
        if let Some(secs) = non_empty("SHEBE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::Config(format!("SHEBE_TIMEOUT_SECS must be an integer, got '{secs}'"))
            })?;
            config.timeout = Some(Duration::from_secs(secs));
        }
        config.token = non_empty("GITHUB_TOKEN")
            .or_else(|| non_empty("GH_TOKEN"))
            .map(SecretString::from);

        Ok(config)
    }

    /// Set the repository (`owner/name`).
    pub fn with_repo(mut self, repo: impl Into<String>) -> Result<Self> {
        let repo = repo.into();
        match repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                self.repo = repo;
                Ok(self)
            }
            _ => Err(Error::Config(format!(
                "repository must look like owner/name, got '{repo}'"
            ))),
        }
    }

    /// Set the API base URL.
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Set the cache directory.
    #[must_use]
    pub fn with_cache_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Set the requested version.
    #[must_use]
    pub fn with_version(mut self, version: VersionRequest) -> Self {
        self.version = version;
        self
    }

    /// Set the API token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Set the acquisition timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The cache directory, defaulting to the user's local data dir.
    #[must_use]
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }
}

/// Default cache location: `<data_local_dir>/shebe`.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("shebe")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.repo, DEFAULT_REPO);
        assert_eq!(config.api_base, DEFAULT_API_BASE);
        assert_eq!(config.version, VersionRequest::Latest);
        assert!(config.token.is_none());
        assert!(config.timeout.is_none());
        assert!(config.cache_dir().ends_with("shebe"));
    }

    #[test]
    fn test_from_lookup_reads_everything() {
        let config = ResolverConfig::from_lookup(lookup(&[
            ("SHEBE_REPO", "acme/shebe-fork"),
            ("SHEBE_RELEASE_API", "http://127.0.0.1:9000"),
            ("SHEBE_CACHE_DIR", "/tmp/shebe-cache"),
            ("SHEBE_VERSION", "v0.5.3"),
            ("SHEBE_TIMEOUT_SECS", "30"),
            ("GITHUB_TOKEN", "ghp_secret"),
        ]))
        .unwrap();

        assert_eq!(config.repo, "acme/shebe-fork");
        assert_eq!(config.api_base, "http://127.0.0.1:9000");
        assert_eq!(config.cache_dir(), PathBuf::from("/tmp/shebe-cache"));
        assert_eq!(
            config.version,
            VersionRequest::Pinned(ReleaseVersion::parse("v0.5.3").unwrap())
        );
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            config.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("ghp_secret".to_string())
        );
    }

    #[test]
    fn test_gh_token_fallback_and_empty_token() {
        let config = ResolverConfig::from_lookup(lookup(&[
            ("GITHUB_TOKEN", ""),
            ("GH_TOKEN", "gho_fallback"),
        ]))
        .unwrap();
        assert_eq!(
            config.token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("gho_fallback".to_string())
        );

        let config = ResolverConfig::from_lookup(lookup(&[("GITHUB_TOKEN", "  ")])).unwrap();
        assert!(config.token.is_none());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ResolverConfig::from_lookup(lookup(&[("SHEBE_VERSION", "0.5.3")])).is_err());
        assert!(ResolverConfig::from_lookup(lookup(&[("SHEBE_TIMEOUT_SECS", "soon")])).is_err());
        assert!(ResolverConfig::from_lookup(lookup(&[("SHEBE_REPO", "no-slash")])).is_err());
    }

    #[test]
    fn test_version_request_parse() {
        assert_eq!(VersionRequest::parse("latest").unwrap(), VersionRequest::Latest);
        assert_eq!(VersionRequest::parse("LATEST").unwrap(), VersionRequest::Latest);
        assert_eq!(VersionRequest::parse("").unwrap(), VersionRequest::Latest);
        assert!(matches!(
            VersionRequest::parse("v1.2.3").unwrap(),
            VersionRequest::Pinned(_)
        ));
        assert!(matches!(
            VersionRequest::parse("1.2.3"),
            Err(Error::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ResolverConfig::default().with_token("ghp_topsecret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("ghp_topsecret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_retry_backoff_doubles() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(RetryPolicy::none().backoff(5), Duration::ZERO);
    }
}

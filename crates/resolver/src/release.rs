//! Release store access.
//!
//! The [`ReleaseStore`] trait is the seam between the acquisition pipeline and
//! wherever releases live. [`GithubReleaseStore`] talks to the GitHub Releases
//! API (or anything serving the same JSON shape).

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, HeaderMap, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use shebe_platform::ReleaseVersion;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{ResolverConfig, VersionRequest};
use crate::{Error, Result};

/// Release metadata as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Release tag, e.g. `v0.5.3`.
    pub tag_name: String,
    /// Whether this is a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// Whether this is an unpublished draft.
    #[serde(default)]
    pub draft: bool,
    /// Downloadable files attached to the release.
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// The validated release version.
    pub fn version(&self) -> Result<ReleaseVersion> {
        Ok(ReleaseVersion::parse(&self.tag_name)?)
    }

    /// Find an asset by exact name.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// Names of all assets, in API order.
    #[must_use]
    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.name.clone()).collect()
    }
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    /// File name.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: String,
    /// Size in bytes as reported by the store.
    pub size: u64,
}

/// An open asset download.
#[derive(Debug)]
pub struct AssetStream {
    /// The HTTP response whose body is the archive.
    pub response: Response,
    /// Content-Length announced by the server, if any.
    pub content_length: Option<u64>,
}

/// Source of release metadata and archives.
#[async_trait]
pub trait ReleaseStore: Send + Sync {
    /// Fetch the release record for a request.
    async fn release(&self, request: &VersionRequest) -> Result<Release>;

    /// Start downloading an asset.
    async fn open_asset(&self, asset: &ReleaseAsset) -> Result<AssetStream>;
}

/// Release store backed by the GitHub Releases API.
///
/// The latest-release lookup is memoised for the lifetime of the store, so any
/// number of acquirers sharing one store (via `Arc`) cost a single API call.
pub struct GithubReleaseStore {
    client: Client,
    api_base: String,
    repo: String,
    token: Option<SecretString>,
    latest: OnceCell<Release>,
}

impl std::fmt::Debug for GithubReleaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubReleaseStore")
            .field("api_base", &self.api_base)
            .field("repo", &self.repo)
            .field("authenticated", &self.token.is_some())
            .field("latest_cached", &self.latest.initialized())
            .finish_non_exhaustive()
    }
}

impl GithubReleaseStore {
    /// Create a store from resolver configuration.
    pub fn new(config: &ResolverConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            "application/vnd.github+json"
                .parse()
                .map_err(|_| Error::Config("invalid Accept header".to_string()))?,
        );
        headers.insert(
            USER_AGENT,
            config
                .user_agent
                .parse()
                .map_err(|_| Error::Config(format!("invalid user agent '{}'", config.user_agent)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| Error::network("building HTTP client", e))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token: config.token.clone(),
            latest: OnceCell::new(),
        })
    }

    /// URL of the release record for a request.
    #[must_use]
    pub fn release_url(&self, request: &VersionRequest) -> String {
        match request {
            VersionRequest::Latest => {
                format!("{}/repos/{}/releases/latest", self.api_base, self.repo)
            }
            VersionRequest::Pinned(tag) => {
                format!("{}/repos/{}/releases/tags/{}", self.api_base, self.repo, tag)
            }
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let request = self.client.get(url);
        match &self.token {
            Some(token) => request.header(
                AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            ),
            None => request,
        }
    }

    async fn fetch_release(&self, request: &VersionRequest) -> Result<Release> {
        let url = self.release_url(request);
        debug!(%url, "Fetching release");

        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::network(format!("fetching {request} release"), e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::ReleaseNotFound {
                requested: request.to_string(),
                asset: String::from("(release record)"),
                status: Some(status.as_u16()),
                available: Vec::new(),
            });
        }
        self.check_status(&response, &format!("fetching {request} release"))?;

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::network(format!("reading {request} release"), e))?;
        let release: Release = serde_json::from_slice(&body).map_err(|source| Error::Json {
            context: format!("parsing {request} release from {url}"),
            source,
        })?;

        info!(tag = %release.tag_name, assets = release.assets.len(), "Fetched release");
        Ok(release)
    }

    /// Map rate-limit and error statuses onto the error taxonomy.
    fn check_status(&self, response: &Response, context: &str) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if let Some(limited) = rate_limit(response, self.token.is_some()) {
            warn!(status = status.as_u16(), "Release API rate limit exhausted");
            return Err(limited);
        }
        Err(Error::http_status(context, status.as_u16()))
    }
}

/// Detect an exhausted quota: 403 or 429 with `x-ratelimit-remaining: 0`.
fn rate_limit(response: &Response, authenticated: bool) -> Option<Error> {
    let status = response.status();
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    let header = |name: &str| {
        response
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
    };
    let exhausted = header("x-ratelimit-remaining") == Some("0");
    if !exhausted && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    Some(Error::RateLimited {
        status: status.as_u16(),
        reset: header("x-ratelimit-reset").and_then(|r| r.parse().ok()),
        authenticated,
    })
}

#[async_trait]
impl ReleaseStore for GithubReleaseStore {
    async fn release(&self, request: &VersionRequest) -> Result<Release> {
        match request {
            VersionRequest::Latest => self
                .latest
                .get_or_try_init(|| self.fetch_release(request))
                .await
                .cloned(),
            VersionRequest::Pinned(_) => self.fetch_release(request).await,
        }
    }

    async fn open_asset(&self, asset: &ReleaseAsset) -> Result<AssetStream> {
        debug!(url = %asset.browser_download_url, asset = %asset.name, "Downloading asset");

        let response = self
            .get(&asset.browser_download_url)
            .header(ACCEPT, "application/octet-stream")
            .send()
            .await
            .map_err(|e| Error::network(format!("downloading {}", asset.name), e))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ReleaseNotFound {
                requested: asset.browser_download_url.clone(),
                asset: asset.name.clone(),
                status: Some(StatusCode::NOT_FOUND.as_u16()),
                available: Vec::new(),
            });
        }
        self.check_status(&response, &format!("downloading {}", asset.name))?;

        // reqwest's content_length() reports the body size hint, which is 0
        // for some chunked responses; read the header itself instead.
        let content_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());

        Ok(AssetStream {
            response,
            content_length,
        })
    }
}

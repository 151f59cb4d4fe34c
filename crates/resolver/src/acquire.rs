//! The acquisition pipeline.
//!
//! ```text
//! Idle → Resolving → Downloading → Verifying → Extracting → Ready
//!            └────────────┴─────────────┴────────────┴──────→ Failed
//! ```
//!
//! An [`Acquirer`] runs the pipeline at most once successfully: the first
//! result is memoised and every later call returns it without any I/O.

use serde::Serialize;
use shebe_platform::{Platform, ReleaseVersion, detect_platform, ensure_supported};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{BinaryCache, CachedBinary};
use crate::config::{ResolverConfig, VersionRequest};
use crate::conformance::select_convention;
use crate::download::download_to;
use crate::launch::LaunchCommand;
use crate::release::{GithubReleaseStore, ReleaseAsset, ReleaseStore};
use crate::{Error, Result};

/// Where an acquisition currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionState {
    /// Nothing has been attempted yet.
    Idle,
    /// Mapping the platform and looking up the release.
    Resolving,
    /// Streaming the archive.
    Downloading,
    /// Checking the received size.
    Verifying,
    /// Unpacking into the cache.
    Extracting,
    /// The binary is installed.
    Ready,
    /// The last attempt failed.
    Failed,
}

impl AcquisitionState {
    /// Whether the state is final for the current attempt.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Verifying => "verifying",
            Self::Extracting => "extracting",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A successfully acquired binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acquired {
    /// The installed binary.
    pub binary: CachedBinary,
    /// Whether it was already in the cache (no download happened).
    pub from_cache: bool,
}

impl Acquired {
    /// The command that starts the MCP server.
    #[must_use]
    pub fn launch_command(&self) -> LaunchCommand {
        LaunchCommand::for_binary(&self.binary)
    }
}

/// Acquires the shebe-mcp binary for one platform and cache directory.
pub struct Acquirer {
    config: ResolverConfig,
    store: Arc<dyn ReleaseStore>,
    platform: Platform,
    cache: BinaryCache,
    state: watch::Sender<AcquisitionState>,
    acquired: OnceCell<Acquired>,
}

impl fmt::Debug for Acquirer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquirer")
            .field("config", &self.config)
            .field("platform", &self.platform)
            .field("cache", &self.cache)
            .field("state", &*self.state.borrow())
            .field("acquired", &self.acquired.get())
            .finish_non_exhaustive()
    }
}

impl Acquirer {
    /// Create an acquirer backed by the GitHub Releases API.
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let store = Arc::new(GithubReleaseStore::new(&config)?);
        Ok(Self::with_store(config, store))
    }

    /// Create an acquirer backed by any release store.
    ///
    /// Sharing one store between acquirers shares its latest-release lookup.
    #[must_use]
    pub fn with_store(config: ResolverConfig, store: Arc<dyn ReleaseStore>) -> Self {
        let cache = BinaryCache::new(config.cache_dir());
        let (state, _) = watch::channel(AcquisitionState::Idle);
        Self {
            config,
            store,
            platform: detect_platform(),
            cache,
            state,
            acquired: OnceCell::new(),
        }
    }

    /// Acquire for `platform` instead of the host.
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The target platform.
    #[must_use]
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// The cache binaries are installed into.
    #[must_use]
    pub fn cache(&self) -> &BinaryCache {
        &self.cache
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Current pipeline state.
    #[must_use]
    pub fn state(&self) -> AcquisitionState {
        *self.state.borrow()
    }

    /// Subscribe to pipeline state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AcquisitionState> {
        self.state.subscribe()
    }

    /// Acquire the binary, or return the one acquired earlier.
    pub async fn acquire(&self) -> Result<Acquired> {
        self.acquire_with(CancellationToken::new()).await
    }

    /// Like [`Self::acquire`], aborting with [`Error::Cancelled`] once
    /// `cancel` fires.
    pub async fn acquire_with(&self, cancel: CancellationToken) -> Result<Acquired> {
        self.acquired
            .get_or_try_init(|| self.run(cancel))
            .await
            .cloned()
    }

    async fn run(&self, caller: CancellationToken) -> Result<Acquired> {
        let cancel = caller.child_token();
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = self.run_with_timeout(&cancel) => result,
        };

        match &outcome {
            Ok(acquired) => {
                self.set_state(AcquisitionState::Ready);
                info!(
                    path = ?acquired.binary.path,
                    version = %acquired.binary.version,
                    from_cache = acquired.from_cache,
                    "shebe-mcp ready"
                );
                // Only fresh installs prune other versions.
                if !acquired.from_cache {
                    self.cache.prune_except(&acquired.binary.version).await;
                }
            }
            Err(e) => {
                // Make sure a cancelled install cannot complete behind our back.
                cancel.cancel();
                self.set_state(AcquisitionState::Failed);
                warn!(error = %e, "Acquisition failed");
            }
        }
        outcome
    }

    async fn run_with_timeout(&self, cancel: &CancellationToken) -> Result<Acquired> {
        let Some(timeout) = self.config.timeout else {
            return self.pipeline(cancel).await;
        };
        match tokio::time::timeout(timeout, self.pipeline(cancel)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Network {
                context: format!("acquiring shebe-mcp (timed out after {timeout:?})"),
                status: None,
                source: None,
            }),
        }
    }

    async fn pipeline(&self, cancel: &CancellationToken) -> Result<Acquired> {
        self.set_state(AcquisitionState::Resolving);
        ensure_supported(&self.platform)?;

        if let VersionRequest::Pinned(version) = &self.config.version
            && let Some(binary) = self.cache.lookup(version, &self.platform)
        {
            debug!(%version, "Pinned version already cached; skipping the release store");
            return Ok(Acquired {
                binary,
                from_cache: true,
            });
        }

        let request = &self.config.version;
        let release = self
            .with_network_retries("fetching release", || self.store.release(request))
            .await?;
        let version = release.version()?;
        if let VersionRequest::Pinned(pinned) = request
            && *pinned != version
        {
            return Err(Error::ReleaseNotFound {
                requested: pinned.to_string(),
                asset: format!("(release tagged {})", release.tag_name),
                status: None,
                available: release.asset_names(),
            });
        }

        if let Some(binary) = self.cache.lookup(&version, &self.platform) {
            return Ok(Acquired {
                binary,
                from_cache: true,
            });
        }

        let selection = select_convention(&release, &self.platform)?;
        info!(
            %version,
            asset = %selection.asset.name,
            platform = %self.platform,
            "Resolved release asset"
        );

        let binary = self.fetch_and_install(selection.asset, &version, cancel).await?;
        Ok(Acquired {
            binary,
            from_cache: false,
        })
    }

    /// Download, verify and install, retrying damaged archives.
    async fn fetch_and_install(
        &self,
        asset: &ReleaseAsset,
        version: &ReleaseVersion,
        cancel: &CancellationToken,
    ) -> Result<CachedBinary> {
        self.cache.ensure_root()?;
        let policy = self.config.retry;
        let mut attempt = 1;

        loop {
            match self.fetch_and_install_once(asset, version, cancel).await {
                Err(e) if e.is_archive_failure() && attempt < policy.archive_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        asset = %asset.name,
                        attempt,
                        error = %e,
                        ?delay,
                        "Archive unusable; downloading again"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn fetch_and_install_once(
        &self,
        asset: &ReleaseAsset,
        version: &ReleaseVersion,
        cancel: &CancellationToken,
    ) -> Result<CachedBinary> {
        self.set_state(AcquisitionState::Downloading);
        let archive = self
            .with_network_retries("downloading asset", || async move {
                let stream = self.store.open_asset(asset).await?;
                download_to(self.cache.root(), asset, stream).await
            })
            .await?;

        self.set_state(AcquisitionState::Verifying);
        archive.verify(asset)?;

        self.set_state(AcquisitionState::Extracting);
        self.cache
            .install(archive, &asset.name, version, &self.platform, cancel)
            .await
    }

    /// Run `op`, retrying transport failures and server errors with
    /// exponential backoff.
    ///
    /// See [`Error::is_retryable`]; rate limiting, client errors and missing
    /// releases are returned at once.
    async fn with_network_retries<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.config.retry;
        let mut attempt = 1;
        loop {
            match op().await {
                Err(e) if e.is_retryable() && attempt < policy.network_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(%what, attempt, error = %e, ?delay, "Network error; retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn set_state(&self, state: AcquisitionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Acquisition state");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(AcquisitionState::Ready.is_terminal());
        assert!(AcquisitionState::Failed.is_terminal());
        assert!(!AcquisitionState::Downloading.is_terminal());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&AcquisitionState::Extracting).unwrap(),
            "\"extracting\""
        );
        assert_eq!(AcquisitionState::Verifying.to_string(), "verifying");
    }

    #[test]
    fn test_relative_cache_dir_gives_absolute_paths() {
        let config = ResolverConfig::default().with_cache_dir("relative-shebe-cache");
        let acquirer = Acquirer::new(config).unwrap();
        assert!(acquirer.cache().root().is_absolute());
        assert!(acquirer.cache().root().ends_with("relative-shebe-cache"));
    }

    #[test]
    fn test_new_acquirer_is_idle() {
        let acquirer = Acquirer::new(ResolverConfig::default()).unwrap();
        assert_eq!(acquirer.state(), AcquisitionState::Idle);
        assert_eq!(*acquirer.platform(), detect_platform());
    }
}

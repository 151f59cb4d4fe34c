//! On-disk binary cache.
//!
//! Layout:
//! ```text
//! {cache_dir}/
//! ├── .shebe.lock             # exclusive lock held while installing
//! ├── shebe-v0.5.3/
//! │   ├── shebe-mcp           # the executable
//! │   └── receipt.json        # CachedBinary record
//! └── .staging-XXXXXX/        # in-flight extraction, renamed into place
//! ```
//!
//! A version directory only ever appears through a rename of a fully
//! populated staging directory, so readers never observe a half-written
//! binary or a receipt for a different version.

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use shebe_platform::{BINARY_NAME, Platform, ReleaseVersion};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::download::DownloadedArchive;
use crate::extract::{extract_archive, is_executable};
use crate::{Error, Result};

/// Name of the receipt written next to each cached binary.
pub const RECEIPT_FILE: &str = "receipt.json";

/// Name of the lock file inside the cache directory.
pub const LOCK_FILE: &str = ".shebe.lock";

/// A binary installed in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBinary {
    /// Absolute path of the executable.
    pub path: PathBuf,
    /// Release the binary came from.
    pub version: ReleaseVersion,
    /// Platform the binary was built for.
    pub platform: Platform,
    /// Asset the binary was extracted from.
    pub asset: String,
    /// Size of the downloaded archive in bytes.
    pub size: u64,
    /// Hex SHA-256 of the downloaded archive.
    pub sha256: String,
}

/// Exclusive hold on the cache directory. Released on drop.
#[derive(Debug)]
pub struct CacheLock {
    _file: File,
}

/// The cache directory and the operations on it.
#[derive(Debug, Clone)]
pub struct BinaryCache {
    root: PathBuf,
}

impl BinaryCache {
    /// Create a cache rooted at `root`. Nothing is touched on disk yet.
    ///
    /// A relative root is resolved against the current directory here, so
    /// every path handed out or recorded in a receipt is absolute.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    /// The cache root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding one version: `shebe-{version}`.
    #[must_use]
    pub fn version_dir(&self, version: &ReleaseVersion) -> PathBuf {
        self.root.join(format!("shebe-{version}"))
    }

    /// Where the executable for `version` lives once installed.
    #[must_use]
    pub fn binary_path(&self, version: &ReleaseVersion) -> PathBuf {
        self.version_dir(version).join(BINARY_NAME)
    }

    /// Path of the receipt for `version`.
    #[must_use]
    pub fn receipt_path(&self, version: &ReleaseVersion) -> PathBuf {
        self.version_dir(version).join(RECEIPT_FILE)
    }

    /// Create the cache root if needed.
    pub fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|e| Error::io("create cache directory", &self.root, e))
    }

    /// Return the cached binary for `version` on `platform` if it is usable.
    ///
    /// Usable means the receipt parses, names this version, this path and the
    /// same OS and architecture, and the executable exists with its executable
    /// bit set. Anything less is a miss and the version will be downloaded
    /// again.
    #[must_use]
    pub fn lookup(&self, version: &ReleaseVersion, platform: &Platform) -> Option<CachedBinary> {
        let receipt_path = self.receipt_path(version);
        let contents = match fs::read(&receipt_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(%version, "Cache miss");
                return None;
            }
            Err(e) => {
                debug!(%version, error = %e, "Unreadable receipt; treating as a miss");
                return None;
            }
        };

        let receipt: CachedBinary = match serde_json::from_slice(&contents) {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(path = ?receipt_path, error = %e, "Corrupt receipt; treating as a miss");
                return None;
            }
        };

        let expected_path = self.binary_path(version);
        if receipt.version != *version || receipt.path != expected_path {
            warn!(
                %version,
                recorded = %receipt.version,
                path = ?receipt.path,
                "Receipt does not match its directory; treating as a miss"
            );
            return None;
        }
        if receipt.platform.os != platform.os || receipt.platform.arch != platform.arch {
            debug!(
                %version,
                cached = %receipt.platform,
                requested = %platform,
                "Cached binary is for another platform; treating as a miss"
            );
            return None;
        }
        if !is_executable(&receipt.path) {
            debug!(path = ?receipt.path, "Cached binary missing or not executable");
            return None;
        }

        debug!(%version, path = ?receipt.path, "Cache hit");
        Some(receipt)
    }

    /// Take the exclusive cache lock, waiting for other holders.
    pub async fn lock(&self) -> Result<CacheLock> {
        let path = self.root.join(LOCK_FILE);
        tokio::task::spawn_blocking(move || lock_file(&path))
            .await
            .map_err(|e| Error::io("wait for cache lock", LOCK_FILE, std::io::Error::other(e)))?
    }

    /// Install a downloaded archive as `version`.
    ///
    /// Runs under the cache lock. If another caller installed this version and platform
    /// while this one was downloading, its binary is returned and the archive
    /// is discarded. A cancellation observed before the final rename leaves
    /// the cache untouched.
    pub async fn install(
        &self,
        archive: DownloadedArchive,
        asset: &str,
        version: &ReleaseVersion,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<CachedBinary> {
        let cache = self.clone();
        let asset = asset.to_string();
        let version = version.clone();
        let platform = *platform;
        let cancel = cancel.clone();

        tokio::task::spawn_blocking(move || {
            let _lock = lock_file(&cache.root.join(LOCK_FILE))?;
            let result = cache.install_locked(&archive, &asset, &version, &platform, &cancel);
            // Remove the download before another holder can look at the cache.
            drop(archive);
            result
        })
        .await
        .map_err(|e| Error::io("install binary", &self.root, std::io::Error::other(e)))?
    }

    fn install_locked(
        &self,
        archive: &DownloadedArchive,
        asset: &str,
        version: &ReleaseVersion,
        platform: &Platform,
        cancel: &CancellationToken,
    ) -> Result<CachedBinary> {
        if let Some(existing) = self.lookup(version, platform) {
            info!(%version, "Another process installed this version first");
            return Ok(existing);
        }

        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.root)
            .map_err(|e| Error::io("create staging directory", &self.root, e))?;

        extract_archive(archive.path(), asset, BINARY_NAME, staging.path())?;

        let receipt = CachedBinary {
            path: self.binary_path(version),
            version: version.clone(),
            platform: *platform,
            asset: asset.to_string(),
            size: archive.size,
            sha256: archive.sha256.clone(),
        };
        write_receipt(&staging, &receipt)?;

        if cancel.is_cancelled() {
            debug!(%version, "Cancelled before install; discarding staging directory");
            return Err(Error::Cancelled);
        }

        let final_dir = self.version_dir(version);
        if final_dir.exists() {
            // Damaged, or built for another platform; the lookup above
            // already rejected it.
            fs::remove_dir_all(&final_dir)
                .map_err(|e| Error::io("remove stale version directory", &final_dir, e))?;
        }
        fs::rename(staging.path(), &final_dir)
            .map_err(|e| Error::io("move binary into place", &final_dir, e))?;
        // The staging path no longer exists, so dropping the guard is a no-op.
        drop(staging);

        info!(%version, path = ?receipt.path, "Installed binary");
        Ok(receipt)
    }

    /// Remove version directories other than `keep`.
    ///
    /// Best effort: failures are logged and otherwise ignored.
    pub async fn prune_except(&self, keep: &ReleaseVersion) {
        let _lock = match self.lock().await {
            Ok(lock) => lock,
            Err(e) => {
                warn!(error = %e, "Could not lock cache for pruning");
                return;
            }
        };

        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = ?self.root, error = %e, "Could not list cache for pruning");
                return;
            }
        };

        let keep_name = format!("shebe-{keep}");
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with("shebe-") || name == keep_name {
                continue;
            }
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path) {
                Ok(()) => info!(?path, "Pruned old version"),
                Err(e) => warn!(?path, error = %e, "Failed to prune old version"),
            }
        }
    }
}

fn lock_file(path: &Path) -> Result<CacheLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("create cache directory", parent, e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| Error::io("open cache lock", path, e))?;
    FileExt::lock_exclusive(&file).map_err(|e| Error::io("lock cache", path, e))?;
    debug!(?path, "Acquired cache lock");
    Ok(CacheLock { _file: file })
}

fn write_receipt(staging: &TempDir, receipt: &CachedBinary) -> Result<()> {
    let path = staging.path().join(RECEIPT_FILE);
    let contents = serde_json::to_vec_pretty(receipt).map_err(|source| Error::Json {
        context: format!("writing receipt for {}", receipt.version),
        source,
    })?;
    fs::write(&path, contents).map_err(|e| Error::io("write receipt", &path, e))
}

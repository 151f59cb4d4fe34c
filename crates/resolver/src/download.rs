//! Streaming asset download with size verification.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::release::{AssetStream, ReleaseAsset};
use crate::{Error, Result};

/// A fully downloaded and size-checked archive.
///
/// The file lives in a temporary location and is deleted when this value is
/// dropped, so an abandoned download never lingers.
#[derive(Debug)]
pub struct DownloadedArchive {
    /// Temporary file holding the archive.
    pub file: NamedTempFile,
    /// Bytes received.
    pub size: u64,
    /// Hex SHA-256 of the received bytes.
    pub sha256: String,
    /// Content-Length the server announced, if any.
    pub content_length: Option<u64>,
}

impl DownloadedArchive {
    /// Path of the temporary archive file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Check the received size against the release record and the response.
    pub fn verify(&self, asset: &ReleaseAsset) -> Result<()> {
        verify_size(&asset.name, asset.size, self.content_length, self.size)?;
        debug!(asset = %asset.name, size = self.size, "Verified download size");
        Ok(())
    }
}

/// Stream an asset into a temporary file inside `dir`.
///
/// Bytes are hashed as they arrive. Sizes are not checked here; call
/// [`DownloadedArchive::verify`] before trusting the file.
pub async fn download_to(
    dir: &Path,
    asset: &ReleaseAsset,
    stream: AssetStream,
) -> Result<DownloadedArchive> {
    let temp = tempfile::Builder::new()
        .prefix(".download-")
        .suffix(".tar.gz")
        .tempfile_in(dir)
        .map_err(|e| Error::io("create temporary download file", dir, e))?;

    let std_file = temp
        .as_file()
        .try_clone()
        .map_err(|e| Error::io("open temporary download file", temp.path(), e))?;
    let mut file = tokio::fs::File::from_std(std_file);

    let AssetStream {
        response,
        content_length,
    } = stream;
    let mut body = response.bytes_stream();
    let mut hasher = Sha256::new();
    let mut received: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) if received > 0 => {
                // A connection dropped mid-body is a truncated archive.
                warn!(asset = %asset.name, received, error = %e, "Download interrupted");
                return Err(Error::corrupt(
                    &asset.name,
                    format!("stream ended after {received} bytes: {e}"),
                ));
            }
            Err(e) => return Err(Error::network(format!("downloading {}", asset.name), e)),
        };
        file.write_all(&chunk)
            .await
            .map_err(|e| Error::io("write download", temp.path(), e))?;
        hasher.update(&chunk);
        received += chunk.len() as u64;
    }

    file.flush()
        .await
        .map_err(|e| Error::io("flush download", temp.path(), e))?;
    file.sync_all()
        .await
        .map_err(|e| Error::io("sync download", temp.path(), e))?;

    let sha256 = hex_digest(hasher);
    debug!(asset = %asset.name, size = received, %sha256, "Downloaded asset");

    Ok(DownloadedArchive {
        file: temp,
        size: received,
        sha256,
        content_length,
    })
}

/// Lowercase hex of a finished SHA-256.
fn hex_digest(hasher: Sha256) -> String {
    hex::encode(hasher.finalize())
}

/// Compare the received byte count against what the store announced.
pub fn verify_size(
    asset: &str,
    expected: u64,
    content_length: Option<u64>,
    received: u64,
) -> Result<()> {
    if let Some(length) = content_length
        && length != received
    {
        return Err(Error::corrupt(
            asset,
            format!("received {received} bytes but Content-Length was {length}"),
        ));
    }
    if expected != received {
        return Err(Error::corrupt(
            asset,
            format!("received {received} bytes but the release lists {expected}"),
        ));
    }
    Ok(())
}

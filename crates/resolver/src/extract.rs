//! Release archive extraction.
//!
//! Release archives are gzip-compressed tarballs with the executable at the
//! archive root. Anything else (a binary tucked into a directory, a symlink
//! instead of a file, entries escaping the destination) is rejected rather
//! than guessed at.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Unpack `archive` into `dest` and return the path of the root executable.
///
/// `dest` must already exist. The executable bit is set on the binary if the
/// archive did not carry it.
pub fn extract_archive(
    archive: &Path,
    asset: &str,
    binary_name: &str,
    dest: &Path,
) -> Result<PathBuf> {
    debug!(?archive, ?dest, %asset, "Extracting archive");

    let file = File::open(archive).map_err(|e| Error::io("open archive", archive, e))?;
    let mut tar = Archive::new(GzDecoder::new(file));
    tar.set_overwrite(true);

    let mut root_binary = false;
    let mut nested: Option<String> = None;
    let mut seen = Vec::new();

    let entries = tar
        .entries()
        .map_err(|e| classify(asset, "read archive", archive, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| classify(asset, "read archive entry", archive, e))?;
        let raw_path = entry
            .path()
            .map_err(|e| Error::malformed(asset, format!("invalid entry path: {e}")))?
            .into_owned();
        let components = normal_components(&raw_path)
            .ok_or_else(|| Error::malformed(asset, format!("unsafe entry path {raw_path:?}")))?;
        let shown = components.join("/");
        trace!(entry = %shown, kind = ?entry.header().entry_type(), "Archive entry");

        if components.last().is_some_and(|name| name == binary_name) {
            if components.len() == 1 {
                let kind = entry.header().entry_type();
                if !matches!(kind, EntryType::Regular | EntryType::Continuous) {
                    return Err(Error::malformed(
                        asset,
                        format!("{binary_name} at archive root is a {kind:?}, not a regular file"),
                    ));
                }
                root_binary = true;
            } else if nested.is_none() {
                nested = Some(shown.clone());
            }
        }
        if !shown.is_empty() {
            seen.push(shown);
        }

        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| classify(asset, "unpack archive entry", dest, e))?;
        if !unpacked {
            return Err(Error::malformed(
                asset,
                format!("entry {raw_path:?} escapes the extraction directory"),
            ));
        }
    }

    if !root_binary {
        let message = match nested {
            Some(path) => format!("{binary_name} found at '{path}', expected at the archive root"),
            None => format!("{binary_name} not found; archive contains {seen:?}"),
        };
        return Err(Error::malformed(asset, message));
    }

    let binary = dest.join(binary_name);
    if ensure_executable(&binary)? {
        debug!(?binary, "Archive did not preserve the executable bit; set it");
    }
    Ok(binary)
}

/// Split an entry path into its normal components.
///
/// Returns None for absolute paths or paths containing `..`; a leading `./`
/// is ignored.
fn normal_components(path: &Path) -> Option<Vec<String>> {
    let mut out = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part.to_string_lossy().into_owned()),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

/// Decode failures mean a damaged download; anything else is local I/O.
fn classify(asset: &str, operation: &str, path: &Path, err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput => {
            Error::corrupt(asset, format!("{operation}: {err}"))
        }
        _ => Error::io(operation, path, err),
    }
}

/// Make sure `path` is executable by its owner, group and others.
///
/// Returns whether the mode had to be changed.
#[cfg(unix)]
pub fn ensure_executable(path: &Path) -> Result<bool> {
    use std::os::unix::fs::PermissionsExt;

    let mut perms = std::fs::metadata(path)
        .map_err(|e| Error::io("stat binary", path, e))?
        .permissions();
    let mode = perms.mode();
    if mode & 0o111 == 0o111 {
        return Ok(false);
    }
    perms.set_mode(mode | 0o755);
    std::fs::set_permissions(path, perms).map_err(|e| Error::io("chmod binary", path, e))?;
    Ok(true)
}

/// Make sure `path` is executable. Nothing to do off Unix.
#[cfg(not(unix))]
pub fn ensure_executable(path: &Path) -> Result<bool> {
    std::fs::metadata(path).map_err(|e| Error::io("stat binary", path, e))?;
    Ok(false)
}

/// Whether `path` is a file with the executable bit set.
#[must_use]
pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{TarEntry, gzip_tarball, noise};
    use tempfile::TempDir;

    fn write_archive(dir: &Path, entries: &[TarEntry<'_>]) -> PathBuf {
        let path = dir.join("asset.tar.gz");
        std::fs::write(&path, gzip_tarball(entries)).unwrap();
        path
    }

    #[test]
    fn test_extracts_root_binary() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(
            temp.path(),
            &[
                TarEntry::file("shebe-mcp", b"#!/bin/sh\necho hi\n", 0o755),
                TarEntry::file("LICENSE", b"MIT", 0o644),
            ],
        );
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let binary = extract_archive(&archive, "asset.tar.gz", "shebe-mcp", &dest).unwrap();
        assert_eq!(binary, dest.join("shebe-mcp"));
        assert!(is_executable(&binary));
        assert!(dest.join("LICENSE").exists());
    }

    #[test]
    fn test_accepts_dot_slash_prefix() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(temp.path(), &[TarEntry::file("./shebe-mcp", b"bin", 0o755)]);
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        assert!(extract_archive(&archive, "asset.tar.gz", "shebe-mcp", &dest).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_sets_missing_executable_bit() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(temp.path(), &[TarEntry::file("shebe-mcp", b"bin", 0o644)]);
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let binary = extract_archive(&archive, "asset.tar.gz", "shebe-mcp", &dest).unwrap();
        assert!(is_executable(&binary));
    }

    #[test]
    fn test_nested_binary_is_malformed() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(
            temp.path(),
            &[TarEntry::file("shebe-v0.5.3/shebe-mcp", b"bin", 0o755)],
        );
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let err = extract_archive(&archive, "asset.tar.gz", "shebe-mcp", &dest).unwrap_err();
        assert!(matches!(err, Error::MalformedArchive { .. }));
        assert!(err.to_string().contains("shebe-v0.5.3/shebe-mcp"));
    }

    #[test]
    fn test_missing_binary_is_malformed() {
        let temp = TempDir::new().unwrap();
        let archive = write_archive(temp.path(), &[TarEntry::file("README.md", b"hi", 0o644)]);
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let err = extract_archive(&archive, "asset.tar.gz", "shebe-mcp", &dest).unwrap_err();
        assert!(matches!(err, Error::MalformedArchive { .. }));
        assert!(err.to_string().contains("README.md"));
    }

    #[test]
    fn test_truncated_archive_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let payload = noise(64 * 1024);
        let full = gzip_tarball(&[TarEntry::file("shebe-mcp", &payload, 0o755)]);
        let archive = temp.path().join("truncated.tar.gz");
        std::fs::write(&archive, &full[..full.len() / 2]).unwrap();
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let err = extract_archive(&archive, "truncated.tar.gz", "shebe-mcp", &dest).unwrap_err();
        assert!(
            matches!(err, Error::CorruptArchive { .. }),
            "expected CorruptArchive, got {err:?}"
        );
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("garbage.tar.gz");
        std::fs::write(&archive, b"this is not gzip at all").unwrap();
        let dest = temp.path().join("out");
        std::fs::create_dir(&dest).unwrap();

        let err = extract_archive(&archive, "garbage.tar.gz", "shebe-mcp", &dest).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive { .. }), "{err:?}");
    }

    #[test]
    fn test_normal_components() {
        assert_eq!(
            normal_components(Path::new("./a/b")),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(normal_components(Path::new("../etc/passwd")), None);
        assert_eq!(normal_components(Path::new("/etc/passwd")), None);
    }

    #[test]
    fn test_is_executable_missing_file() {
        assert!(!is_executable(Path::new("/definitely/not/here")));
    }
}

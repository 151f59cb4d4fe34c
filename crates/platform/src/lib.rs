//! Platform detection and release-asset naming for shebe.
//!
//! This crate is the pure half of binary acquisition. It knows nothing about
//! HTTP or the filesystem, which keeps it usable from the Zed extension
//! (compiled to wasm) as well as from the native resolver.
//!
//! - [`detect_platform`] describes the host as a [`Platform`]
//! - [`ReleaseVersion`] validates release tags (`v1.2.3`)
//! - [`asset_name`] maps a version and platform to the archive name published
//!   on the release store
//!
//! # Example
//!
//! ```
//! use shebe_platform::{Arch, Os, Platform, ReleaseVersion, asset_name};
//!
//! let version = ReleaseVersion::parse("v0.5.3")?;
//! let platform = Platform::new(Os::MacOs, Arch::Arm64);
//! let asset = asset_name(&version, &platform)?;
//! assert_eq!(asset.as_str(), "shebe-v0.5.3-darwin-aarch64.tar.gz");
//! # Ok::<(), shebe_platform::PlatformError>(())
//! ```

mod asset;
mod error;
mod platform;
mod version;

pub use asset::{
    ARCHIVE_EXTENSION, AssetName, BINARY_NAME, LinuxSuffix, NamingConvention, VersionStyle,
    asset_name, asset_name_with, binary_file_name, ensure_supported,
};
pub use error::{PlatformError, Result};
pub use platform::{Arch, Libc, Os, Platform, detect_platform, supported_platforms};
pub use version::ReleaseVersion;

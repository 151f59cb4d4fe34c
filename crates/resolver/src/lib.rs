//! Acquisition of the shebe-mcp binary.
//!
//! Given a platform, this crate finds the matching release asset, downloads
//! and verifies it, unpacks it into a versioned cache directory and hands
//! back a [`LaunchCommand`] for the MCP server.
//!
//! ```no_run
//! use shebe_resolver::{Acquirer, ResolverConfig};
//!
//! # async fn run() -> shebe_resolver::Result<()> {
//! let acquirer = Acquirer::new(ResolverConfig::from_env()?)?;
//! let acquired = acquirer.acquire().await?;
//! let launch = acquired.launch_command();
//! println!("{}", launch.command.display());
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline is described in [`acquire`]; the cache layout in [`cache`].

pub mod acquire;
pub mod cache;
pub mod config;
pub mod conformance;
pub mod download;
mod error;
pub mod extract;
pub mod launch;
pub mod probe;
pub mod release;

#[cfg(test)]
mod testing;

pub use acquire::{AcquisitionState, Acquired, Acquirer};
pub use cache::{BinaryCache, CachedBinary};
pub use config::{ResolverConfig, RetryPolicy, VersionRequest};
pub use conformance::{ConformanceReport, audit, select_convention};
pub use error::{Error, Result};
pub use launch::LaunchCommand;
pub use probe::{McpProbe, ServerInfo, query_version, verify_version};
pub use release::{GithubReleaseStore, Release, ReleaseAsset, ReleaseStore};

pub use shebe_platform::{
    AssetName, NamingConvention, Platform, ReleaseVersion, asset_name, detect_platform,
};

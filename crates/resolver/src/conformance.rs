//! Checks that a release follows the naming scheme the resolver expects.
//!
//! Release assets are named by a separate pipeline. When the two drift apart
//! the resolver should say so precisely instead of reporting a bare 404.

use serde::Serialize;
use shebe_platform::{
    Arch, AssetName, NamingConvention, Os, Platform, asset_name_with, supported_platforms,
};
use tracing::{debug, warn};

use crate::release::{Release, ReleaseAsset};
use crate::{Error, Result};

/// The convention and asset chosen for a platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection<'a> {
    /// Convention the release follows.
    pub convention: NamingConvention,
    /// The matching asset.
    pub asset: &'a ReleaseAsset,
}

/// Pick the naming convention a release follows for `platform`.
///
/// The default convention wins whenever its asset is present. Otherwise a
/// single matching alternative is adopted with a warning; zero or several
/// matches fail with [`Error::ReleaseNotFound`] naming the expected asset.
pub fn select_convention<'a>(release: &'a Release, platform: &Platform) -> Result<Selection<'a>> {
    let version = release.version()?;
    let expected = asset_name_with(&NamingConvention::DEFAULT, &version, platform)?;

    if let Some(asset) = release.asset(expected.as_str()) {
        debug!(asset = %expected, "Release follows the default naming convention");
        return Ok(Selection {
            convention: NamingConvention::DEFAULT,
            asset,
        });
    }

    let matches: Vec<Selection<'a>> = NamingConvention::candidates()
        .into_iter()
        .skip(1)
        .filter_map(|convention| {
            let name = asset_name_with(&convention, &version, platform).ok()?;
            release
                .asset(name.as_str())
                .map(|asset| Selection { convention, asset })
        })
        .collect();

    match matches.as_slice() {
        [only] => {
            warn!(
                expected = %expected,
                found = %only.asset.name,
                convention = %only.convention,
                "Release assets do not follow the default naming convention; adopting the one that matches"
            );
            Ok(only.clone())
        }
        [] => Err(not_found(release, &expected)),
        several => {
            warn!(
                expected = %expected,
                candidates = ?several.iter().map(|s| s.asset.name.as_str()).collect::<Vec<_>>(),
                "Several naming conventions match; refusing to guess"
            );
            Err(not_found(release, &expected))
        }
    }
}

fn not_found(release: &Release, expected: &AssetName) -> Error {
    Error::ReleaseNotFound {
        requested: release.tag_name.clone(),
        asset: expected.to_string(),
        status: None,
        available: release.asset_names(),
    }
}

/// Result of auditing a release against the default convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConformanceReport {
    /// The release tag.
    pub tag: String,
    /// Whether the tag is a valid release version.
    pub tag_is_valid: bool,
    /// Expected assets that are present.
    pub present: Vec<String>,
    /// Expected assets that are missing.
    pub missing: Vec<String>,
    /// Assets for platforms that are documented as unsupported.
    pub unexpected: Vec<String>,
}

impl ConformanceReport {
    /// Whether the release matches the expected layout exactly.
    #[must_use]
    pub fn is_conformant(&self) -> bool {
        self.tag_is_valid && self.missing.is_empty() && self.unexpected.is_empty()
    }
}

/// Audit a release: every supported platform should have its asset under the
/// default convention, and no asset should target Windows or Linux on ARM.
#[must_use]
pub fn audit(release: &Release) -> ConformanceReport {
    let mut report = ConformanceReport {
        tag: release.tag_name.clone(),
        tag_is_valid: false,
        present: Vec::new(),
        missing: Vec::new(),
        unexpected: release
            .assets
            .iter()
            .filter(|a| targets_unsupported_platform(&a.name))
            .map(|a| a.name.clone())
            .collect(),
    };

    let Ok(version) = release.version() else {
        return report;
    };
    report.tag_is_valid = true;

    for platform in supported_platforms() {
        // Supported platforms always map under the default convention.
        let Ok(name) = asset_name_with(&NamingConvention::DEFAULT, &version, &platform) else {
            continue;
        };
        if release.asset(name.as_str()).is_some() {
            report.present.push(name.to_string());
        } else {
            report.missing.push(name.to_string());
        }
    }
    report
}

fn targets_unsupported_platform(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    let windows = lower.contains("windows") || lower.contains("win64") || lower.ends_with(".exe");
    let linux_arm = lower.contains(Os::Linux.as_str())
        && (lower.contains(Arch::Arm64.asset_str()) || lower.contains("arm64"));
    windows || linux_arm
}

//! Release version tokens.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::PlatformError;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"^v\d+\.\d+\.\d+$").expect("version pattern is valid")
});

/// A release tag of the form `v<MAJOR>.<MINOR>.<PATCH>`.
///
/// Treated as an opaque token: there is deliberately no ordering. Choosing
/// which release is newest is the release store's job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseVersion(String);

impl ReleaseVersion {
    /// Validate and wrap a release tag.
    pub fn parse(tag: &str) -> crate::Result<Self> {
        if VERSION_RE.is_match(tag) {
            Ok(Self(tag.to_string()))
        } else {
            Err(PlatformError::InvalidVersion(tag.to_string()))
        }
    }

    /// The tag exactly as published, including the leading `v`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag without its leading `v` (e.g. `0.5.3`).
    #[must_use]
    pub fn without_prefix(&self) -> &str {
        &self.0[1..]
    }
}

impl FromStr for ReleaseVersion {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ReleaseVersion {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ReleaseVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

//! Version catalog: the set of Kubernetes versions offered to clusters.

use std::path::Path;

use chrono::{DateTime, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::version;

/// Support channel of a catalog version.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    #[default]
    Supported,
    Deprecated,
    Preview,
}

/// A single version offered by the catalog.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub version: String,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    #[cfg(test)]
    pub fn supported(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            classification: Classification::Supported,
            expiration_date: None,
        }
    }

    /// A version qualifies as an automatic upgrade target when it is
    /// generally supported and has not expired.
    fn qualifies(&self, now: DateTime<Utc>) -> bool {
        self.classification == Classification::Supported
            && self.expiration_date.is_none_or(|expiry| expiry > now)
    }
}

/// Read-only catalog of available Kubernetes versions.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct VersionCatalog {
    #[serde(default)]
    pub versions: Vec<CatalogEntry>,
}

impl VersionCatalog {
    #[cfg(test)]
    pub const fn new(versions: Vec<CatalogEntry>) -> Self {
        Self { versions }
    }

    /// Load a catalog from a YAML document.
    ///
    /// ```yaml
    /// versions:
    ///   - version: 1.25.4
    ///   - version: 1.24.8
    ///     classification: deprecated
    ///     expirationDate: "2026-01-31T23:59:59Z"
    /// ```
    pub fn from_yaml(content: &str) -> Result<Self> {
        let catalog: Self = serde_yaml::from_str(content)
            .map_err(|e| UpgradeError::InvalidCatalog(e.to_string()))?;

        for entry in &catalog.versions {
            version::parse(&entry.version).map_err(|_| {
                UpgradeError::InvalidCatalog(format!("invalid version {:?}", entry.version))
            })?;
        }

        debug!("Loaded version catalog with {} entries", catalog.versions.len());
        Ok(catalog)
    }

    /// Load a catalog from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpgradeError::InvalidCatalog(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }

    /// Find the latest qualifying version of the next consecutive minor release.
    ///
    /// Returns `Ok(None)` when the catalog offers no such version.
    pub fn next_minor_version(&self, current: &str) -> Result<Option<String>> {
        self.next_minor_version_at(current, Utc::now())
    }

    /// Same as [`Self::next_minor_version`] with an explicit clock.
    pub fn next_minor_version_at(
        &self,
        current: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let current = version::parse(current)?;
        let mut latest: Option<(Version, &str)> = None;

        for entry in &self.versions {
            let candidate = version::parse(&entry.version)?;
            if !version::is_consecutive_minor(&current, &candidate) || !entry.qualifies(now) {
                continue;
            }
            if latest.as_ref().is_none_or(|(best, _)| candidate > *best) {
                latest = Some((candidate, entry.version.as_str()));
            }
        }

        Ok(latest.map(|(_, raw)| raw.to_string()))
    }
}

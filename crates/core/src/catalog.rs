//! Data catalogs and their per-kind identifier policies.
//!
//! A catalog record always lives in exactly one data catalog, and most of
//! the engine's behavioural differences (who mints the preferred
//! identifier, how uniqueness is scoped, whether updates fork versions)
//! are decided by the catalog's kind. The kind is derived once from the
//! catalog's capability flags plus the configured legacy list, and every
//! policy difference is dispatched through the static [`PidPolicy`] table
//! rather than through subtyping.

use crate::config::CoreConfig;
use crate::error::{CatalogError, CatalogResult};
use serde::{Deserialize, Serialize};

/// A data catalog: a named collection of catalog records with capability
/// flags.
///
/// `dataset_versioning` and `harvested` are mutually exclusive: a harvester
/// mirrors an external source verbatim and never forks versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataCatalog {
    /// Globally unique catalog identifier
    pub identifier: String,
    /// Display title, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Whether metadata updates fork new dataset versions
    #[serde(default)]
    pub dataset_versioning: bool,
    /// Whether records are mirrored in by a harvester
    #[serde(default)]
    pub harvested: bool,
    /// Whether the catalog may mint DOIs (persistent archival identifiers)
    #[serde(default)]
    pub doi_enabled: bool,
}

impl DataCatalog {
    /// Validates the capability flags.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `dataset_versioning` and `harvested`
    /// are both set.
    pub fn validate(&self) -> CatalogResult<()> {
        if self.dataset_versioning && self.harvested {
            return Err(CatalogError::validation(
                "data_catalog",
                "dataset_versioning and harvested are mutually exclusive",
            ));
        }
        Ok(())
    }

    /// Classifies this catalog. Legacy membership comes from configuration
    /// and takes precedence over the stored flags.
    pub fn kind(&self, config: &CoreConfig) -> CatalogKind {
        if config.is_legacy_catalog(&self.identifier) {
            CatalogKind::Legacy
        } else if self.dataset_versioning {
            CatalogKind::Versioning
        } else if self.harvested {
            CatalogKind::Harvested
        } else {
            CatalogKind::Default
        }
    }
}

/// The four behavioural kinds of catalog.
///
/// This enum is deliberately *closed*: every identifier and versioning rule
/// in the engine dispatches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    /// The primary versioning catalog: server-minted PIDs, metadata updates
    /// fork new versions, PID collisions inside the catalog are other
    /// versions of the same dataset.
    Versioning,
    /// Records mirrored from an external source; the harvester supplies
    /// the PID.
    Harvested,
    /// Externally managed catalog: PIDs are supplied, never generated, and
    /// uniqueness is not enforced. Deletes are hard deletes.
    Legacy,
    /// An ordinary non-versioning catalog with server-minted PIDs.
    Default,
}

/// Per-kind preferred-identifier policy.
pub struct PidPolicy {
    /// The server mints the PID at publication
    pub server_generates_pid: bool,
    /// The caller must supply a PID (harvester or external registry)
    pub requires_supplied_pid: bool,
    /// Preferred-identifier uniqueness is enforced at all
    pub enforce_uniqueness: bool,
    /// Collisions inside this same catalog are tolerated (other versions)
    pub same_catalog_collisions_allowed: bool,
}

const VERSIONING_POLICY: PidPolicy = PidPolicy {
    server_generates_pid: true,
    requires_supplied_pid: false,
    enforce_uniqueness: true,
    same_catalog_collisions_allowed: true,
};

const HARVESTED_POLICY: PidPolicy = PidPolicy {
    server_generates_pid: false,
    requires_supplied_pid: true,
    enforce_uniqueness: true,
    same_catalog_collisions_allowed: false,
};

const LEGACY_POLICY: PidPolicy = PidPolicy {
    server_generates_pid: false,
    requires_supplied_pid: true,
    enforce_uniqueness: false,
    same_catalog_collisions_allowed: true,
};

const DEFAULT_POLICY: PidPolicy = PidPolicy {
    server_generates_pid: true,
    requires_supplied_pid: false,
    enforce_uniqueness: true,
    same_catalog_collisions_allowed: false,
};

impl CatalogKind {
    /// The identifier policy for this kind of catalog.
    pub const fn pid_policy(self) -> &'static PidPolicy {
        match self {
            Self::Versioning => &VERSIONING_POLICY,
            Self::Harvested => &HARVESTED_POLICY,
            Self::Legacy => &LEGACY_POLICY,
            Self::Default => &DEFAULT_POLICY,
        }
    }

    /// Returns a human-readable name for this catalog kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Versioning => "versioning catalog",
            Self::Harvested => "harvested catalog",
            Self::Legacy => "legacy catalog",
            Self::Default => "catalog",
        }
    }
}

//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into
//! services explicitly. Nothing in the engine reads ambient state during
//! request handling; the acting catalog's capabilities, the PID namespaces
//! and the legacy-catalog list always arrive as arguments.

use crate::error::{CatalogError, CatalogResult};
use rdc_pid::{PidMinter, UuidSource};
use rdc_types::NonEmptyText;

/// Core configuration resolved at startup.
///
/// Legacy-catalog membership is deliberately configuration rather than a
/// catalog flag: which catalogs are "legacy" is an operational decision
/// made outside the data model.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    urn_namespace: NonEmptyText,
    doi_prefix: NonEmptyText,
    legacy_catalogs: Vec<String>,
}

#[derive(serde::Deserialize)]
struct ConfigDoc {
    urn_namespace: String,
    doi_prefix: String,
    #[serde(default)]
    legacy_catalogs: Vec<String>,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the URN namespace or DOI prefix is
    /// empty.
    pub fn new(
        urn_namespace: impl AsRef<str>,
        doi_prefix: impl AsRef<str>,
        legacy_catalogs: Vec<String>,
    ) -> CatalogResult<Self> {
        let urn_namespace = NonEmptyText::new(urn_namespace)
            .map_err(|_| CatalogError::validation("urn_namespace", "cannot be empty"))?;
        let doi_prefix = NonEmptyText::new(doi_prefix)
            .map_err(|_| CatalogError::validation("doi_prefix", "cannot be empty"))?;

        Ok(Self {
            urn_namespace,
            doi_prefix,
            legacy_catalogs,
        })
    }

    /// Parse configuration from a YAML document.
    ///
    /// ```yaml
    /// urn_namespace: fi
    /// doi_prefix: "23729"
    /// legacy_catalogs:
    ///   - urn:nbn:fi:att:data-catalog-legacy
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a validation error if the document cannot be parsed or the
    /// parsed values fail [`CoreConfig::new`]'s checks.
    pub fn from_yaml_str(input: &str) -> CatalogResult<Self> {
        let doc: ConfigDoc = serde_yaml::from_str(input)
            .map_err(|e| CatalogError::validation("config", e.to_string()))?;
        Self::new(doc.urn_namespace, doc.doi_prefix, doc.legacy_catalogs)
    }

    pub fn urn_namespace(&self) -> &str {
        self.urn_namespace.as_str()
    }

    pub fn doi_prefix(&self) -> &str {
        self.doi_prefix.as_str()
    }

    /// True if the catalog identifier is in the configured legacy list.
    pub fn is_legacy_catalog(&self, catalog_identifier: &str) -> bool {
        self.legacy_catalogs
            .iter()
            .any(|c| c == catalog_identifier)
    }

    /// Build a [`PidMinter`] over this configuration's namespaces.
    ///
    /// # Errors
    ///
    /// Propagates minter construction failures (empty namespace/prefix
    /// cannot occur here because construction already validated them).
    pub fn minter(&self) -> CatalogResult<PidMinter> {
        Ok(PidMinter::new(
            self.urn_namespace.as_str(),
            self.doi_prefix.as_str(),
        )?)
    }

    /// Build a [`PidMinter`] with an injected UUID source, for tests.
    ///
    /// # Errors
    ///
    /// Same as [`CoreConfig::minter`].
    pub fn minter_with_source(&self, source: Box<dyn UuidSource>) -> CatalogResult<PidMinter> {
        Ok(PidMinter::with_source(
            self.urn_namespace.as_str(),
            self.doi_prefix.as_str(),
            source,
        )?)
    }
}

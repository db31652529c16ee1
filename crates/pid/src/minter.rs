//! Internal implementation of identifier minting.

use crate::{PidError, PidResult};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// The catalog's canonical UUID representation (32 lowercase hex characters,
/// no hyphens).
///
/// This wrapper guarantees that once constructed, the contained UUID is in
/// canonical form. Use it whenever a record identifier crosses the core's
/// boundary: externally supplied identifiers go through [`CanonicalUuid::parse`],
/// freshly allocated ones through [`PidMinter::record_identifier`].
///
/// # Display format
/// Always the canonical 32-character lowercase hex form without hyphens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CanonicalUuid(Uuid);

impl CanonicalUuid {
    /// Wraps a raw UUID; the canonical form is derived on display.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Validates and parses a UUID string that must already be in canonical
    /// form.
    ///
    /// This does **not** normalise other common UUID forms (hyphenated,
    /// uppercase). Callers must provide the canonical representation.
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> PidResult<Self> {
        if Self::is_canonical(input) {
            // is_canonical guarantees valid hex, so parse_str succeeds.
            let uuid = Uuid::parse_str(input)
                .map_err(|e| PidError::InvalidInput(format!("unparseable UUID: {e}")))?;
            return Ok(Self(uuid));
        }
        Err(PidError::InvalidInput(format!(
            "identifier must be 32 lowercase hex characters without hyphens, got: '{}'",
            input
        )))
    }

    /// Returns true if `input` is in canonical UUID form.
    ///
    /// Purely syntactic: exactly 32 bytes, lowercase hex only.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }

    /// Returns the underlying `uuid::Uuid`.
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for CanonicalUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for CanonicalUuid {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for CanonicalUuid {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        CanonicalUuid::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Which kind of preferred identifier to mint for a publishing dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PidType {
    /// A URN in the catalog's namespace. The default.
    Urn,
    /// A DOI under the catalog's registered prefix. Only available in
    /// catalogs flagged for persistent archival identifiers.
    Doi,
}

impl FromStr for PidType {
    type Err = PidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "urn" => Ok(Self::Urn),
            "doi" => Ok(Self::Doi),
            other => Err(PidError::UnknownPidType(other.to_owned())),
        }
    }
}

/// Source of raw UUIDs for the minter.
///
/// Production code uses [`RandomUuidSource`]. Tests inject
/// [`SequenceUuidSource`] so minted identifiers are deterministic.
pub trait UuidSource: Send + Sync {
    /// Produces the next raw UUID.
    fn next_uuid(&self) -> Uuid;
}

/// Cryptographically random RFC 4122 v4 UUIDs.
#[derive(Debug, Default)]
pub struct RandomUuidSource;

impl UuidSource for RandomUuidSource {
    fn next_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// Deterministic UUID sequence for tests: 1, 2, 3, ... encoded into the
/// low 64 bits of the UUID.
#[derive(Debug, Default)]
pub struct SequenceUuidSource {
    counter: AtomicU64,
}

impl UuidSource for SequenceUuidSource {
    fn next_uuid(&self) -> Uuid {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Uuid::from_u64_pair(0, n)
    }
}

/// Mints every server-generated identifier in the catalog.
///
/// Holds the URN namespace and DOI prefix resolved from configuration at
/// startup, plus the [`UuidSource`] all raw UUIDs are drawn from.
pub struct PidMinter {
    urn_namespace: String,
    doi_prefix: String,
    source: Box<dyn UuidSource>,
}

impl fmt::Debug for PidMinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PidMinter")
            .field("urn_namespace", &self.urn_namespace)
            .field("doi_prefix", &self.doi_prefix)
            .finish_non_exhaustive()
    }
}

impl PidMinter {
    /// Creates a minter with a random UUID source.
    ///
    /// # Arguments
    ///
    /// * `urn_namespace` - namespace embedded in minted URNs, e.g. `fi`
    /// * `doi_prefix` - registrant prefix for DOIs, e.g. `23729`
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidInput`] if either value is empty.
    pub fn new(urn_namespace: impl Into<String>, doi_prefix: impl Into<String>) -> PidResult<Self> {
        Self::with_source(urn_namespace, doi_prefix, Box::new(RandomUuidSource))
    }

    /// Creates a minter drawing UUIDs from the given source.
    ///
    /// # Errors
    ///
    /// Returns [`PidError::InvalidInput`] if namespace or prefix is empty.
    pub fn with_source(
        urn_namespace: impl Into<String>,
        doi_prefix: impl Into<String>,
        source: Box<dyn UuidSource>,
    ) -> PidResult<Self> {
        let urn_namespace = urn_namespace.into().trim().to_owned();
        let doi_prefix = doi_prefix.into().trim().to_owned();
        if urn_namespace.is_empty() {
            return Err(PidError::InvalidInput("URN namespace cannot be empty".into()));
        }
        if doi_prefix.is_empty() {
            return Err(PidError::InvalidInput("DOI prefix cannot be empty".into()));
        }
        Ok(Self {
            urn_namespace,
            doi_prefix,
            source,
        })
    }

    /// Allocates a fresh record identifier.
    pub fn record_identifier(&self) -> CanonicalUuid {
        CanonicalUuid::from_uuid(self.source.next_uuid())
    }

    /// Mints a preferred identifier of the requested type.
    pub fn preferred_identifier(&self, pid_type: PidType) -> String {
        match pid_type {
            PidType::Urn => self.urn(),
            PidType::Doi => self.doi(),
        }
    }

    /// Mints a URN preferred identifier:
    /// `urn:nbn:<namespace>:att:<canonical uuid>`.
    pub fn urn(&self) -> String {
        format!(
            "urn:nbn:{}:att:{}",
            self.urn_namespace,
            CanonicalUuid::from_uuid(self.source.next_uuid())
        )
    }

    /// Mints a DOI preferred identifier: `doi:10.<prefix>/<hyphenated uuid>`.
    pub fn doi(&self) -> String {
        format!("doi:10.{}/{}", self.doi_prefix, self.source.next_uuid())
    }

    /// Mints a metadata version identifier:
    /// `urn:nbn:<namespace>:att:md-<canonical uuid>`.
    ///
    /// Distinct from the preferred identifier; regenerated every time a
    /// dataset's descriptive metadata changes.
    pub fn metadata_version_identifier(&self) -> String {
        format!(
            "urn:nbn:{}:att:md-{}",
            self.urn_namespace,
            CanonicalUuid::from_uuid(self.source.next_uuid())
        )
    }

    /// The placeholder preferred identifier a draft carries until it is
    /// independently published.
    pub fn draft_identifier(record_identifier: &str) -> String {
        format!("draft:{record_identifier}")
    }

    /// True if `identifier` is a draft placeholder.
    pub fn is_draft_identifier(identifier: &str) -> bool {
        identifier.starts_with("draft:")
    }
}

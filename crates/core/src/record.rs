//! Catalog records and the research-dataset document.
//!
//! A catalog record is one revision of one dataset in one catalog. The
//! descriptive metadata lives in the semi-structured [`ResearchDataset`]
//! document; the engine reads and maintains only the fields it owns
//! (`files[]`, `directories[]`, `total_files_byte_size`) and carries the
//! rest opaquely.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Publication state of a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Draft,
    Published,
}

impl RecordState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Published => "published",
        }
    }
}

/// Cumulation state of a dataset.
///
/// An open cumulative dataset (`Yes`) accepts ongoing file additions
/// without forking a new version, but forbids removals while open.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CumulativeState {
    No,
    Yes,
    Closed,
}

impl CumulativeState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Yes => "yes",
            Self::Closed => "closed",
        }
    }
}

/// Preservation workflow has not started.
pub const PRESERVATION_STATE_INITIAL: i32 = 0;

/// Which API revision created a record.
///
/// The two revisions share one entity type; the behaviours that differ are
/// dispatched through the static [`RevisionPolicy`] table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiRevision {
    Rev1,
    Rev2,
}

/// Per-revision behavioural policy.
pub struct RevisionPolicy {
    /// Records may be created as drafts and published later
    pub drafts_enabled: bool,
    /// A new-version fork always gets a fresh preferred identifier,
    /// even for a pure metadata edit
    pub force_new_pid_on_fork: bool,
}

const REV1_POLICY: RevisionPolicy = RevisionPolicy {
    drafts_enabled: false,
    force_new_pid_on_fork: true,
};

const REV2_POLICY: RevisionPolicy = RevisionPolicy {
    drafts_enabled: true,
    force_new_pid_on_fork: false,
};

impl ApiRevision {
    /// The behavioural policy for this revision.
    pub const fn policy(self) -> &'static RevisionPolicy {
        match self {
            Self::Rev1 => &REV1_POLICY,
            Self::Rev2 => &REV2_POLICY,
        }
    }
}

/// Dataset-specific metadata for one bound file, stored inline in the
/// research-dataset document. Uniqueness by `identifier` is mandatory;
/// order is not significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// The file this entry describes
    pub identifier: String,
    /// User-supplied descriptive fields (title, use category, ...)
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Dataset-specific metadata for one directory, stored inline in the
/// research-dataset document. The engine also writes the
/// dataset-restricted `byte_size`/`file_count` rollups into `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// The directory this entry describes
    pub identifier: String,
    /// User-supplied descriptive fields plus derived rollups
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// The semi-structured descriptive document of a dataset.
///
/// Only the fields the engine maintains are typed; everything else the
/// depositor wrote (creators, spatial coverage, ...) rides along in
/// `other` untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResearchDataset {
    /// Dataset title (language-keyed object in practice)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Value>,
    /// Per-file metadata entries, unique by identifier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileEntry>,
    /// Per-directory metadata entries, unique by identifier
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directories: Vec<DirectoryEntry>,
    /// Derived: total byte size of the dataset's bound files
    #[serde(default)]
    pub total_files_byte_size: u64,
    /// Every other descriptive field, carried opaquely
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ResearchDataset {
    /// Looks up the metadata entry for a file identifier.
    pub fn file_entry(&self, identifier: &str) -> Option<&FileEntry> {
        self.files.iter().find(|e| e.identifier == identifier)
    }

    /// Looks up the metadata entry for a directory identifier.
    pub fn directory_entry(&self, identifier: &str) -> Option<&DirectoryEntry> {
        self.directories.iter().find(|e| e.identifier == identifier)
    }

    /// True if the descriptive content differs from `other`, ignoring the
    /// derived total (which changes whenever bindings change).
    pub fn descriptive_differs_from(&self, other: &ResearchDataset) -> bool {
        let mut a = self.clone();
        let mut b = other.clone();
        a.total_files_byte_size = 0;
        b.total_files_byte_size = 0;
        a != b
    }
}

/// One revision of one dataset in one catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    /// Global record identifier (canonical UUID), server-assigned
    pub identifier: String,
    /// The semantic, externally visible PID (URN, DOI, or harvester string);
    /// a `draft:` placeholder until first publication
    pub preferred_identifier: String,
    /// Opaque identifier regenerated on every descriptive-metadata change.
    /// Unique and server-generated, never user-settable.
    pub metadata_version_identifier: String,
    /// Which API revision created this record
    pub api_revision: ApiRevision,
    /// Publication state
    pub state: RecordState,
    /// One-way flag set when a bound file is permanently removed
    #[serde(default)]
    pub deprecated: bool,
    /// Cumulation state
    pub cumulative_state: CumulativeState,
    /// Preservation workflow state (operational, not descriptive)
    #[serde(default)]
    pub preservation_state: i32,
    /// The catalog this record lives in
    pub data_catalog: String,
    /// Preservation contract reference, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// The descriptive document
    pub research_dataset: ResearchDataset,
    /// Identifier of the immediate next version, if one was forked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_version: Option<String>,
    /// Identifier of the immediate previous version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_version: Option<String>,
    /// Membership in the ordered version chain of one logical dataset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_version_set: Option<u64>,
    /// Membership in the cross-catalog duplicate-identifier grouping
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alternate_record_set: Option<u64>,
    /// Soft-delete flag (legacy catalogs hard-delete instead)
    #[serde(default)]
    pub removed: bool,
    pub date_created: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<DateTime<Utc>>,
    /// When cumulation started, for cumulative datasets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_cumulation_started: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    pub fn is_published(&self) -> bool {
        self.state == RecordState::Published
    }

    pub fn has_next_version(&self) -> bool {
        self.next_version.is_some()
    }

    /// The timestamp an optimistic-concurrency precondition compares
    /// against: last modification, falling back to creation.
    pub fn modification_stamp(&self) -> DateTime<Utc> {
        self.date_modified.unwrap_or(self.date_created)
    }
}

/// Input for creating a record.
#[derive(Debug, Clone)]
pub struct NewRecord {
    /// Target catalog identifier
    pub data_catalog: String,
    /// API revision of the caller
    pub api_revision: ApiRevision,
    /// Requested initial state
    pub state: RecordState,
    /// The descriptive document
    pub research_dataset: ResearchDataset,
    /// Caller-supplied PID (harvested/legacy catalogs)
    pub preferred_identifier: Option<String>,
    /// Requested PID type for server-minted identifiers
    pub pid_type: Option<rdc_pid::PidType>,
    /// Requested cumulation state
    pub cumulative_state: CumulativeState,
    /// Preservation contract reference
    pub contract: Option<String>,
}

impl NewRecord {
    /// A draft in the given catalog with an empty document; fields are
    /// adjusted by callers as needed.
    pub fn draft(data_catalog: impl Into<String>) -> Self {
        Self {
            data_catalog: data_catalog.into(),
            api_revision: ApiRevision::Rev2,
            state: RecordState::Draft,
            research_dataset: ResearchDataset::default(),
            preferred_identifier: None,
            pid_type: None,
            cumulative_state: CumulativeState::No,
            contract: None,
        }
    }
}

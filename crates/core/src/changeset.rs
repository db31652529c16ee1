//! Explicit change sets for update operations.
//!
//! Every update computes a [`ChangeSet`] exactly once, up front, from the
//! stored record and the incoming patch. The state machine then dispatches
//! on the change set alone; it never re-probes request state to infer
//! whether a field changed.

use crate::binding::FileDirectives;
use crate::record::{CatalogRecord, CumulativeState, ResearchDataset};

/// An incoming update to a record. Absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    /// Replacement descriptive document
    pub research_dataset: Option<ResearchDataset>,
    /// New preferred identifier (supplied-PID catalogs only)
    pub preferred_identifier: Option<String>,
    /// New cumulation state
    pub cumulative_state: Option<CumulativeState>,
    /// New preservation workflow state (operational field)
    pub preservation_state: Option<i32>,
    /// New preservation contract reference
    pub contract: Option<String>,
    /// File/directory directives to apply as part of this update
    pub file_directives: Option<FileDirectives>,
    /// Suppress new-version forking on a published, versioned dataset
    pub preserve_version: bool,
    /// Partial update: per-entry metadata merges field-by-field instead of
    /// replacing wholly
    pub partial: bool,
}

/// What an update would actually change, with before/after values where
/// they matter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    /// (before, after) when the preferred identifier would change
    pub preferred_identifier: Option<(String, String)>,
    /// The descriptive document content would change
    pub descriptive_changed: bool,
    /// The bound file set would change (directives present)
    pub files_changed: bool,
    /// (before, after) when the cumulation state would change
    pub cumulative_state: Option<(CumulativeState, CumulativeState)>,
    /// (before, after) when the preservation state would change
    pub preservation_state: Option<(i32, i32)>,
}

impl ChangeSet {
    /// Computes the change set of applying `patch` to `record`.
    pub fn compute(record: &CatalogRecord, patch: &RecordPatch) -> Self {
        let preferred_identifier = patch
            .preferred_identifier
            .as_ref()
            .filter(|candidate| **candidate != record.preferred_identifier)
            .map(|candidate| (record.preferred_identifier.clone(), candidate.clone()));

        let descriptive_changed = patch
            .research_dataset
            .as_ref()
            .is_some_and(|doc| record.research_dataset.descriptive_differs_from(doc));

        let files_changed = patch
            .file_directives
            .as_ref()
            .is_some_and(|directives| !directives.is_empty());

        let cumulative_state = patch
            .cumulative_state
            .filter(|to| *to != record.cumulative_state)
            .map(|to| (record.cumulative_state, to));

        let preservation_state = patch
            .preservation_state
            .filter(|to| *to != record.preservation_state)
            .map(|to| (record.preservation_state, to));

        Self {
            preferred_identifier,
            descriptive_changed,
            files_changed,
            cumulative_state,
            preservation_state,
        }
    }

    /// True if the update would change nothing at all.
    pub fn is_empty(&self) -> bool {
        self.preferred_identifier.is_none()
            && !self.descriptive_changed
            && !self.files_changed
            && self.cumulative_state.is_none()
            && self.preservation_state.is_none()
    }

    /// True if the update touches anything beyond operational
    /// (preservation-workflow) fields. Frozen old versions reject exactly
    /// these changes.
    pub fn touches_descriptive_fields(&self) -> bool {
        self.preferred_identifier.is_some()
            || self.descriptive_changed
            || self.files_changed
            || self.cumulative_state.is_some()
    }

    /// True if a new-version fork born from this change must get a fresh
    /// preferred identifier instead of inheriting the parent's.
    pub fn forces_new_preferred_identifier(&self) -> bool {
        self.preferred_identifier.is_some() || self.files_changed
    }
}

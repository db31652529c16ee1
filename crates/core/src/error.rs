//! Error types for the catalog core.
//!
//! Every failure the engine can surface maps onto one of a small set of
//! variants so callers (and the bulk coordinator) can dispatch on kind:
//! user-correctable validation problems, stale-write conflicts, missing
//! resources, unavailable collaborators, and invariant violations that
//! indicate corrupted state rather than a bad request.

use std::fmt;

/// A validation failure anchored to a specific field path.
///
/// The field path uses dotted notation relative to the record document,
/// e.g. `research_dataset.preferred_identifier`, so API consumers can
/// attach the message to the offending input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path of the offending field
    pub field: String,
    /// Human-readable reason
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// User-correctable input problem. Never retried automatically.
    #[error("validation failed: {0}")]
    Validation(FieldError),

    /// Optimistic-concurrency mismatch. Clients should re-fetch and retry.
    #[error("resource was modified since last fetch: {0}")]
    Conflict(String),

    /// One or more referenced resources could not be resolved.
    #[error("{resource} not found: {identifiers:?}")]
    NotFound {
        /// The kind of resource looked up
        resource: &'static str,
        /// Every identifier that failed to resolve
        identifiers: Vec<String>,
    },

    /// An external collaborator (notification bus, registry) is unavailable.
    #[error("dependency unavailable: {0}")]
    Dependency(String),

    /// Corrupted state. Must never be swallowed; aborts whole batches.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Failed to serialize or deserialize a document.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Shorthand for a [`CatalogError::Validation`] with a field path.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldError {
            field: field.into(),
            message: message.into(),
        })
    }

    /// Shorthand for a [`CatalogError::NotFound`] over a single identifier.
    pub fn not_found(resource: &'static str, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            identifiers: vec![identifier.into()],
        }
    }

    /// True for errors the bulk coordinator isolates to a single row.
    ///
    /// `Invariant` is deliberately excluded: corrupted state aborts the
    /// whole batch. `Dependency` is excluded as well; it can only arise
    /// after commit, when the outbox is drained.
    pub fn is_row_scoped(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Conflict(_) | Self::NotFound { .. }
        )
    }
}

impl From<rdc_files::FilesError> for CatalogError {
    fn from(err: rdc_files::FilesError) -> Self {
        use rdc_files::FilesError;
        match err {
            // Tree-shape failures are corrupted state, not user error.
            FilesError::MultipleRoots { .. }
            | FilesError::MissingRoot(_)
            | FilesError::UnknownParent { .. } => CatalogError::Invariant(err.to_string()),
            FilesError::InvalidPath(msg) => CatalogError::validation("file_path", msg),
        }
    }
}

impl From<rdc_pid::PidError> for CatalogError {
    fn from(err: rdc_pid::PidError) -> Self {
        CatalogError::validation("identifier", err.to_string())
    }
}

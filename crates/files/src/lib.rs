//! File and directory metadata for the research dataset catalog.
//!
//! This crate models the physical file tree of a project (the files a
//! storage frontend has reported into the catalog) and keeps the derived
//! per-directory aggregates consistent.
//!
//! ## Design principles
//!
//! - The catalog stores file *metadata* only; no byte streams ever enter
//!   this crate. Fixity is carried as a SHA-256 checksum computed by the
//!   storage frontend (or by [`Checksum::sha256_of`] in tooling).
//! - Files and directories are scoped to a project. A file path is unique
//!   within the unremoved files of its project, a directory path within the
//!   unremoved directories.
//! - A directory's `byte_size` and `file_count` are *derived, cached*
//!   aggregates: always recomputed by [`tree`], never hand-edited.
//! - Removal is a soft delete. Removed files drop out of every aggregate
//!   but remain queryable by privileged callers.
//!
//! ## Aggregation model
//!
//! [`tree::recompute_project_tree`] rolls the whole project up bottom-up and
//! returns one batched list of per-directory totals, so the caller can
//! commit them in a single statement. [`tree::recompute_for_dataset`] is the
//! same computation restricted to one dataset's selected files.

mod model;
pub mod tree;

pub use model::{Checksum, DirectoryTotals, StoredDirectory, StoredFile};

/// Errors that can occur during file-tree operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Path validation failed
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A project's directory tree has no root at all
    #[error("Project {0} has no root directory")]
    MissingRoot(String),

    /// A project's directory tree has more than one parentless directory.
    /// This is corrupted state, not user error.
    #[error("Project {project} has multiple root directories: {roots:?}")]
    MultipleRoots {
        /// The project whose tree is corrupted
        project: String,
        /// Identifiers of every parentless directory found
        roots: Vec<String>,
    },

    /// A directory references a parent that does not exist in the project
    #[error("Directory {directory} references unknown parent {parent}")]
    UnknownParent {
        /// The directory carrying the dangling reference
        directory: String,
        /// The referenced parent identifier
        parent: String,
    },
}

impl From<rdc_types::TextError> for FilesError {
    fn from(err: rdc_types::TextError) -> Self {
        FilesError::InvalidPath(err.to_string())
    }
}

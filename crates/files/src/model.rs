//! Entities of the physical file tree.
//!
//! A storage frontend reports files and directories into the catalog; the
//! catalog never sees the bytes themselves. `StoredFile` and
//! `StoredDirectory` are the relational rows of that report, `Checksum`
//! carries the fixity metadata the frontend computed.

use chrono::{DateTime, Utc};
use rdc_types::{DirectoryPath, FilePath, NonEmptyText};
use sha2::{Digest, Sha256};

/// Fixity metadata for a stored file.
///
/// The catalog treats the value as opaque; it is recorded when the file is
/// reported and preserved unchanged through every binding operation.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Checksum {
    /// Hashing algorithm, `sha256` for everything this crate computes
    pub algorithm: NonEmptyText,
    /// Hexadecimal digest of the file content
    pub value: String,
}

impl Checksum {
    /// Computes a SHA-256 checksum over the given bytes.
    ///
    /// Intended for ingest tooling and tests; production checksums normally
    /// arrive pre-computed from the storage frontend.
    pub fn sha256_of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        let digest = hasher.finalize();
        Self {
            // "sha256" is a non-empty literal.
            algorithm: NonEmptyText::new("sha256").expect("literal is non-empty"),
            value: hex::encode(digest),
        }
    }
}

/// A file reported into the catalog by a storage frontend.
///
/// `parent_directory` is a weak back-reference (the directory does not own
/// the file); `removed` is a soft-delete flag: removed files stay on the
/// row store for privileged callers but drop out of every aggregate and
/// uniqueness scope.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredFile {
    /// Globally unique file identifier, assigned by the storage frontend
    pub identifier: String,
    /// The project this file belongs to
    pub project_identifier: String,
    /// Absolute path, unique within the unremoved files of the project
    pub file_path: FilePath,
    /// Identifier of the containing directory
    pub parent_directory: Option<String>,
    /// Size of the file content in bytes
    pub byte_size: u64,
    /// Fixity metadata, if the frontend supplied any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
    /// Soft-delete flag
    #[serde(default)]
    pub removed: bool,
    /// When the file was removed, if it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_removed: Option<DateTime<Utc>>,
}

impl StoredFile {
    /// Convenience constructor for an unremoved file without fixity data.
    pub fn new(
        identifier: impl Into<String>,
        project_identifier: impl Into<String>,
        file_path: FilePath,
        parent_directory: Option<String>,
        byte_size: u64,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            project_identifier: project_identifier.into(),
            file_path,
            parent_directory,
            byte_size,
            checksum: None,
            removed: false,
            date_removed: None,
        }
    }
}

/// A directory in a project's file tree.
///
/// `parent_directory` forms a self-referential tree; `None` marks the
/// project root, of which there must be exactly one. `byte_size` and
/// `file_count` are derived caches maintained by [`crate::tree`], never
/// hand-edited.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoredDirectory {
    /// Globally unique directory identifier
    pub identifier: String,
    /// The project this directory belongs to
    pub project_identifier: String,
    /// Absolute path, unique within the unremoved directories of the project
    pub directory_path: DirectoryPath,
    /// Parent directory identifier; `None` for the project root
    pub parent_directory: Option<String>,
    /// Cached total of contained file sizes, recursive
    #[serde(default)]
    pub byte_size: u64,
    /// Cached total of contained files, recursive
    #[serde(default)]
    pub file_count: u64,
}

impl StoredDirectory {
    /// Convenience constructor with zeroed aggregates.
    pub fn new(
        identifier: impl Into<String>,
        project_identifier: impl Into<String>,
        directory_path: DirectoryPath,
        parent_directory: Option<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            project_identifier: project_identifier.into(),
            directory_path,
            parent_directory,
            byte_size: 0,
            file_count: 0,
        }
    }
}

/// One row of a batched aggregate update: the recomputed totals for a
/// single directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryTotals {
    /// The directory these totals belong to
    pub directory_identifier: String,
    /// Recomputed recursive byte size
    pub byte_size: u64,
    /// Recomputed recursive file count
    pub file_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_of_known_vector() {
        let checksum = Checksum::sha256_of(b"abc");
        assert_eq!(checksum.algorithm.as_str(), "sha256");
        assert_eq!(
            checksum.value,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn stored_file_serialises_without_empty_options() {
        let file = StoredFile::new(
            "file-1",
            "project-a",
            FilePath::new("/data/a.csv").unwrap(),
            Some("dir-1".into()),
            100,
        );
        let json = serde_json::to_value(&file).unwrap();
        assert!(json.get("checksum").is_none());
        assert!(json.get("date_removed").is_none());
        assert_eq!(json["file_path"], "/data/a.csv");
    }

    #[test]
    fn stored_directory_round_trips() {
        let dir = StoredDirectory::new(
            "dir-1",
            "project-a",
            DirectoryPath::new("/data").unwrap(),
            Some("dir-root".into()),
        );
        let json = serde_json::to_string(&dir).unwrap();
        let back: StoredDirectory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dir);
    }
}

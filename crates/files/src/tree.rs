//! Bottom-up aggregate rollups over a project's directory tree.
//!
//! Both entry points walk the tree in post-order (leaves before parents), so
//! a parent's totals are the sum of already-computed child totals plus its
//! direct files, and each node is visited exactly once. The result is a single
//! batched list of [`DirectoryTotals`] that the caller commits in one
//! statement, keeping the window for lost-update races between concurrent
//! recomputations as small as possible.

use crate::{DirectoryTotals, FilesError, StoredDirectory, StoredFile};
use std::collections::{BTreeMap, BTreeSet};

/// Recomputes `byte_size` and `file_count` for every directory of a project.
///
/// `directories` and `files` are the full unfiltered rows of one project;
/// removed files are skipped here. Totals are returned children-first, so a
/// store applying them in order never writes a parent before its children.
///
/// # Errors
///
/// - [`FilesError::MultipleRoots`] if more than one parentless directory
///   exists: corrupted state, not user error.
/// - [`FilesError::MissingRoot`] if directories exist but none is the root.
/// - [`FilesError::UnknownParent`] if a directory references a parent that
///   is not part of the project.
pub fn recompute_project_tree(
    directories: &[StoredDirectory],
    files: &[StoredFile],
) -> Result<Vec<DirectoryTotals>, FilesError> {
    recompute(directories, files, None)
}

/// Recomputes per-directory totals restricted to one dataset's selection.
///
/// Same traversal as [`recompute_project_tree`], but only files whose
/// identifier appears in `selected` contribute. Directories that contain no
/// selected file (directly or transitively) are omitted from the result:
/// the returned rows cover exactly the chain from each selected file's
/// directory up to the project root.
///
/// # Errors
///
/// Same invariant failures as [`recompute_project_tree`].
pub fn recompute_for_dataset(
    directories: &[StoredDirectory],
    files: &[StoredFile],
    selected: &BTreeSet<String>,
) -> Result<Vec<DirectoryTotals>, FilesError> {
    let totals = recompute(directories, files, Some(selected))?;
    Ok(totals.into_iter().filter(|t| t.file_count > 0).collect())
}

/// Sums the byte sizes of a dataset's selected, unremoved files.
pub fn dataset_total_byte_size(files: &[StoredFile], selected: &BTreeSet<String>) -> u64 {
    files
        .iter()
        .filter(|f| !f.removed && selected.contains(&f.identifier))
        .map(|f| f.byte_size)
        .sum()
}

fn recompute(
    directories: &[StoredDirectory],
    files: &[StoredFile],
    selected: Option<&BTreeSet<String>>,
) -> Result<Vec<DirectoryTotals>, FilesError> {
    if directories.is_empty() {
        return Ok(Vec::new());
    }

    let project = directories[0].project_identifier.clone();

    let by_id: BTreeMap<&str, &StoredDirectory> = directories
        .iter()
        .map(|d| (d.identifier.as_str(), d))
        .collect();

    let mut children: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut roots: Vec<&str> = Vec::new();
    for dir in directories {
        match dir.parent_directory.as_deref() {
            None => roots.push(dir.identifier.as_str()),
            Some(parent) => {
                if !by_id.contains_key(parent) {
                    return Err(FilesError::UnknownParent {
                        directory: dir.identifier.clone(),
                        parent: parent.to_owned(),
                    });
                }
                children.entry(parent).or_default().push(dir.identifier.as_str());
            }
        }
    }

    let root = match roots.as_slice() {
        [single] => *single,
        [] => return Err(FilesError::MissingRoot(project)),
        _ => {
            return Err(FilesError::MultipleRoots {
                project,
                roots: roots.iter().map(|r| (*r).to_owned()).collect(),
            })
        }
    };

    // Direct (non-recursive) file totals per directory.
    let mut direct: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for file in files {
        if file.removed {
            continue;
        }
        if let Some(selection) = selected {
            if !selection.contains(&file.identifier) {
                continue;
            }
        }
        let Some(parent) = file.parent_directory.as_deref() else {
            tracing::warn!(
                file = %file.identifier,
                "file has no parent directory reference, skipping from rollup"
            );
            continue;
        };
        if !by_id.contains_key(parent) {
            tracing::warn!(
                file = %file.identifier,
                parent = %parent,
                "file references a directory outside the project, skipping from rollup"
            );
            continue;
        }
        let entry = direct.entry(parent).or_insert((0, 0));
        entry.0 += file.byte_size;
        entry.1 += 1;
    }

    // Iterative post-order: children are pushed after their parent and thus
    // processed first; parents then sum the already-finished child totals.
    let mut totals: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    let mut order: Vec<&str> = Vec::with_capacity(directories.len());
    let mut stack: Vec<&str> = vec![root];
    while let Some(id) = stack.pop() {
        order.push(id);
        if let Some(kids) = children.get(id) {
            stack.extend(kids.iter().copied());
        }
    }

    if order.len() != directories.len() {
        tracing::warn!(
            project = %project,
            reachable = order.len(),
            total = directories.len(),
            "directory tree contains nodes unreachable from the root"
        );
    }

    let mut result: Vec<DirectoryTotals> = Vec::with_capacity(order.len());
    for id in order.iter().rev() {
        let (mut bytes, mut count) = direct.get(id).copied().unwrap_or((0, 0));
        if let Some(kids) = children.get(id) {
            for kid in kids {
                let (kb, kc) = totals.get(kid).copied().unwrap_or((0, 0));
                bytes += kb;
                count += kc;
            }
        }
        totals.insert(id, (bytes, count));
        result.push(DirectoryTotals {
            directory_identifier: (*id).to_owned(),
            byte_size: bytes,
            file_count: count,
        });
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdc_types::{DirectoryPath, FilePath};

    fn dir(id: &str, path: &str, parent: Option<&str>) -> StoredDirectory {
        StoredDirectory::new(
            id,
            "project-a",
            DirectoryPath::new(path).unwrap(),
            parent.map(str::to_owned),
        )
    }

    fn file(id: &str, path: &str, parent: &str, bytes: u64) -> StoredFile {
        StoredFile::new(
            id,
            "project-a",
            FilePath::new(path).unwrap(),
            Some(parent.to_owned()),
            bytes,
        )
    }

    fn fixture() -> (Vec<StoredDirectory>, Vec<StoredFile>) {
        let directories = vec![
            dir("d-root", "/", None),
            dir("d-data", "/data", Some("d-root")),
            dir("d-raw", "/data/raw", Some("d-data")),
            dir("d-docs", "/docs", Some("d-root")),
        ];
        let files = vec![
            file("f-1", "/data/a.csv", "d-data", 100),
            file("f-2", "/data/raw/b.csv", "d-raw", 200),
            file("f-3", "/data/raw/c.csv", "d-raw", 300),
            file("f-4", "/docs/readme.md", "d-docs", 10),
        ];
        (directories, files)
    }

    fn total_of<'a>(totals: &'a [DirectoryTotals], id: &str) -> &'a DirectoryTotals {
        totals
            .iter()
            .find(|t| t.directory_identifier == id)
            .unwrap()
    }

    #[test]
    fn project_rollup_sums_bottom_up() {
        let (dirs, files) = fixture();
        let totals = recompute_project_tree(&dirs, &files).unwrap();

        assert_eq!(total_of(&totals, "d-raw").byte_size, 500);
        assert_eq!(total_of(&totals, "d-raw").file_count, 2);
        assert_eq!(total_of(&totals, "d-data").byte_size, 600);
        assert_eq!(total_of(&totals, "d-data").file_count, 3);
        assert_eq!(total_of(&totals, "d-docs").byte_size, 10);
        assert_eq!(total_of(&totals, "d-root").byte_size, 610);
        assert_eq!(total_of(&totals, "d-root").file_count, 4);
    }

    #[test]
    fn parent_total_equals_children_plus_direct_files() {
        let (dirs, files) = fixture();
        let totals = recompute_project_tree(&dirs, &files).unwrap();

        let raw = total_of(&totals, "d-raw");
        let data = total_of(&totals, "d-data");
        // /data has one direct file of 100 bytes plus /data/raw.
        assert_eq!(data.byte_size, raw.byte_size + 100);
        assert_eq!(data.file_count, raw.file_count + 1);
    }

    #[test]
    fn children_precede_parents_in_batch_order() {
        let (dirs, files) = fixture();
        let totals = recompute_project_tree(&dirs, &files).unwrap();

        let position = |id: &str| {
            totals
                .iter()
                .position(|t| t.directory_identifier == id)
                .unwrap()
        };
        assert!(position("d-raw") < position("d-data"));
        assert!(position("d-data") < position("d-root"));
        assert!(position("d-docs") < position("d-root"));
    }

    #[test]
    fn removed_files_do_not_count() {
        let (dirs, mut files) = fixture();
        files[1].removed = true; // f-2, 200 bytes under /data/raw
        let totals = recompute_project_tree(&dirs, &files).unwrap();

        assert_eq!(total_of(&totals, "d-raw").byte_size, 300);
        assert_eq!(total_of(&totals, "d-raw").file_count, 1);
        assert_eq!(total_of(&totals, "d-root").byte_size, 410);
    }

    #[test]
    fn multiple_roots_is_fatal() {
        let (mut dirs, files) = fixture();
        dirs.push(dir("d-stray", "/stray", None));
        let err = recompute_project_tree(&dirs, &files).unwrap_err();
        assert!(matches!(err, FilesError::MultipleRoots { .. }));
    }

    #[test]
    fn dangling_parent_is_rejected() {
        let (mut dirs, files) = fixture();
        dirs.push(dir("d-orphan", "/orphan", Some("d-nonexistent")));
        let err = recompute_project_tree(&dirs, &files).unwrap_err();
        assert!(matches!(err, FilesError::UnknownParent { .. }));
    }

    #[test]
    fn empty_project_yields_no_totals() {
        let totals = recompute_project_tree(&[], &[]).unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn dataset_rollup_covers_only_selected_chain() {
        let (dirs, files) = fixture();
        let selected: BTreeSet<String> = ["f-2".to_owned()].into();
        let totals = recompute_for_dataset(&dirs, &files, &selected).unwrap();

        // Only the chain /data/raw -> /data -> root carries selected files;
        // /docs is absent entirely.
        assert_eq!(totals.len(), 3);
        assert_eq!(total_of(&totals, "d-raw").byte_size, 200);
        assert_eq!(total_of(&totals, "d-data").byte_size, 200);
        assert_eq!(total_of(&totals, "d-root").byte_size, 200);
        assert!(totals.iter().all(|t| t.directory_identifier != "d-docs"));
    }

    #[test]
    fn dataset_rollup_with_empty_selection_is_empty() {
        let (dirs, files) = fixture();
        let totals = recompute_for_dataset(&dirs, &files, &BTreeSet::new()).unwrap();
        assert!(totals.is_empty());
    }

    #[test]
    fn dataset_total_ignores_unselected_and_removed() {
        let (_, mut files) = fixture();
        let selected: BTreeSet<String> = ["f-1".to_owned(), "f-4".to_owned()].into();
        assert_eq!(dataset_total_byte_size(&files, &selected), 110);

        files[0].removed = true; // f-1
        assert_eq!(dataset_total_byte_size(&files, &selected), 10);
    }
}

//! The dataset–file binding engine.
//!
//! Resolves a structured batch of file/directory add and exclude directives
//! into a concrete bound file set, reconciles the dataset-specific metadata
//! entries stored inline in the research-dataset document, and recomputes
//! the dataset's aggregates.
//!
//! ## Ordering contract
//!
//! Directive order is a business rule, not an accident of iteration:
//! **all directory directives are applied first, in the order given, then
//! all file directives in the order given**. Each directive is applied
//! immediately, so a later directive can undo an earlier one:
//! last-write-wins for overlapping paths.
//!
//! ## Atomicity
//!
//! Every check and every directive runs against working copies; the store
//! is written once, at the end. A failing directive list leaves no partial
//! effect.

use crate::error::{CatalogError, CatalogResult};
use crate::record::{CatalogRecord, CumulativeState, DirectoryEntry, FileEntry, RecordState};
use crate::store::CatalogStore;
use rdc_files::tree;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Field path reported for every file-set failure.
const FILES_FIELD: &str = "research_dataset.files";

/// One directory directive: attach or detach every file under a path.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryDirective {
    /// The directory to resolve
    pub identifier: String,
    /// Detach instead of attach
    pub exclude: bool,
    /// Dataset-specific metadata to merge for this directory (adds only)
    pub fields: Map<String, Value>,
}

impl DirectoryDirective {
    /// An add directive without metadata.
    pub fn add(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            exclude: false,
            fields: Map::new(),
        }
    }

    /// An exclude directive.
    pub fn exclude(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            exclude: true,
            fields: Map::new(),
        }
    }

    /// Attaches a metadata field to an add directive.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// One file directive: attach or detach a single file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileDirective {
    /// The file to resolve
    pub identifier: String,
    /// Detach instead of attach
    pub exclude: bool,
    /// Dataset-specific metadata to merge for this file (adds only)
    pub fields: Map<String, Value>,
}

impl FileDirective {
    /// An add directive without metadata.
    pub fn add(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            exclude: false,
            fields: Map::new(),
        }
    }

    /// An exclude directive.
    pub fn exclude(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            exclude: true,
            fields: Map::new(),
        }
    }

    /// Attaches a metadata field to an add directive.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }
}

/// A structured batch of directives, directories resolved before files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileDirectives {
    pub directories: Vec<DirectoryDirective>,
    pub files: Vec<FileDirective>,
}

impl FileDirectives {
    pub fn is_empty(&self) -> bool {
        self.directories.is_empty() && self.files.is_empty()
    }

    fn has_excludes(&self) -> bool {
        self.directories.iter().any(|d| d.exclude) || self.files.iter().any(|f| f.exclude)
    }
}

/// Whether the surrounding update replaces or merges per-entry metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Full update: an incoming entry replaces the stored entry wholly
    Full,
    /// Partial update: incoming fields merge field-by-field; a null-valued
    /// field clears that field
    Partial,
}

/// Counts reported back to the caller for auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileChangeOutcome {
    pub files_added: usize,
    pub files_removed: usize,
}

/// Applies a directive batch to a dataset.
///
/// # Errors
///
/// - `Validation` if the dataset's state forbids file-set changes, if an
///   exclusion targets an open cumulative dataset, or if the resulting set
///   would mix projects. Checked before any directive is applied; no
///   partial change is ever committed.
/// - `NotFound` with the full list of unresolvable directory or file
///   identifiers.
/// - `Invariant` if the project tree is corrupted.
pub fn apply_file_changes(
    store: &mut CatalogStore,
    record_identifier: &str,
    directives: &FileDirectives,
    mode: UpdateMode,
) -> CatalogResult<FileChangeOutcome> {
    if directives.is_empty() {
        return Ok(FileChangeOutcome::default());
    }

    let mut record = store.record(record_identifier)?.clone();
    let before = store.bound_files(record_identifier);

    check_state_allows(&record, &before, directives)?;
    resolve_references(store, directives)?;

    // Resolve directives into the new bound set, directories first.
    let mut bound = before.clone();
    for directive in &directives.directories {
        let dir = store
            .directory(&directive.identifier)
            .expect("existence checked by resolve_references")
            .clone();
        let project_files = store.files_of_project(&dir.project_identifier);
        for file in project_files
            .iter()
            .filter(|f| dir.directory_path.contains_file(&f.file_path))
        {
            if directive.exclude {
                // Excludes detach whatever is bound, removed rows included.
                bound.remove(&file.identifier);
            } else if !file.removed {
                bound.insert(file.identifier.clone());
            }
        }
    }
    for directive in &directives.files {
        if directive.exclude {
            bound.remove(&directive.identifier);
        } else {
            let file = store
                .file(&directive.identifier)
                .expect("existence checked by resolve_references");
            if file.removed {
                return Err(CatalogError::validation(
                    FILES_FIELD,
                    format!("file '{}' has been removed", directive.identifier),
                ));
            }
            bound.insert(directive.identifier.clone());
        }
    }

    let project = single_project_of(store, &bound)?;

    // Reconcile the inline metadata entries against the new bound set.
    let mut doc = record.research_dataset.clone();
    doc.files.retain(|e| bound.contains(&e.identifier));
    for directive in &directives.files {
        if directive.exclude || directive.fields.is_empty() || !bound.contains(&directive.identifier)
        {
            continue;
        }
        match doc.files.iter_mut().find(|e| e.identifier == directive.identifier) {
            Some(entry) => merge_fields(&mut entry.fields, &directive.fields, mode),
            None => doc.files.push(FileEntry {
                identifier: directive.identifier.clone(),
                fields: stripped_of_nulls(&directive.fields),
            }),
        }
    }

    let has_bound_file_under = |dir_identifier: &str| -> bool {
        let Some(dir) = store.directory(dir_identifier) else {
            return false;
        };
        bound.iter().any(|f| {
            store
                .file(f)
                .is_some_and(|file| dir.directory_path.contains_file(&file.file_path))
        })
    };
    let pruned: Vec<String> = doc
        .directories
        .iter()
        .filter(|e| !has_bound_file_under(&e.identifier))
        .map(|e| e.identifier.clone())
        .collect();
    if !pruned.is_empty() {
        tracing::debug!(
            record = %record_identifier,
            directories = ?pruned,
            "pruning directory metadata entries with no bound files left"
        );
        doc.directories.retain(|e| !pruned.contains(&e.identifier));
    }
    for directive in &directives.directories {
        if directive.exclude
            || directive.fields.is_empty()
            || !has_bound_file_under(&directive.identifier)
        {
            continue;
        }
        match doc
            .directories
            .iter_mut()
            .find(|e| e.identifier == directive.identifier)
        {
            Some(entry) => merge_fields(&mut entry.fields, &directive.fields, mode),
            None => doc.directories.push(DirectoryEntry {
                identifier: directive.identifier.clone(),
                fields: stripped_of_nulls(&directive.fields),
            }),
        }
    }

    // Dataset-restricted rollups and the total byte size.
    if let Some(project) = project {
        let project_files = store.files_of_project(&project);
        let project_dirs = store.directories_of_project(&project);
        let totals = tree::recompute_for_dataset(&project_dirs, &project_files, &bound)?;
        for entry in &mut doc.directories {
            if let Some(total) = totals
                .iter()
                .find(|t| t.directory_identifier == entry.identifier)
            {
                entry
                    .fields
                    .insert("byte_size".into(), Value::from(total.byte_size));
                entry
                    .fields
                    .insert("file_count".into(), Value::from(total.file_count));
            }
        }
        doc.total_files_byte_size = tree::dataset_total_byte_size(&project_files, &bound);
    } else {
        doc.total_files_byte_size = 0;
    }

    let outcome = FileChangeOutcome {
        files_added: bound.difference(&before).count(),
        files_removed: before.difference(&bound).count(),
    };

    record.research_dataset = doc;
    store.put_record(record)?;
    store.set_bound_files(record_identifier, bound);

    tracing::debug!(
        record = %record_identifier,
        added = outcome.files_added,
        removed = outcome.files_removed,
        "file set change applied"
    );

    Ok(outcome)
}

/// State restrictions, checked before any directive is applied.
///
/// Changes are permitted while a dataset is a draft, the very first time
/// files are added to a file-less published dataset, or (for open
/// cumulative datasets) for additions only.
fn check_state_allows(
    record: &CatalogRecord,
    bound: &BTreeSet<String>,
    directives: &FileDirectives,
) -> CatalogResult<()> {
    if record.state == RecordState::Draft {
        return Ok(());
    }

    if record.cumulative_state == CumulativeState::Yes {
        if directives.has_excludes() {
            return Err(CatalogError::validation(
                FILES_FIELD,
                "excluding files from an open cumulative dataset is not allowed",
            ));
        }
        return Ok(());
    }

    if bound.is_empty() {
        // First population of a published but still file-less dataset.
        return Ok(());
    }

    Err(CatalogError::validation(
        FILES_FIELD,
        "changing files of a published dataset is not allowed",
    ))
}

/// Collects every unresolvable directive reference up front, so the caller
/// sees the complete list of missing identifiers at once.
fn resolve_references(store: &CatalogStore, directives: &FileDirectives) -> CatalogResult<()> {
    let missing_dirs: Vec<String> = directives
        .directories
        .iter()
        .filter(|d| store.directory(&d.identifier).is_none())
        .map(|d| d.identifier.clone())
        .collect();
    if !missing_dirs.is_empty() {
        return Err(CatalogError::NotFound {
            resource: "directory",
            identifiers: missing_dirs,
        });
    }

    let missing_files: Vec<String> = directives
        .files
        .iter()
        .filter(|f| store.file(&f.identifier).is_none())
        .map(|f| f.identifier.clone())
        .collect();
    if !missing_files.is_empty() {
        return Err(CatalogError::NotFound {
            resource: "file",
            identifiers: missing_files,
        });
    }

    Ok(())
}

/// All bound files must belong to exactly one project.
///
/// Returns that project, or `None` for an empty bound set.
fn single_project_of(
    store: &CatalogStore,
    bound: &BTreeSet<String>,
) -> CatalogResult<Option<String>> {
    let mut projects: BTreeSet<String> = BTreeSet::new();
    for identifier in bound {
        if let Some(file) = store.file(identifier) {
            projects.insert(file.project_identifier.clone());
        }
    }
    match projects.len() {
        0 => Ok(None),
        1 => Ok(projects.into_iter().next()),
        _ => Err(CatalogError::validation(
            FILES_FIELD,
            format!(
                "all files of a dataset must belong to one project, found: {:?}",
                projects
            ),
        )),
    }
}

fn stripped_of_nulls(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Merge semantics for a stored entry that also appears in the incoming
/// directives: a full update replaces the stored fields wholly, a partial
/// update merges field-by-field with nulls clearing.
fn merge_fields(existing: &mut Map<String, Value>, incoming: &Map<String, Value>, mode: UpdateMode) {
    match mode {
        UpdateMode::Full => {
            *existing = stripped_of_nulls(incoming);
        }
        UpdateMode::Partial => {
            for (key, value) in incoming {
                if value.is_null() {
                    existing.remove(key);
                } else {
                    existing.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

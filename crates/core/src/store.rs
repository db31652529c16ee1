//! The shared relational store, behind a narrow interface.
//!
//! Every component of the engine reads and writes through [`CatalogStore`]:
//! records, catalogs, the physical file tree, the dataset–file binding
//! table, alternate record sets, dataset version sets, and the notification
//! outbox. The store is request-scoped and single-threaded; isolation
//! between concurrent requests is the relational backend's concern, not
//! modelled here.
//!
//! ## Savepoints
//!
//! [`CatalogStore::savepoint`] captures the full table state;
//! [`CatalogStore::rollback_to`] restores it. The bulk coordinator wraps
//! each row in a savepoint so one failing row cannot roll back its
//! siblings.
//!
//! ## Batched aggregate writes
//!
//! [`CatalogStore::apply_directory_totals`] commits a whole recomputed
//! rollup in one call, the in-process analogue of a single batched UPDATE,
//! keeping the lost-update window between concurrent recomputations small.

use crate::catalog::DataCatalog;
use crate::error::{CatalogError, CatalogResult};
use crate::notify::{OutboxEntry, RecordEvent};
use crate::record::CatalogRecord;
use chrono::{DateTime, Utc};
use rdc_files::{tree, DirectoryTotals, StoredDirectory, StoredFile};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// An unordered set of records across catalogs sharing one preferred
/// identifier. Never persisted with fewer than two members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlternateRecordSet {
    pub id: u64,
    /// Record identifiers of every member
    pub members: BTreeSet<String>,
}

/// The ordered version chain of one logical dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetVersionSet {
    pub id: u64,
    /// Record identifiers, oldest first
    pub records: Vec<String>,
}

#[derive(Default, Clone)]
struct Tables {
    catalogs: BTreeMap<String, DataCatalog>,
    records: BTreeMap<String, CatalogRecord>,
    files: BTreeMap<String, StoredFile>,
    directories: BTreeMap<String, StoredDirectory>,
    /// record identifier -> bound file identifiers
    bindings: BTreeMap<String, BTreeSet<String>>,
    alternate_sets: BTreeMap<u64, AlternateRecordSet>,
    version_sets: BTreeMap<u64, DatasetVersionSet>,
    outbox: VecDeque<OutboxEntry>,
    next_set_id: u64,
    next_outbox_id: u64,
}

/// A captured table state, restorable with [`CatalogStore::rollback_to`].
pub struct Savepoint {
    tables: Tables,
}

/// The request-scoped store every engine component works through.
#[derive(Default)]
pub struct CatalogStore {
    tables: Tables,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captures the current table state.
    pub fn savepoint(&self) -> Savepoint {
        Savepoint {
            tables: self.tables.clone(),
        }
    }

    /// Restores a previously captured table state.
    pub fn rollback_to(&mut self, savepoint: Savepoint) {
        self.tables = savepoint.tables;
    }

    // ------------------------------------------------------------------
    // Catalogs
    // ------------------------------------------------------------------

    /// Registers a catalog after validating its capability flags.
    ///
    /// # Errors
    ///
    /// Validation error on contradictory flags or duplicate identifier.
    pub fn insert_catalog(&mut self, catalog: DataCatalog) -> CatalogResult<()> {
        catalog.validate()?;
        if self.tables.catalogs.contains_key(&catalog.identifier) {
            return Err(CatalogError::validation(
                "data_catalog.identifier",
                format!("catalog '{}' already exists", catalog.identifier),
            ));
        }
        self.tables.catalogs.insert(catalog.identifier.clone(), catalog);
        Ok(())
    }

    /// Looks up a catalog.
    ///
    /// # Errors
    ///
    /// `NotFound` if no catalog has the identifier.
    pub fn catalog(&self, identifier: &str) -> CatalogResult<&DataCatalog> {
        self.tables
            .catalogs
            .get(identifier)
            .ok_or_else(|| CatalogError::not_found("data catalog", identifier))
    }

    // ------------------------------------------------------------------
    // Records
    // ------------------------------------------------------------------

    /// Inserts a new record row.
    ///
    /// # Errors
    ///
    /// Validation error on duplicate record identifier; invariant error if
    /// the metadata version identifier is already taken (server-generated
    /// identifiers must never collide).
    pub fn insert_record(&mut self, record: CatalogRecord) -> CatalogResult<()> {
        if self.tables.records.contains_key(&record.identifier) {
            return Err(CatalogError::validation(
                "identifier",
                format!("record '{}' already exists", record.identifier),
            ));
        }
        if self.metadata_version_identifier_taken(
            &record.metadata_version_identifier,
            Some(&record.identifier),
        ) {
            return Err(CatalogError::Invariant(format!(
                "metadata version identifier '{}' already in use",
                record.metadata_version_identifier
            )));
        }
        self.tables.records.insert(record.identifier.clone(), record);
        Ok(())
    }

    /// Writes back an existing record row.
    ///
    /// # Errors
    ///
    /// `NotFound` if the row does not exist.
    pub fn put_record(&mut self, record: CatalogRecord) -> CatalogResult<()> {
        if !self.tables.records.contains_key(&record.identifier) {
            return Err(CatalogError::not_found("catalog record", &record.identifier));
        }
        self.tables.records.insert(record.identifier.clone(), record);
        Ok(())
    }

    /// Looks up an unremoved record.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record does not exist or is soft-deleted.
    pub fn record(&self, identifier: &str) -> CatalogResult<&CatalogRecord> {
        match self.tables.records.get(identifier) {
            Some(record) if !record.removed => Ok(record),
            _ => Err(CatalogError::not_found("catalog record", identifier)),
        }
    }

    /// Privileged lookup that also returns soft-deleted records.
    pub fn record_any(&self, identifier: &str) -> Option<&CatalogRecord> {
        self.tables.records.get(identifier)
    }

    /// Iterates over all unremoved records.
    pub fn records(&self) -> impl Iterator<Item = &CatalogRecord> {
        self.tables.records.values().filter(|r| !r.removed)
    }

    /// All unremoved records carrying the given preferred identifier.
    pub fn records_with_preferred_identifier(&self, preferred: &str) -> Vec<&CatalogRecord> {
        self.records()
            .filter(|r| r.preferred_identifier == preferred)
            .collect()
    }

    /// True if any other record's metadata version identifier equals
    /// `candidate`.
    pub fn metadata_version_identifier_taken(
        &self,
        candidate: &str,
        exclude_record: Option<&str>,
    ) -> bool {
        self.tables.records.values().any(|r| {
            r.metadata_version_identifier == candidate
                && exclude_record != Some(r.identifier.as_str())
        })
    }

    /// Hard-deletes a record row (legacy catalogs only) along with its
    /// binding-table entry.
    pub fn hard_delete_record(&mut self, identifier: &str) {
        self.tables.records.remove(identifier);
        self.tables.bindings.remove(identifier);
    }

    // ------------------------------------------------------------------
    // Files and directories
    // ------------------------------------------------------------------

    /// Inserts or replaces a file row.
    pub fn put_file(&mut self, file: StoredFile) {
        self.tables.files.insert(file.identifier.clone(), file);
    }

    pub fn file(&self, identifier: &str) -> Option<&StoredFile> {
        self.tables.files.get(identifier)
    }

    /// Soft-deletes a file row.
    ///
    /// # Errors
    ///
    /// `NotFound` if no file row has the identifier.
    pub fn mark_file_removed(&mut self, identifier: &str, at: DateTime<Utc>) -> CatalogResult<()> {
        let file = self
            .tables
            .files
            .get_mut(identifier)
            .ok_or_else(|| CatalogError::not_found("file", identifier))?;
        file.removed = true;
        file.date_removed = Some(at);
        Ok(())
    }

    /// Every file row of a project, removed ones included.
    pub fn files_of_project(&self, project: &str) -> Vec<StoredFile> {
        self.tables
            .files
            .values()
            .filter(|f| f.project_identifier == project)
            .cloned()
            .collect()
    }

    /// Inserts or replaces a directory row.
    pub fn put_directory(&mut self, directory: StoredDirectory) {
        self.tables
            .directories
            .insert(directory.identifier.clone(), directory);
    }

    pub fn directory(&self, identifier: &str) -> Option<&StoredDirectory> {
        self.tables.directories.get(identifier)
    }

    /// Every directory row of a project.
    pub fn directories_of_project(&self, project: &str) -> Vec<StoredDirectory> {
        self.tables
            .directories
            .values()
            .filter(|d| d.project_identifier == project)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Dataset–file bindings
    // ------------------------------------------------------------------

    /// The file identifiers currently bound to a dataset.
    pub fn bound_files(&self, record_identifier: &str) -> BTreeSet<String> {
        self.tables
            .bindings
            .get(record_identifier)
            .cloned()
            .unwrap_or_default()
    }

    /// Replaces a dataset's bound file set.
    pub fn set_bound_files(&mut self, record_identifier: &str, files: BTreeSet<String>) {
        if files.is_empty() {
            self.tables.bindings.remove(record_identifier);
        } else {
            self.tables.bindings.insert(record_identifier.to_owned(), files);
        }
    }

    /// Identifiers of unremoved records bound to any of the given files.
    pub fn records_bound_to_files(&self, file_identifiers: &[String]) -> Vec<String> {
        self.tables
            .bindings
            .iter()
            .filter(|(record, bound)| {
                self.tables
                    .records
                    .get(*record)
                    .is_some_and(|r| !r.removed)
                    && file_identifiers.iter().any(|f| bound.contains(f))
            })
            .map(|(record, _)| record.clone())
            .collect()
    }

    // ------------------------------------------------------------------
    // Directory aggregates
    // ------------------------------------------------------------------

    /// Commits a recomputed rollup in one batched write.
    ///
    /// # Errors
    ///
    /// Invariant error if a total references a directory row that does not
    /// exist; rollups are computed from the same tables they update.
    pub fn apply_directory_totals(&mut self, totals: &[DirectoryTotals]) -> CatalogResult<()> {
        for total in totals {
            if !self.tables.directories.contains_key(&total.directory_identifier) {
                return Err(CatalogError::Invariant(format!(
                    "aggregate update references unknown directory '{}'",
                    total.directory_identifier
                )));
            }
        }
        for total in totals {
            let dir = self
                .tables
                .directories
                .get_mut(&total.directory_identifier)
                .expect("existence checked above");
            dir.byte_size = total.byte_size;
            dir.file_count = total.file_count;
        }
        Ok(())
    }

    /// Recomputes and commits the whole-project rollup. Called whenever the
    /// physical file tree changes.
    ///
    /// # Errors
    ///
    /// Invariant error on corrupted tree shape (multiple roots, dangling
    /// parents).
    pub fn recompute_project_aggregates(&mut self, project: &str) -> CatalogResult<()> {
        let directories = self.directories_of_project(project);
        let files = self.files_of_project(project);
        let totals = tree::recompute_project_tree(&directories, &files)?;
        self.apply_directory_totals(&totals)
    }

    // ------------------------------------------------------------------
    // Alternate record sets
    // ------------------------------------------------------------------

    /// Creates an alternate record set.
    ///
    /// # Errors
    ///
    /// Invariant error if fewer than two members are supplied; a set of
    /// one is meaningless and must never exist.
    pub fn create_alternate_set(&mut self, members: BTreeSet<String>) -> CatalogResult<u64> {
        if members.len() < 2 {
            return Err(CatalogError::Invariant(
                "an alternate record set needs at least two members".into(),
            ));
        }
        self.tables.next_set_id += 1;
        let id = self.tables.next_set_id;
        self.tables
            .alternate_sets
            .insert(id, AlternateRecordSet { id, members });
        Ok(id)
    }

    pub fn alternate_set(&self, id: u64) -> Option<&AlternateRecordSet> {
        self.tables.alternate_sets.get(&id)
    }

    /// Replaces an alternate set's membership.
    ///
    /// # Errors
    ///
    /// Invariant error if the set does not exist or would shrink below two
    /// members (dissolve it instead).
    pub fn update_alternate_set(&mut self, id: u64, members: BTreeSet<String>) -> CatalogResult<()> {
        if members.len() < 2 {
            return Err(CatalogError::Invariant(
                "an alternate record set needs at least two members".into(),
            ));
        }
        match self.tables.alternate_sets.get_mut(&id) {
            Some(set) => {
                set.members = members;
                Ok(())
            }
            None => Err(CatalogError::Invariant(format!(
                "alternate record set {id} does not exist"
            ))),
        }
    }

    pub fn delete_alternate_set(&mut self, id: u64) {
        self.tables.alternate_sets.remove(&id);
    }

    // ------------------------------------------------------------------
    // Dataset version sets
    // ------------------------------------------------------------------

    /// Creates a version set over the given record chain, oldest first.
    pub fn create_version_set(&mut self, records: Vec<String>) -> u64 {
        self.tables.next_set_id += 1;
        let id = self.tables.next_set_id;
        self.tables
            .version_sets
            .insert(id, DatasetVersionSet { id, records });
        id
    }

    pub fn version_set(&self, id: u64) -> Option<&DatasetVersionSet> {
        self.tables.version_sets.get(&id)
    }

    /// Appends a record to the end of a version chain.
    ///
    /// # Errors
    ///
    /// Invariant error if the set does not exist.
    pub fn append_to_version_set(&mut self, id: u64, record: String) -> CatalogResult<()> {
        match self.tables.version_sets.get_mut(&id) {
            Some(set) => {
                if !set.records.contains(&record) {
                    set.records.push(record);
                }
                Ok(())
            }
            None => Err(CatalogError::Invariant(format!(
                "dataset version set {id} does not exist"
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Notification outbox
    // ------------------------------------------------------------------

    /// Appends an event envelope for the record, inside whatever savepoint
    /// is active.
    ///
    /// # Errors
    ///
    /// Serialization error if the record cannot be snapshotted.
    pub fn enqueue_event(
        &mut self,
        event: RecordEvent,
        record: &CatalogRecord,
    ) -> CatalogResult<()> {
        self.tables.next_outbox_id += 1;
        let entry = OutboxEntry::snapshot(self.tables.next_outbox_id, event, record)?;
        self.tables.outbox.push_back(entry);
        Ok(())
    }

    /// The oldest undelivered envelope, if any.
    pub fn peek_outbox(&self) -> Option<&OutboxEntry> {
        self.tables.outbox.front()
    }

    /// Dequeues the oldest envelope after successful delivery.
    pub fn pop_outbox(&mut self) -> Option<OutboxEntry> {
        self.tables.outbox.pop_front()
    }

    pub fn outbox_len(&self) -> usize {
        self.tables.outbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{ApiRevision, CumulativeState, RecordState, ResearchDataset};
    use rdc_types::{DirectoryPath, FilePath};

    pub(crate) fn record(identifier: &str, catalog: &str) -> CatalogRecord {
        CatalogRecord {
            identifier: identifier.into(),
            preferred_identifier: format!("urn:nbn:fi:att:{identifier}"),
            metadata_version_identifier: format!("urn:nbn:fi:att:md-{identifier}"),
            api_revision: ApiRevision::Rev2,
            state: RecordState::Published,
            deprecated: false,
            cumulative_state: CumulativeState::No,
            preservation_state: 0,
            data_catalog: catalog.into(),
            contract: None,
            research_dataset: ResearchDataset::default(),
            next_version: None,
            previous_version: None,
            dataset_version_set: None,
            alternate_record_set: None,
            removed: false,
            date_created: Utc::now(),
            date_modified: None,
            date_cumulation_started: None,
        }
    }

    #[test]
    fn savepoint_rollback_restores_everything() {
        let mut store = CatalogStore::new();
        store.insert_record(record("r1", "cat-a")).unwrap();

        let savepoint = store.savepoint();
        store.insert_record(record("r2", "cat-a")).unwrap();
        store.set_bound_files("r2", ["f1".to_owned()].into());
        assert!(store.record("r2").is_ok());

        store.rollback_to(savepoint);
        assert!(store.record("r2").is_err());
        assert!(store.bound_files("r2").is_empty());
        assert!(store.record("r1").is_ok());
    }

    #[test]
    fn duplicate_metadata_version_identifier_is_invariant_violation() {
        let mut store = CatalogStore::new();
        store.insert_record(record("r1", "cat-a")).unwrap();
        let mut dup = record("r2", "cat-a");
        dup.metadata_version_identifier = "urn:nbn:fi:att:md-r1".into();
        let err = store.insert_record(dup).unwrap_err();
        assert!(matches!(err, CatalogError::Invariant(_)));
    }

    #[test]
    fn removed_records_hidden_from_normal_lookup() {
        let mut store = CatalogStore::new();
        let mut r = record("r1", "cat-a");
        r.removed = true;
        store.insert_record(r).unwrap();

        assert!(store.record("r1").is_err());
        assert!(store.record_any("r1").is_some());
    }

    #[test]
    fn alternate_set_of_one_is_rejected() {
        let mut store = CatalogStore::new();
        let err = store
            .create_alternate_set(["r1".to_owned()].into())
            .unwrap_err();
        assert!(matches!(err, CatalogError::Invariant(_)));
    }

    #[test]
    fn project_aggregates_recompute_through_batch() {
        let mut store = CatalogStore::new();
        store.put_directory(StoredDirectory::new(
            "d-root",
            "p1",
            DirectoryPath::root(),
            None,
        ));
        store.put_directory(StoredDirectory::new(
            "d-data",
            "p1",
            DirectoryPath::new("/data").unwrap(),
            Some("d-root".into()),
        ));
        store.put_file(StoredFile::new(
            "f1",
            "p1",
            FilePath::new("/data/a.csv").unwrap(),
            Some("d-data".into()),
            150,
        ));

        store.recompute_project_aggregates("p1").unwrap();
        assert_eq!(store.directory("d-data").unwrap().byte_size, 150);
        assert_eq!(store.directory("d-root").unwrap().file_count, 1);
    }

    #[test]
    fn bound_file_reverse_lookup_skips_removed_records() {
        let mut store = CatalogStore::new();
        store.insert_record(record("r1", "cat-a")).unwrap();
        let mut gone = record("r2", "cat-a");
        gone.removed = true;
        store.insert_record(gone).unwrap();
        store.set_bound_files("r1", ["f1".to_owned()].into());
        store.set_bound_files("r2", ["f1".to_owned()].into());

        let bound = store.records_bound_to_files(&["f1".to_owned()]);
        assert_eq!(bound, vec!["r1".to_owned()]);
    }
}

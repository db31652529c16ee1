//! The version and publication state machine.
//!
//! [`DatasetService`] owns every state transition of a catalog record:
//! create, publish, in-place update, new-version forking, soft delete,
//! cumulation lifecycle, preservation workflow and the deprecation sweep.
//! All collaborators (the acting catalog's capabilities, the PID minter,
//! the configuration) arrive as explicit arguments; nothing is read from
//! ambient state.
//!
//! ## Forking rules
//!
//! A metadata update on a published record in a versioning catalog forks a
//! new version unless the caller sets `preserve_version`. The fork starts
//! as a draft with a fresh metadata version identifier and cleared
//! preservation fields. It inherits the parent's preferred identifier for a
//! pure metadata edit, but gets a placeholder (regenerated at publication)
//! when the change touched the preferred identifier or the file set, or
//! always, under the Rev1 policy. Stale references to removed files are
//! dropped rather than carried into the fork.

use crate::alternates;
use crate::binding::{self, FileChangeOutcome, FileDirectives, UpdateMode};
use crate::catalog::CatalogKind;
use crate::changeset::{ChangeSet, RecordPatch};
use crate::config::CoreConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::notify::RecordEvent;
use crate::record::{
    CatalogRecord, CumulativeState, NewRecord, RecordState, PRESERVATION_STATE_INITIAL,
};
use crate::store::CatalogStore;
use crate::uniqueness::{self, PREFERRED_IDENTIFIER_FIELD};
use chrono::Utc;
use rdc_files::tree;
use rdc_pid::{PidMinter, PidType};
use std::collections::BTreeSet;

/// Result of an update: the record as stored, plus the fork if one was
/// created, plus binding counts for caller-level auditing.
#[derive(Debug)]
pub struct UpdateOutcome {
    /// The record the update targeted, as stored afterwards
    pub record: CatalogRecord,
    /// The new draft version, when the update forked one
    pub new_version: Option<CatalogRecord>,
    pub files_added: usize,
    pub files_removed: usize,
}

/// The state machine over catalog records.
pub struct DatasetService<'a> {
    store: &'a mut CatalogStore,
    config: &'a CoreConfig,
    pids: &'a PidMinter,
}

impl<'a> DatasetService<'a> {
    pub fn new(store: &'a mut CatalogStore, config: &'a CoreConfig, pids: &'a PidMinter) -> Self {
        Self {
            store,
            config,
            pids,
        }
    }

    /// Creates a record, publishing it immediately when requested.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the target catalog does not exist.
    /// - `Validation` if the API revision forbids drafts, the requested
    ///   cumulation state is `closed`, or publication fails its checks.
    pub fn create(&mut self, input: NewRecord) -> CatalogResult<CatalogRecord> {
        let catalog = self.store.catalog(&input.data_catalog)?.clone();
        let kind = catalog.kind(self.config);

        if input.state == RecordState::Draft && !input.api_revision.policy().drafts_enabled {
            return Err(CatalogError::validation(
                "state",
                "drafts are not supported by this api revision",
            ));
        }
        if input.cumulative_state == CumulativeState::Closed {
            return Err(CatalogError::validation(
                "cumulative_state",
                "a dataset cannot be created in the closed cumulation state",
            ));
        }

        let identifier = self.pids.record_identifier().to_string();
        let mut record = CatalogRecord {
            identifier: identifier.clone(),
            preferred_identifier: PidMinter::draft_identifier(&identifier),
            metadata_version_identifier: self.pids.metadata_version_identifier(),
            api_revision: input.api_revision,
            state: RecordState::Draft,
            deprecated: false,
            cumulative_state: input.cumulative_state,
            preservation_state: PRESERVATION_STATE_INITIAL,
            data_catalog: input.data_catalog,
            contract: input.contract,
            research_dataset: input.research_dataset,
            next_version: None,
            previous_version: None,
            dataset_version_set: None,
            alternate_record_set: None,
            removed: false,
            date_created: Utc::now(),
            date_modified: None,
            date_cumulation_started: None,
        };

        // Supplied PIDs are only meaningful where the server does not mint.
        if !kind.pid_policy().server_generates_pid {
            if let Some(supplied) = input
                .preferred_identifier
                .as_deref()
                .filter(|s| !s.trim().is_empty())
            {
                record.preferred_identifier = supplied.to_owned();
            }
        }

        self.store.insert_record(record)?;

        if input.state == RecordState::Published {
            return self.publish(&identifier, input.pid_type);
        }

        tracing::debug!(record = %identifier, "draft created");
        Ok(self.store.record(&identifier)?.clone())
    }

    /// Publishes a draft: resolves the preferred identifier per catalog
    /// policy, validates it, registers set memberships and emits the
    /// created event.
    ///
    /// # Errors
    ///
    /// `Validation` if the record is already published, a required supplied
    /// PID is missing, a DOI is requested where DOIs are disabled, or the
    /// identifier fails the uniqueness rules.
    pub fn publish(
        &mut self,
        identifier: &str,
        pid_hint: Option<PidType>,
    ) -> CatalogResult<CatalogRecord> {
        let record = self.store.record(identifier)?.clone();
        if record.is_published() {
            return Err(CatalogError::validation("state", "dataset is already published"));
        }

        let catalog = self.store.catalog(&record.data_catalog)?.clone();
        let kind = catalog.kind(self.config);
        let policy = kind.pid_policy();

        let candidate = if policy.server_generates_pid {
            if PidMinter::is_draft_identifier(&record.preferred_identifier) {
                let pid_type = pid_hint.unwrap_or(PidType::Urn);
                if pid_type == PidType::Doi && !catalog.doi_enabled {
                    return Err(CatalogError::validation(
                        PREFERRED_IDENTIFIER_FIELD,
                        "DOIs are not enabled in this catalog",
                    ));
                }
                self.pids.preferred_identifier(pid_type)
            } else {
                // A fork that inherited its parent's identifier keeps it.
                record.preferred_identifier.clone()
            }
        } else {
            // Harvester- or user-supplied value, stored verbatim.
            if PidMinter::is_draft_identifier(&record.preferred_identifier) {
                return Err(CatalogError::validation(
                    PREFERRED_IDENTIFIER_FIELD,
                    format!(
                        "an externally supplied preferred identifier is required in a {}",
                        kind.display_name()
                    ),
                ));
            }
            record.preferred_identifier.clone()
        };

        uniqueness::validate_preferred_identifier(
            self.store,
            self.config,
            &candidate,
            &record.data_catalog,
            Some(identifier),
        )?;

        let now = Utc::now();
        let mut record = record;
        record.preferred_identifier = candidate;
        record.state = RecordState::Published;
        record.date_modified = Some(now);
        if record.cumulative_state == CumulativeState::Yes
            && record.date_cumulation_started.is_none()
        {
            record.date_cumulation_started = Some(now);
        }
        if kind == CatalogKind::Versioning && record.dataset_version_set.is_none() {
            let set_id = self.store.create_version_set(vec![identifier.to_owned()]);
            record.dataset_version_set = Some(set_id);
        }
        self.store.put_record(record)?;

        alternates::sync_after_save(self.store, identifier)?;

        let snapshot = self.store.record(identifier)?.clone();
        self.store.enqueue_event(RecordEvent::Created, &snapshot)?;
        tracing::info!(
            record = %identifier,
            preferred = %snapshot.preferred_identifier,
            catalog = %snapshot.data_catalog,
            "dataset published"
        );
        Ok(snapshot)
    }

    /// Applies an update, forking a new version when the catalog and the
    /// change set require it.
    ///
    /// # Errors
    ///
    /// `Validation` for frozen old versions, disallowed cumulation
    /// transitions, identifier failures; `NotFound` for missing references.
    pub fn update(&mut self, identifier: &str, patch: RecordPatch) -> CatalogResult<UpdateOutcome> {
        let record = self.store.record(identifier)?.clone();
        let changes = ChangeSet::compute(&record, &patch);
        let catalog = self.store.catalog(&record.data_catalog)?.clone();
        let kind = catalog.kind(self.config);

        // An old version is frozen once a next version exists; only
        // operational preservation fields stay editable.
        if record.has_next_version() && changes.touches_descriptive_fields() {
            return Err(CatalogError::validation(
                "research_dataset",
                "a dataset with a next version is frozen; only preservation fields may change",
            ));
        }

        if record.is_published()
            && kind == CatalogKind::Versioning
            && !patch.preserve_version
            && (changes.descriptive_changed
                || changes.files_changed
                || changes.preferred_identifier.is_some())
        {
            tracing::debug!(record = %identifier, "update forks a new version");
            return self.fork_new_version(record, patch, changes);
        }

        self.update_in_place(record, patch, changes, kind)
    }

    /// Explicitly forks a new version of a published dataset without any
    /// accompanying metadata change.
    ///
    /// # Errors
    ///
    /// `Validation` if the record is not published, the catalog does not
    /// version, or a next version already exists.
    pub fn create_new_version(&mut self, identifier: &str) -> CatalogResult<CatalogRecord> {
        let record = self.store.record(identifier)?.clone();
        if !record.is_published() {
            return Err(CatalogError::validation(
                "state",
                "only a published dataset can be forked into a new version",
            ));
        }
        let kind = self.store.catalog(&record.data_catalog)?.clone().kind(self.config);
        if kind != CatalogKind::Versioning {
            return Err(CatalogError::validation(
                "data_catalog",
                "the catalog does not support dataset versioning",
            ));
        }
        let outcome = self.fork_new_version(record, RecordPatch::default(), ChangeSet::default())?;
        outcome.new_version.ok_or_else(|| {
            CatalogError::Invariant("fork reported success without a new version".into())
        })
    }

    /// Soft-deletes a record (hard delete in legacy catalogs), shrinks its
    /// alternate record set and emits the deleted event.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record does not exist or was already removed.
    pub fn remove(&mut self, identifier: &str) -> CatalogResult<()> {
        let record = self.store.record(identifier)?.clone();
        let kind = self.store.catalog(&record.data_catalog)?.clone().kind(self.config);

        alternates::remove_from_set(self.store, identifier)?;

        if kind == CatalogKind::Legacy {
            self.store.hard_delete_record(identifier);
        } else {
            let mut row = self
                .store
                .record_any(identifier)
                .cloned()
                .ok_or_else(|| CatalogError::not_found("catalog record", identifier))?;
            row.removed = true;
            row.date_modified = Some(Utc::now());
            self.store.put_record(row)?;
        }

        if record.is_published() {
            self.store.enqueue_event(RecordEvent::Deleted, &record)?;
        }
        tracing::info!(record = %identifier, "dataset removed");
        Ok(())
    }

    /// Closes an open cumulative dataset.
    ///
    /// # Errors
    ///
    /// `Validation` unless the record is published with
    /// `cumulative_state = yes`.
    pub fn close_cumulative(&mut self, identifier: &str) -> CatalogResult<CatalogRecord> {
        let record = self.store.record(identifier)?.clone();
        if !record.is_published() || record.cumulative_state != CumulativeState::Yes {
            return Err(CatalogError::validation(
                "cumulative_state",
                "only a published, open cumulative dataset can be closed",
            ));
        }
        let mut record = record;
        record.cumulative_state = CumulativeState::Closed;
        record.date_modified = Some(Utc::now());
        self.store.put_record(record.clone())?;
        self.store.enqueue_event(RecordEvent::Updated, &record)?;
        Ok(record)
    }

    /// Sets the preservation workflow state. Operational: allowed even on
    /// a record frozen by a next version.
    ///
    /// # Errors
    ///
    /// `NotFound` if the record does not exist.
    pub fn set_preservation_state(
        &mut self,
        identifier: &str,
        state: i32,
    ) -> CatalogResult<CatalogRecord> {
        let mut record = self.store.record(identifier)?.clone();
        record.preservation_state = state;
        record.date_modified = Some(Utc::now());
        self.store.put_record(record.clone())?;
        if record.is_published() {
            self.store.enqueue_event(RecordEvent::Updated, &record)?;
        }
        Ok(record)
    }

    /// Applies file/directory directives to a dataset outside of a full
    /// update, bumping its modification stamp and emitting the updated
    /// event when anything changed.
    ///
    /// # Errors
    ///
    /// Propagates binding-engine failures.
    pub fn apply_file_changes(
        &mut self,
        identifier: &str,
        directives: &FileDirectives,
        mode: UpdateMode,
    ) -> CatalogResult<FileChangeOutcome> {
        let outcome = binding::apply_file_changes(self.store, identifier, directives, mode)?;
        if outcome.files_added > 0 || outcome.files_removed > 0 {
            let mut record = self.store.record(identifier)?.clone();
            record.date_modified = Some(Utc::now());
            self.store.put_record(record.clone())?;
            if record.is_published() {
                self.store.enqueue_event(RecordEvent::Updated, &record)?;
            }
        }
        Ok(outcome)
    }

    /// Marks every unremoved dataset bound to one of the given files as
    /// deprecated. One-way: the flag never clears. Returns how many
    /// records were newly deprecated.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn deprecate_for_removed_files(
        &mut self,
        file_identifiers: &[String],
    ) -> CatalogResult<usize> {
        let affected = self.store.records_bound_to_files(file_identifiers);
        let mut deprecated = 0;
        for identifier in affected {
            let mut record = self.store.record(&identifier)?.clone();
            if record.deprecated {
                continue;
            }
            record.deprecated = true;
            record.date_modified = Some(Utc::now());
            self.store.put_record(record.clone())?;
            if record.is_published() {
                self.store.enqueue_event(RecordEvent::Updated, &record)?;
            }
            tracing::info!(record = %identifier, "dataset deprecated after file removal");
            deprecated += 1;
        }
        Ok(deprecated)
    }

    fn update_in_place(
        &mut self,
        record: CatalogRecord,
        patch: RecordPatch,
        changes: ChangeSet,
        kind: CatalogKind,
    ) -> CatalogResult<UpdateOutcome> {
        if let Some((from, to)) = changes.cumulative_state {
            check_cumulative_transition(&record, from, to)?;
        }

        let now = Utc::now();
        let identifier = record.identifier.clone();
        let mut updated = record.clone();

        if let Some((_, ref new_pid)) = changes.preferred_identifier {
            if kind.pid_policy().server_generates_pid {
                return Err(CatalogError::validation(
                    PREFERRED_IDENTIFIER_FIELD,
                    "the preferred identifier is server-generated in this catalog",
                ));
            }
            uniqueness::validate_preferred_identifier(
                self.store,
                self.config,
                new_pid,
                &record.data_catalog,
                Some(&identifier),
            )?;
            alternates::remove_from_set(self.store, &identifier)?;
            // remove_from_set may have rewritten the row; refresh before
            // layering the patch on top.
            updated = self.store.record(&identifier)?.clone();
            updated.preferred_identifier = new_pid.clone();
        }

        if let Some(mut doc) = patch.research_dataset.clone() {
            // The derived aggregate survives a document replacement; the
            // binding engine below is the only writer.
            doc.total_files_byte_size = record.research_dataset.total_files_byte_size;
            updated.research_dataset = doc;
        }
        if changes.descriptive_changed {
            updated.metadata_version_identifier = self.pids.metadata_version_identifier();
        }
        if let Some((_, to)) = changes.cumulative_state {
            updated.cumulative_state = to;
            if to == CumulativeState::Yes
                && updated.is_published()
                && updated.date_cumulation_started.is_none()
            {
                updated.date_cumulation_started = Some(now);
            }
        }
        if let Some((_, to)) = changes.preservation_state {
            updated.preservation_state = to;
        }
        if let Some(contract) = patch.contract.clone() {
            updated.contract = Some(contract);
        }
        updated.date_modified = Some(now);
        self.store.put_record(updated)?;

        let mut files_added = 0;
        let mut files_removed = 0;
        if let Some(directives) = &patch.file_directives {
            let mode = if patch.partial {
                UpdateMode::Partial
            } else {
                UpdateMode::Full
            };
            let outcome = binding::apply_file_changes(self.store, &identifier, directives, mode)?;
            files_added = outcome.files_added;
            files_removed = outcome.files_removed;
        }

        if changes.preferred_identifier.is_some() {
            alternates::sync_after_save(self.store, &identifier)?;
        }

        let snapshot = self.store.record(&identifier)?.clone();
        if snapshot.is_published() && !changes.is_empty() {
            self.store.enqueue_event(RecordEvent::Updated, &snapshot)?;
        }

        Ok(UpdateOutcome {
            record: snapshot,
            new_version: None,
            files_added,
            files_removed,
        })
    }

    fn fork_new_version(
        &mut self,
        parent: CatalogRecord,
        patch: RecordPatch,
        changes: ChangeSet,
    ) -> CatalogResult<UpdateOutcome> {
        if parent.has_next_version() {
            return Err(CatalogError::validation(
                "next_version",
                "the dataset already has a next version; update that version instead",
            ));
        }

        let now = Utc::now();
        let new_identifier = self.pids.record_identifier().to_string();

        let force_new_pid = changes.forces_new_preferred_identifier()
            || parent.api_revision.policy().force_new_pid_on_fork;
        let preferred = if force_new_pid {
            PidMinter::draft_identifier(&new_identifier)
        } else {
            parent.preferred_identifier.clone()
        };

        let mut doc = patch
            .research_dataset
            .clone()
            .unwrap_or_else(|| parent.research_dataset.clone());
        doc.total_files_byte_size = parent.research_dataset.total_files_byte_size;

        // Stale references to removed files are dropped, not carried
        // forward. This is what cleans up after a deprecation.
        let parent_bound = self.store.bound_files(&parent.identifier);
        let live: BTreeSet<String> = parent_bound
            .iter()
            .filter(|f| self.store.file(f).is_some_and(|row| !row.removed))
            .cloned()
            .collect();
        if live.len() < parent_bound.len() {
            tracing::info!(
                record = %parent.identifier,
                dropped = parent_bound.len() - live.len(),
                "dropping stale file references from the new version"
            );
            doc.files.retain(|e| live.contains(&e.identifier));
        }

        let mut fork = CatalogRecord {
            identifier: new_identifier.clone(),
            preferred_identifier: preferred,
            metadata_version_identifier: self.pids.metadata_version_identifier(),
            api_revision: parent.api_revision,
            state: RecordState::Draft,
            deprecated: false,
            cumulative_state: patch.cumulative_state.unwrap_or(parent.cumulative_state),
            // Archival/preservation fields start over for a new version.
            preservation_state: PRESERVATION_STATE_INITIAL,
            data_catalog: parent.data_catalog.clone(),
            contract: None,
            research_dataset: doc,
            next_version: None,
            previous_version: Some(parent.identifier.clone()),
            dataset_version_set: None,
            alternate_record_set: None,
            removed: false,
            date_created: now,
            date_modified: None,
            date_cumulation_started: parent.date_cumulation_started,
        };

        let set_id = match parent.dataset_version_set {
            Some(id) => {
                self.store.append_to_version_set(id, new_identifier.clone())?;
                id
            }
            None => self
                .store
                .create_version_set(vec![parent.identifier.clone(), new_identifier.clone()]),
        };
        fork.dataset_version_set = Some(set_id);

        self.store.insert_record(fork)?;
        self.store.set_bound_files(&new_identifier, live);
        refresh_dataset_totals(self.store, &new_identifier)?;

        let mut parent = parent;
        parent.next_version = Some(new_identifier.clone());
        parent.dataset_version_set = Some(set_id);
        parent.date_modified = Some(now);
        self.store.put_record(parent.clone())?;

        let mut files_added = 0;
        let mut files_removed = 0;
        if let Some(directives) = &patch.file_directives {
            let mode = if patch.partial {
                UpdateMode::Partial
            } else {
                UpdateMode::Full
            };
            let outcome =
                binding::apply_file_changes(self.store, &new_identifier, directives, mode)?;
            files_added = outcome.files_added;
            files_removed = outcome.files_removed;
        }

        self.store.enqueue_event(RecordEvent::Updated, &parent)?;
        tracing::info!(
            parent = %parent.identifier,
            fork = %new_identifier,
            "new dataset version forked"
        );

        Ok(UpdateOutcome {
            record: parent,
            new_version: Some(self.store.record(&new_identifier)?.clone()),
            files_added,
            files_removed,
        })
    }
}

/// Recomputes a dataset's derived totals directly from its bound set,
/// used after a fork copies (and prunes) the parent's bindings.
fn refresh_dataset_totals(store: &mut CatalogStore, identifier: &str) -> CatalogResult<()> {
    let bound = store.bound_files(identifier);
    let mut record = store.record(identifier)?.clone();

    let Some(project) = bound
        .iter()
        .find_map(|f| store.file(f).map(|row| row.project_identifier.clone()))
    else {
        record.research_dataset.total_files_byte_size = 0;
        return store.put_record(record);
    };

    let files = store.files_of_project(&project);
    let directories = store.directories_of_project(&project);
    let totals = tree::recompute_for_dataset(&directories, &files, &bound)?;
    for entry in &mut record.research_dataset.directories {
        if let Some(total) = totals
            .iter()
            .find(|t| t.directory_identifier == entry.identifier)
        {
            entry
                .fields
                .insert("byte_size".into(), serde_json::Value::from(total.byte_size));
            entry.fields.insert(
                "file_count".into(),
                serde_json::Value::from(total.file_count),
            );
        }
    }
    record.research_dataset.total_files_byte_size = tree::dataset_total_byte_size(&files, &bound);
    store.put_record(record)
}

/// Cumulation transitions allowed on an in-place update.
fn check_cumulative_transition(
    record: &CatalogRecord,
    from: CumulativeState,
    to: CumulativeState,
) -> CatalogResult<()> {
    if record.state == RecordState::Draft {
        if to == CumulativeState::Closed {
            return Err(CatalogError::validation(
                "cumulative_state",
                "only a published cumulative dataset can be closed",
            ));
        }
        return Ok(());
    }
    match (from, to) {
        (CumulativeState::Yes, CumulativeState::Closed) => Ok(()),
        (CumulativeState::Closed, CumulativeState::Yes) => Err(CatalogError::validation(
            "cumulative_state",
            "reopening a closed dataset requires a new version",
        )),
        (CumulativeState::No, CumulativeState::Yes) => Err(CatalogError::validation(
            "cumulative_state",
            "cumulation cannot be started on a published dataset",
        )),
        _ => Err(CatalogError::validation(
            "cumulative_state",
            format!(
                "cumulative state cannot change from {} to {}",
                from.as_str(),
                to.as_str()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataCatalog;
    use crate::record::{ApiRevision, ResearchDataset};
    use rdc_pid::SequenceUuidSource;
    use rdc_types::{DirectoryPath, FilePath};
    use rdc_files::{StoredDirectory, StoredFile};
    use serde_json::json;

    struct Fixture {
        store: CatalogStore,
        config: CoreConfig,
        pids: PidMinter,
    }

    impl Fixture {
        fn new() -> Self {
            let config = CoreConfig::new("fi", "23729", vec!["cat-legacy".into()]).unwrap();
            let pids = config
                .minter_with_source(Box::new(SequenceUuidSource::default()))
                .unwrap();
            let mut store = CatalogStore::new();
            for (identifier, versioning, harvested, doi) in [
                ("cat-att", true, false, true),
                ("cat-ida", false, false, false),
                ("cat-harvest", false, true, false),
                ("cat-legacy", false, false, false),
            ] {
                store
                    .insert_catalog(DataCatalog {
                        identifier: identifier.into(),
                        title: None,
                        dataset_versioning: versioning,
                        harvested,
                        doi_enabled: doi,
                    })
                    .unwrap();
            }

            store.put_directory(StoredDirectory::new("d-root", "p1", DirectoryPath::root(), None));
            store.put_directory(StoredDirectory::new(
                "dir1",
                "p1",
                DirectoryPath::new("/dir1").unwrap(),
                Some("d-root".into()),
            ));
            for (id, path, size) in [
                ("f1", "/dir1/a.csv", 100),
                ("f2", "/dir1/b.csv", 100),
                ("f3", "/dir1/c.csv", 100),
            ] {
                store.put_file(StoredFile::new(
                    id,
                    "p1",
                    FilePath::new(path).unwrap(),
                    Some("dir1".into()),
                    size,
                ));
            }

            Self { store, config, pids }
        }

        fn service(&mut self) -> DatasetService<'_> {
            DatasetService::new(&mut self.store, &self.config, &self.pids)
        }
    }

    fn titled(title: &str) -> ResearchDataset {
        ResearchDataset {
            title: Some(json!({ "en": title })),
            ..Default::default()
        }
    }

    #[test]
    fn publish_mints_urn_and_registers_version_set() {
        let mut fx = Fixture::new();
        let draft = fx
            .service()
            .create(NewRecord {
                research_dataset: titled("Versioned"),
                ..NewRecord::draft("cat-att")
            })
            .unwrap();
        assert!(PidMinter::is_draft_identifier(&draft.preferred_identifier));

        let published = fx.service().publish(&draft.identifier, None).unwrap();
        assert!(published.preferred_identifier.starts_with("urn:nbn:fi:att:"));
        assert!(published.dataset_version_set.is_some());
        assert_eq!(fx.store.outbox_len(), 1);
    }

    #[test]
    fn publish_twice_is_rejected() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-ida")).unwrap();
        fx.service().publish(&draft.identifier, None).unwrap();
        let err = fx.service().publish(&draft.identifier, None).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn doi_requires_catalog_support() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-ida")).unwrap();
        let err = fx
            .service()
            .publish(&draft.identifier, Some(PidType::Doi))
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        let draft = fx.service().create(NewRecord::draft("cat-att")).unwrap();
        let published = fx
            .service()
            .publish(&draft.identifier, Some(PidType::Doi))
            .unwrap();
        assert!(published.preferred_identifier.starts_with("doi:10.23729/"));
    }

    #[test]
    fn legacy_publish_requires_supplied_identifier() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-legacy")).unwrap();

        // Without a supplied value publication is rejected.
        let err = fx.service().publish(&draft.identifier, None).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        // With a value supplied the publish succeeds and stores it verbatim.
        fx.service()
            .update(
                &draft.identifier,
                RecordPatch {
                    preferred_identifier: Some("hdl:10138/legacy-1".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();
        assert_eq!(published.preferred_identifier, "hdl:10138/legacy-1");
    }

    #[test]
    fn rev1_records_cannot_be_drafts() {
        let mut fx = Fixture::new();
        let err = fx
            .service()
            .create(NewRecord {
                api_revision: ApiRevision::Rev1,
                ..NewRecord::draft("cat-ida")
            })
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn metadata_update_on_versioned_dataset_forks_draft() {
        let mut fx = Fixture::new();
        let draft = fx
            .service()
            .create(NewRecord {
                research_dataset: titled("Original"),
                ..NewRecord::draft("cat-att")
            })
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();

        let outcome = fx
            .service()
            .update(
                &published.identifier,
                RecordPatch {
                    research_dataset: Some(titled("Revised")),
                    ..Default::default()
                },
            )
            .unwrap();

        let fork = outcome.new_version.expect("expected a fork");
        assert_eq!(fork.state, RecordState::Draft);
        assert_eq!(fork.previous_version.as_deref(), Some(published.identifier.as_str()));
        assert_eq!(outcome.record.next_version.as_deref(), Some(fork.identifier.as_str()));
        // Pure metadata edit: the fork inherits the preferred identifier.
        assert_eq!(fork.preferred_identifier, published.preferred_identifier);
        assert_ne!(
            fork.metadata_version_identifier,
            published.metadata_version_identifier
        );
        // Both ends share the ordered version set.
        let set = fx.store.version_set(fork.dataset_version_set.unwrap()).unwrap();
        assert_eq!(
            set.records,
            vec![published.identifier.clone(), fork.identifier.clone()]
        );
    }

    #[test]
    fn fork_with_file_changes_forces_new_identifier() {
        let mut fx = Fixture::new();
        let draft = fx
            .service()
            .create(NewRecord {
                research_dataset: titled("Original"),
                ..NewRecord::draft("cat-att")
            })
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();

        let outcome = fx
            .service()
            .update(
                &published.identifier,
                RecordPatch {
                    file_directives: Some(FileDirectives {
                        directories: vec![],
                        files: vec![crate::binding::FileDirective::add("f1")],
                    }),
                    ..Default::default()
                },
            )
            .unwrap();

        let fork = outcome.new_version.unwrap();
        assert!(PidMinter::is_draft_identifier(&fork.preferred_identifier));
        assert_eq!(outcome.files_added, 1);
        assert_eq!(fx.store.bound_files(&fork.identifier).len(), 1);
        // The parent's own bindings are untouched.
        assert!(fx.store.bound_files(&published.identifier).is_empty());
    }

    #[test]
    fn preserve_version_updates_in_place() {
        let mut fx = Fixture::new();
        let draft = fx
            .service()
            .create(NewRecord {
                research_dataset: titled("Original"),
                ..NewRecord::draft("cat-att")
            })
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();

        let outcome = fx
            .service()
            .update(
                &published.identifier,
                RecordPatch {
                    research_dataset: Some(titled("Corrected typo")),
                    preserve_version: true,
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(outcome.new_version.is_none());
        assert_ne!(
            outcome.record.metadata_version_identifier,
            published.metadata_version_identifier
        );
        assert!(!outcome.record.has_next_version());
    }

    #[test]
    fn frozen_old_version_rejects_descriptive_edits_but_not_preservation() {
        let mut fx = Fixture::new();
        let draft = fx
            .service()
            .create(NewRecord {
                research_dataset: titled("Original"),
                ..NewRecord::draft("cat-att")
            })
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();
        fx.service().create_new_version(&published.identifier).unwrap();

        let err = fx
            .service()
            .update(
                &published.identifier,
                RecordPatch {
                    research_dataset: Some(titled("Too late")),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));

        // Operational preservation fields stay editable.
        let record = fx
            .service()
            .set_preservation_state(&published.identifier, 80)
            .unwrap();
        assert_eq!(record.preservation_state, 80);
    }

    #[test]
    fn second_fork_of_same_parent_is_rejected() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-att")).unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();
        fx.service().create_new_version(&published.identifier).unwrap();

        let err = fx.service().create_new_version(&published.identifier).unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn fork_drops_stale_file_references() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-att")).unwrap();
        fx.service()
            .apply_file_changes(
                &draft.identifier,
                &FileDirectives {
                    directories: vec![],
                    files: vec![
                        crate::binding::FileDirective::add("f1"),
                        crate::binding::FileDirective::add("f2"),
                    ],
                },
                UpdateMode::Full,
            )
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();

        // f2 disappears from storage; the dataset is deprecated.
        fx.store.mark_file_removed("f2", Utc::now()).unwrap();
        let count = fx
            .service()
            .deprecate_for_removed_files(&["f2".to_owned()])
            .unwrap();
        assert_eq!(count, 1);
        assert!(fx.store.record(&published.identifier).unwrap().deprecated);

        let fork = fx.service().create_new_version(&published.identifier).unwrap();
        let fork_bound = fx.store.bound_files(&fork.identifier);
        assert_eq!(fork_bound.len(), 1);
        assert!(fork_bound.contains("f1"));
        assert!(!fork.deprecated);
        assert_eq!(fork.research_dataset.total_files_byte_size, 100);
        // The old version still references both files.
        assert_eq!(fx.store.bound_files(&published.identifier).len(), 2);
    }

    #[test]
    fn deprecation_is_one_way_and_counted_once() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-ida")).unwrap();
        fx.service()
            .apply_file_changes(
                &draft.identifier,
                &FileDirectives {
                    directories: vec![],
                    files: vec![crate::binding::FileDirective::add("f1")],
                },
                UpdateMode::Full,
            )
            .unwrap();
        fx.service().publish(&draft.identifier, None).unwrap();

        fx.store.mark_file_removed("f1", Utc::now()).unwrap();
        assert_eq!(
            fx.service().deprecate_for_removed_files(&["f1".to_owned()]).unwrap(),
            1
        );
        // A second sweep finds nothing new to deprecate.
        assert_eq!(
            fx.service().deprecate_for_removed_files(&["f1".to_owned()]).unwrap(),
            0
        );
    }

    #[test]
    fn cumulative_lifecycle() {
        let mut fx = Fixture::new();
        let draft = fx
            .service()
            .create(NewRecord {
                cumulative_state: CumulativeState::Yes,
                ..NewRecord::draft("cat-ida")
            })
            .unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();
        assert!(published.date_cumulation_started.is_some());

        // Closing is allowed, reopening is not.
        let closed = fx.service().close_cumulative(&published.identifier).unwrap();
        assert_eq!(closed.cumulative_state, CumulativeState::Closed);
        let err = fx
            .service()
            .update(
                &published.identifier,
                RecordPatch {
                    cumulative_state: Some(CumulativeState::Yes),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn cumulation_cannot_start_on_published_dataset() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-ida")).unwrap();
        fx.service().publish(&draft.identifier, None).unwrap();

        let err = fx
            .service()
            .update(
                &draft.identifier,
                RecordPatch {
                    cumulative_state: Some(CumulativeState::Yes),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, CatalogError::Validation(_)));
    }

    #[test]
    fn remove_soft_deletes_and_emits_event() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-ida")).unwrap();
        let published = fx.service().publish(&draft.identifier, None).unwrap();
        let events_before = fx.store.outbox_len();

        fx.service().remove(&published.identifier).unwrap();
        assert!(fx.store.record(&published.identifier).is_err());
        assert!(fx.store.record_any(&published.identifier).is_some());
        assert_eq!(fx.store.outbox_len(), events_before + 1);
    }

    #[test]
    fn legacy_remove_hard_deletes() {
        let mut fx = Fixture::new();
        let draft = fx.service().create(NewRecord::draft("cat-legacy")).unwrap();
        fx.service()
            .update(
                &draft.identifier,
                RecordPatch {
                    preferred_identifier: Some("hdl:10138/x".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        fx.service().publish(&draft.identifier, None).unwrap();

        fx.service().remove(&draft.identifier).unwrap();
        assert!(fx.store.record_any(&draft.identifier).is_none());
    }

    #[test]
    fn harvested_create_keeps_supplied_identifier() {
        let mut fx = Fixture::new();
        let record = fx
            .service()
            .create(NewRecord {
                state: RecordState::Published,
                preferred_identifier: Some("oai:source:123".into()),
                ..NewRecord::draft("cat-harvest")
            })
            .unwrap();
        assert_eq!(record.preferred_identifier, "oai:source:123");
        assert!(record.is_published());
    }
}

//! Bulk create/update with per-row isolation.
//!
//! Each row runs inside its own store savepoint: a failing row is rolled
//! back and reported in the `failed` list with its error detail, while
//! prior and subsequent rows are unaffected. The overall result counts as
//! a success if at least one row succeeded. Invariant violations are the
//! exception: corrupted state aborts the whole batch.

use crate::changeset::RecordPatch;
use crate::config::CoreConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::record::{CatalogRecord, NewRecord};
use crate::store::CatalogStore;
use crate::versioning::DatasetService;
use chrono::{DateTime, Utc};
use rdc_pid::PidMinter;

/// One update row: the record it targets, the patch, and, when the
/// optimistic-concurrency precondition is in force, the caller's
/// last-known modification timestamp.
#[derive(Debug, Clone)]
pub struct BulkUpdateRow {
    pub identifier: String,
    pub patch: RecordPatch,
    /// Compared against the stored record when the concurrency check is
    /// enabled; a mismatch fails this row only.
    pub last_modified: Option<DateTime<Utc>>,
}

/// A failed row: its position in the input, the record it concerned (when
/// known), and the error.
#[derive(Debug)]
pub struct BulkRowFailure {
    pub index: usize,
    pub identifier: Option<String>,
    pub error: CatalogError,
}

/// The per-row results of a bulk operation.
#[derive(Debug, Default)]
pub struct BulkOutcome {
    pub success: Vec<CatalogRecord>,
    pub failed: Vec<BulkRowFailure>,
}

impl BulkOutcome {
    /// Success means at least one row succeeded; only an all-failed batch
    /// counts as failure.
    pub fn overall_success(&self) -> bool {
        !self.success.is_empty() || self.failed.is_empty()
    }
}

/// Creates every row, isolating failures per row.
///
/// # Errors
///
/// Returns an error only for invariant violations, which abort the whole
/// batch; every row-scoped failure lands in the outcome's `failed` list.
pub fn bulk_create(
    store: &mut CatalogStore,
    config: &CoreConfig,
    pids: &PidMinter,
    rows: Vec<NewRecord>,
) -> CatalogResult<BulkOutcome> {
    let mut outcome = BulkOutcome::default();

    for (index, row) in rows.into_iter().enumerate() {
        let savepoint = store.savepoint();
        let result = DatasetService::new(store, config, pids).create(row);
        match result {
            Ok(record) => outcome.success.push(record),
            Err(error) if error.is_row_scoped() => {
                store.rollback_to(savepoint);
                tracing::debug!(index, %error, "bulk create row failed");
                outcome.failed.push(BulkRowFailure {
                    index,
                    identifier: None,
                    error,
                });
            }
            Err(fatal) => {
                store.rollback_to(savepoint);
                return Err(fatal);
            }
        }
    }

    Ok(outcome)
}

/// Updates every row, isolating failures per row.
///
/// With `concurrency_check` enabled, each row must carry its last-known
/// modification timestamp; a missing timestamp fails the row as a
/// validation error and a mismatch against the stored record fails it as a
/// distinguishable conflict.
///
/// # Errors
///
/// Returns an error only for invariant violations, which abort the whole
/// batch.
pub fn bulk_update(
    store: &mut CatalogStore,
    config: &CoreConfig,
    pids: &PidMinter,
    rows: Vec<BulkUpdateRow>,
    concurrency_check: bool,
) -> CatalogResult<BulkOutcome> {
    let mut outcome = BulkOutcome::default();

    for (index, row) in rows.into_iter().enumerate() {
        let savepoint = store.savepoint();
        let result = apply_update_row(store, config, pids, &row, concurrency_check);
        match result {
            Ok(record) => outcome.success.push(record),
            Err(error) if error.is_row_scoped() => {
                store.rollback_to(savepoint);
                tracing::debug!(index, record = %row.identifier, %error, "bulk update row failed");
                outcome.failed.push(BulkRowFailure {
                    index,
                    identifier: Some(row.identifier.clone()),
                    error,
                });
            }
            Err(fatal) => {
                store.rollback_to(savepoint);
                return Err(fatal);
            }
        }
    }

    Ok(outcome)
}

fn apply_update_row(
    store: &mut CatalogStore,
    config: &CoreConfig,
    pids: &PidMinter,
    row: &BulkUpdateRow,
    concurrency_check: bool,
) -> CatalogResult<CatalogRecord> {
    if concurrency_check {
        let Some(expected) = row.last_modified else {
            return Err(CatalogError::validation(
                "date_modified",
                "the concurrency precondition requires each row to carry its \
                 last-known modification timestamp",
            ));
        };
        let stored = store.record(&row.identifier)?.modification_stamp();
        if stored != expected {
            return Err(CatalogError::Conflict(format!(
                "record '{}' was modified at {}, client expected {}",
                row.identifier, stored, expected
            )));
        }
    }

    let outcome = DatasetService::new(store, config, pids).update(&row.identifier, row.patch.clone())?;
    Ok(outcome.record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataCatalog;
    use crate::record::{CumulativeState, RecordState, ResearchDataset};
    use rdc_pid::SequenceUuidSource;
    use serde_json::json;

    struct Fixture {
        store: CatalogStore,
        config: CoreConfig,
        pids: PidMinter,
    }

    impl Fixture {
        fn new() -> Self {
            let config = CoreConfig::new("fi", "23729", vec![]).unwrap();
            let pids = config
                .minter_with_source(Box::new(SequenceUuidSource::default()))
                .unwrap();
            let mut store = CatalogStore::new();
            store
                .insert_catalog(DataCatalog {
                    identifier: "cat-ida".into(),
                    title: None,
                    dataset_versioning: false,
                    harvested: false,
                    doi_enabled: false,
                })
                .unwrap();
            Self { store, config, pids }
        }

        fn published(&mut self, title: &str) -> CatalogRecord {
            DatasetService::new(&mut self.store, &self.config, &self.pids)
                .create(NewRecord {
                    state: RecordState::Published,
                    research_dataset: ResearchDataset {
                        title: Some(json!({ "en": title })),
                        ..Default::default()
                    },
                    ..NewRecord::draft("cat-ida")
                })
                .unwrap()
        }
    }

    fn draft_row(catalog: &str) -> NewRecord {
        NewRecord::draft(catalog)
    }

    #[test]
    fn partial_failure_keeps_successful_rows() {
        let mut fx = Fixture::new();
        let rows = vec![
            draft_row("cat-ida"),
            draft_row("cat-missing"), // unknown catalog: this row fails
            draft_row("cat-ida"),
        ];
        let outcome = bulk_create(&mut fx.store, &fx.config, &fx.pids, rows).unwrap();

        assert_eq!(outcome.success.len(), 2);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].index, 1);
        assert!(outcome.overall_success());

        // Both successful rows actually persisted.
        for record in &outcome.success {
            assert!(fx.store.record(&record.identifier).is_ok());
        }
    }

    #[test]
    fn all_rows_failing_is_overall_failure() {
        let mut fx = Fixture::new();
        let rows = vec![draft_row("cat-missing"), draft_row("cat-missing")];
        let outcome = bulk_create(&mut fx.store, &fx.config, &fx.pids, rows).unwrap();
        assert!(outcome.success.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(!outcome.overall_success());
    }

    #[test]
    fn empty_batch_is_vacuously_successful() {
        let mut fx = Fixture::new();
        let outcome = bulk_create(&mut fx.store, &fx.config, &fx.pids, vec![]).unwrap();
        assert!(outcome.overall_success());
    }

    #[test]
    fn failed_row_rolls_back_its_own_writes_only() {
        let mut fx = Fixture::new();
        let existing = fx.published("Existing");

        // Row 1 succeeds, row 2 targets a record that does not exist.
        let rows = vec![
            BulkUpdateRow {
                identifier: existing.identifier.clone(),
                patch: RecordPatch {
                    research_dataset: Some(ResearchDataset {
                        title: Some(json!({"en": "Renamed"})),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                last_modified: None,
            },
            BulkUpdateRow {
                identifier: "missing".into(),
                patch: RecordPatch::default(),
                last_modified: None,
            },
        ];
        let outcome = bulk_update(&mut fx.store, &fx.config, &fx.pids, rows, false).unwrap();

        assert_eq!(outcome.success.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].identifier.as_deref(), Some("missing"));
        let stored = fx.store.record(&existing.identifier).unwrap();
        assert_eq!(
            stored.research_dataset.title.as_ref().unwrap()["en"],
            "Renamed"
        );
    }

    #[test]
    fn concurrency_mismatch_fails_only_that_row_with_conflict() {
        let mut fx = Fixture::new();
        let first = fx.published("First");
        let second = fx.published("Second");

        let stale = first.modification_stamp() - chrono::Duration::seconds(60);
        let rows = vec![
            BulkUpdateRow {
                identifier: first.identifier.clone(),
                patch: RecordPatch::default(),
                last_modified: Some(stale),
            },
            BulkUpdateRow {
                identifier: second.identifier.clone(),
                patch: RecordPatch::default(),
                last_modified: Some(second.modification_stamp()),
            },
        ];
        let outcome = bulk_update(&mut fx.store, &fx.config, &fx.pids, rows, true).unwrap();

        assert_eq!(outcome.success.len(), 1);
        assert_eq!(outcome.failed.len(), 1);
        assert!(matches!(outcome.failed[0].error, CatalogError::Conflict(_)));
        assert!(outcome.overall_success());
    }

    #[test]
    fn concurrency_check_requires_timestamp_on_every_row() {
        let mut fx = Fixture::new();
        let record = fx.published("Only");

        let rows = vec![BulkUpdateRow {
            identifier: record.identifier.clone(),
            patch: RecordPatch::default(),
            last_modified: None,
        }];
        let outcome = bulk_update(&mut fx.store, &fx.config, &fx.pids, rows, true).unwrap();
        assert!(matches!(
            outcome.failed[0].error,
            CatalogError::Validation(_)
        ));
    }

    #[test]
    fn cumulative_rows_cannot_be_created_closed() {
        let mut fx = Fixture::new();
        let mut row = draft_row("cat-ida");
        row.cumulative_state = CumulativeState::Closed;
        let outcome = bulk_create(&mut fx.store, &fx.config, &fx.pids, vec![row]).unwrap();
        assert!(!outcome.overall_success());
        assert!(matches!(
            outcome.failed[0].error,
            CatalogError::Validation(_)
        ));
    }
}

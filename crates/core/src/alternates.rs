//! Cross-catalog duplicate-identifier grouping.
//!
//! When the same preferred identifier appears in more than one catalog, the
//! records are duplicate ingestions of one logical dataset and are grouped
//! into an alternate record set. The set is pure derived state: it is
//! created when the second duplicate appears, grows and merges as further
//! duplicates appear, and dissolves as soon as membership would drop to
//! one; a set of one is meaningless and never persists.

use crate::error::CatalogResult;
use crate::store::CatalogStore;
use rdc_pid::PidMinter;
use std::collections::BTreeSet;

/// Re-groups a record after its preferred identifier was written.
///
/// Finds every unremoved record in a *different* catalog carrying the same
/// preferred identifier, then:
/// - if no duplicate exists, does nothing;
/// - if neither side belongs to a set, creates one containing all of them;
/// - if exactly one set is involved, adds the newcomers to it;
/// - if several sets are involved, merges them into one.
///
/// Draft placeholders never group: they are unique by construction.
///
/// # Errors
///
/// Propagates store failures; invariant errors if set bookkeeping is
/// corrupted.
pub fn sync_after_save(store: &mut CatalogStore, record_identifier: &str) -> CatalogResult<()> {
    let record = store.record(record_identifier)?.clone();

    if record.preferred_identifier.trim().is_empty()
        || PidMinter::is_draft_identifier(&record.preferred_identifier)
    {
        return Ok(());
    }

    let duplicates: Vec<String> = store
        .records_with_preferred_identifier(&record.preferred_identifier)
        .into_iter()
        .filter(|r| r.identifier != record.identifier && r.data_catalog != record.data_catalog)
        .map(|r| r.identifier.clone())
        .collect();

    if duplicates.is_empty() {
        return Ok(());
    }

    // Collect every set already involved, across the record and its
    // duplicates.
    let mut involved_sets: BTreeSet<u64> = BTreeSet::new();
    let mut members: BTreeSet<String> = BTreeSet::new();
    members.insert(record.identifier.clone());
    for identifier in &duplicates {
        members.insert(identifier.clone());
    }
    for identifier in members.clone() {
        if let Some(set_id) = store
            .record_any(&identifier)
            .and_then(|r| r.alternate_record_set)
        {
            involved_sets.insert(set_id);
        }
    }
    for set_id in &involved_sets {
        if let Some(set) = store.alternate_set(*set_id) {
            members.extend(set.members.iter().cloned());
        }
    }

    let target_set = match involved_sets.iter().next().copied() {
        // Merge everything into the lowest-numbered set.
        Some(first) => {
            store.update_alternate_set(first, members.clone())?;
            for obsolete in involved_sets.iter().skip(1) {
                store.delete_alternate_set(*obsolete);
            }
            first
        }
        None => store.create_alternate_set(members.clone())?,
    };

    for identifier in &members {
        if let Some(member) = store.record_any(identifier) {
            let mut member = member.clone();
            member.alternate_record_set = Some(target_set);
            store.put_record(member)?;
        }
    }

    tracing::debug!(
        record = %record.identifier,
        set = target_set,
        members = members.len(),
        "alternate record set synchronised"
    );

    Ok(())
}

/// Removes a record from its alternate record set, dissolving the set if
/// only one member would remain.
///
/// Called on delete and on any versioning update that changes the record's
/// own preferred identifier.
///
/// # Errors
///
/// Propagates store failures.
pub fn remove_from_set(store: &mut CatalogStore, record_identifier: &str) -> CatalogResult<()> {
    let Some(record) = store.record_any(record_identifier) else {
        return Ok(());
    };
    let Some(set_id) = record.alternate_record_set else {
        return Ok(());
    };

    let mut remaining = match store.alternate_set(set_id) {
        Some(set) => set.members.clone(),
        None => BTreeSet::new(),
    };
    remaining.remove(record_identifier);

    if remaining.len() <= 1 {
        // A set of one is meaningless: dissolve it and detach the last
        // member too.
        store.delete_alternate_set(set_id);
        for identifier in remaining {
            if let Some(member) = store.record_any(&identifier) {
                let mut member = member.clone();
                member.alternate_record_set = None;
                store.put_record(member)?;
            }
        }
        tracing::debug!(set = set_id, "alternate record set dissolved");
    } else {
        store.update_alternate_set(set_id, remaining)?;
    }

    let mut record = store
        .record_any(record_identifier)
        .cloned()
        .expect("record existence checked above");
    record.alternate_record_set = None;
    store.put_record(record)?;

    Ok(())
}

/// The "alternate records" view for one record: every *other* member of its
/// set, sorted. The record's own identifier never appears.
pub fn alternate_records(store: &CatalogStore, record_identifier: &str) -> Vec<String> {
    let Some(set_id) = store
        .record_any(record_identifier)
        .and_then(|r| r.alternate_record_set)
    else {
        return Vec::new();
    };
    let Some(set) = store.alternate_set(set_id) else {
        return Vec::new();
    };
    set.members
        .iter()
        .filter(|m| m.as_str() != record_identifier)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataCatalog;
    use crate::record::{ApiRevision, CatalogRecord, CumulativeState, RecordState, ResearchDataset};
    use chrono::Utc;

    fn store_with_catalogs() -> CatalogStore {
        let mut store = CatalogStore::new();
        for identifier in ["cat-1", "cat-2", "cat-3"] {
            store
                .insert_catalog(DataCatalog {
                    identifier: identifier.into(),
                    title: None,
                    dataset_versioning: false,
                    harvested: false,
                    doi_enabled: false,
                })
                .unwrap();
        }
        store
    }

    fn seed(store: &mut CatalogStore, identifier: &str, catalog: &str, preferred: &str) {
        let record = CatalogRecord {
            identifier: identifier.into(),
            preferred_identifier: preferred.into(),
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
        };
        store.insert_record(record).unwrap();
    }

    #[test]
    fn second_duplicate_creates_a_set_listing_only_the_other() {
        let mut store = store_with_catalogs();
        seed(&mut store, "r1", "cat-1", "pid-x");
        seed(&mut store, "r2", "cat-2", "pid-x");

        sync_after_save(&mut store, "r2").unwrap();

        let set_1 = store.record_any("r1").unwrap().alternate_record_set;
        let set_2 = store.record_any("r2").unwrap().alternate_record_set;
        assert!(set_1.is_some());
        assert_eq!(set_1, set_2);

        assert_eq!(alternate_records(&store, "r1"), vec!["r2".to_owned()]);
        assert_eq!(alternate_records(&store, "r2"), vec!["r1".to_owned()]);
    }

    #[test]
    fn third_duplicate_joins_the_existing_set() {
        let mut store = store_with_catalogs();
        seed(&mut store, "r1", "cat-1", "pid-x");
        seed(&mut store, "r2", "cat-2", "pid-x");
        sync_after_save(&mut store, "r2").unwrap();

        seed(&mut store, "r3", "cat-3", "pid-x");
        sync_after_save(&mut store, "r3").unwrap();

        let set_id = store.record_any("r1").unwrap().alternate_record_set.unwrap();
        assert_eq!(store.alternate_set(set_id).unwrap().members.len(), 3);
        assert_eq!(
            alternate_records(&store, "r2"),
            vec!["r1".to_owned(), "r3".to_owned()]
        );
    }

    #[test]
    fn distinct_sets_merge_when_bridged() {
        let mut store = store_with_catalogs();
        // Two independent duplicate pairs on different identifiers.
        seed(&mut store, "r1", "cat-1", "pid-x");
        seed(&mut store, "r2", "cat-2", "pid-x");
        sync_after_save(&mut store, "r2").unwrap();
        seed(&mut store, "r3", "cat-1", "pid-y");
        seed(&mut store, "r4", "cat-2", "pid-y");
        sync_after_save(&mut store, "r4").unwrap();

        // r3 changes its identifier to pid-x, bridging the two sets.
        let mut r3 = store.record_any("r3").unwrap().clone();
        r3.preferred_identifier = "pid-x".into();
        store.put_record(r3).unwrap();
        sync_after_save(&mut store, "r3").unwrap();

        let set_id = store.record_any("r1").unwrap().alternate_record_set.unwrap();
        let members = &store.alternate_set(set_id).unwrap().members;
        assert!(members.contains("r3"));
        assert_eq!(store.record_any("r3").unwrap().alternate_record_set, Some(set_id));
    }

    #[test]
    fn dropping_to_one_member_dissolves_the_set() {
        let mut store = store_with_catalogs();
        seed(&mut store, "r1", "cat-1", "pid-x");
        seed(&mut store, "r2", "cat-2", "pid-x");
        sync_after_save(&mut store, "r2").unwrap();
        let set_id = store.record_any("r1").unwrap().alternate_record_set.unwrap();

        remove_from_set(&mut store, "r2").unwrap();

        assert!(store.alternate_set(set_id).is_none());
        assert_eq!(store.record_any("r1").unwrap().alternate_record_set, None);
        assert_eq!(store.record_any("r2").unwrap().alternate_record_set, None);
        assert!(alternate_records(&store, "r1").is_empty());
    }

    #[test]
    fn three_member_set_survives_one_removal() {
        let mut store = store_with_catalogs();
        seed(&mut store, "r1", "cat-1", "pid-x");
        seed(&mut store, "r2", "cat-2", "pid-x");
        seed(&mut store, "r3", "cat-3", "pid-x");
        sync_after_save(&mut store, "r2").unwrap();
        sync_after_save(&mut store, "r3").unwrap();

        remove_from_set(&mut store, "r1").unwrap();

        let set_id = store.record_any("r2").unwrap().alternate_record_set.unwrap();
        assert_eq!(store.alternate_set(set_id).unwrap().members.len(), 2);
        assert_eq!(alternate_records(&store, "r2"), vec!["r3".to_owned()]);
    }

    #[test]
    fn same_catalog_duplicates_do_not_group() {
        let mut store = store_with_catalogs();
        seed(&mut store, "r1", "cat-1", "pid-x");
        seed(&mut store, "r2", "cat-1", "pid-x");

        sync_after_save(&mut store, "r2").unwrap();
        assert_eq!(store.record_any("r1").unwrap().alternate_record_set, None);
        assert_eq!(store.record_any("r2").unwrap().alternate_record_set, None);
    }

    #[test]
    fn draft_placeholders_never_group() {
        let mut store = store_with_catalogs();
        seed(&mut store, "r1", "cat-1", "draft:r1");
        seed(&mut store, "r2", "cat-2", "draft:r1");

        sync_after_save(&mut store, "r2").unwrap();
        assert_eq!(store.record_any("r2").unwrap().alternate_record_set, None);
    }
}

//! Preferred-identifier uniqueness rules.
//!
//! Whether a candidate preferred identifier may be written depends on the
//! kind of the target catalog:
//!
//! 1. A candidate must never collide with another record's metadata version
//!    identifier, in any catalog, of any kind. Always rejected.
//! 2. Non-versioning catalogs: the candidate must be unique within the
//!    target catalog (ignoring the record being updated itself). The same
//!    identifier appearing in a *different* catalog is legal; that is how
//!    alternate record sets arise.
//! 3. The versioning catalog: collisions inside the catalog itself are
//!    other versions of the same dataset and are permitted; collisions with
//!    any record in any *other* catalog are rejected.
//! 4. Legacy catalogs skip the uniqueness rules entirely, but require a
//!    non-empty externally supplied identifier.
//!
//! The three rejection reasons stay distinguishable strings so API
//! consumers can tell them apart.

use crate::config::CoreConfig;
use crate::error::{CatalogError, CatalogResult};
use crate::store::CatalogStore;

/// Field path reported for every preferred-identifier failure.
pub const PREFERRED_IDENTIFIER_FIELD: &str = "research_dataset.preferred_identifier";

/// Validates that `candidate` may be written as the preferred identifier of
/// a record in `catalog_identifier`.
///
/// `exclude_record` is the record being updated, ignored in every lookup.
///
/// # Errors
///
/// - `NotFound` if the catalog does not exist.
/// - `Validation` with a field path and one of three distinguishable
///   reasons: collision with a metadata version identifier, collision
///   within the same catalog, or collision with another catalog.
pub fn validate_preferred_identifier(
    store: &CatalogStore,
    config: &CoreConfig,
    candidate: &str,
    catalog_identifier: &str,
    exclude_record: Option<&str>,
) -> CatalogResult<()> {
    let catalog = store.catalog(catalog_identifier)?;
    let kind = catalog.kind(config);
    let policy = kind.pid_policy();

    if candidate.trim().is_empty() {
        if policy.requires_supplied_pid {
            return Err(CatalogError::validation(
                PREFERRED_IDENTIFIER_FIELD,
                format!(
                    "an externally supplied preferred identifier is required in a {}",
                    kind.display_name()
                ),
            ));
        }
        return Ok(());
    }

    // Collisions with server-generated internal identifiers are rejected
    // for every catalog kind, legacy included.
    if store.metadata_version_identifier_taken(candidate, exclude_record) {
        return Err(CatalogError::validation(
            PREFERRED_IDENTIFIER_FIELD,
            "preferred identifier matches the metadata version identifier of another record",
        ));
    }

    if !policy.enforce_uniqueness {
        return Ok(());
    }

    let collisions: Vec<_> = store
        .records_with_preferred_identifier(candidate)
        .into_iter()
        .filter(|r| exclude_record != Some(r.identifier.as_str()))
        .collect();

    if policy.same_catalog_collisions_allowed {
        // Versioning catalog: same-catalog collisions are other versions of
        // this dataset, only cross-catalog ones are rejected.
        if collisions
            .iter()
            .any(|r| r.data_catalog != catalog_identifier)
        {
            return Err(CatalogError::validation(
                PREFERRED_IDENTIFIER_FIELD,
                "preferred identifier already exists in another catalog",
            ));
        }
    } else if collisions
        .iter()
        .any(|r| r.data_catalog == catalog_identifier)
    {
        return Err(CatalogError::validation(
            PREFERRED_IDENTIFIER_FIELD,
            "preferred identifier already exists in this catalog",
        ));
    }

    Ok(())
}

//! # RDC Core
//!
//! Core business logic for the research dataset catalog: the dataset–file
//! binding and versioning engine.
//!
//! This crate contains pure data operations over a request-scoped store:
//! - Catalog record lifecycle: draft, publish, in-place update, new-version
//!   forking, soft delete, cumulation and preservation workflow
//! - File-set binding: resolving directory/file add and exclude directives
//!   into a concrete bound file set with per-entry metadata reconciliation
//! - Identifier rules: preferred-identifier uniqueness per catalog kind and
//!   cross-catalog alternate record set grouping
//! - Bulk create/update with per-row savepoint isolation and optimistic
//!   concurrency
//! - A transactional notification outbox drained through the message-bus
//!   collaborator
//!
//! **No API concerns**: HTTP routing, authentication, JSON-schema document
//! validation and reference-data population belong to the surrounding
//! services, not here. Collaborators are consumed through narrow traits and
//! explicit arguments; nothing reads ambient request state.

pub mod alternates;
pub mod binding;
pub mod bulk;
pub mod catalog;
pub mod changeset;
pub mod config;
pub mod error;
pub mod notify;
pub mod record;
pub mod store;
pub mod uniqueness;
pub mod versioning;

pub use binding::{
    apply_file_changes, DirectoryDirective, FileChangeOutcome, FileDirective, FileDirectives,
    UpdateMode,
};
pub use bulk::{bulk_create, bulk_update, BulkOutcome, BulkRowFailure, BulkUpdateRow};
pub use catalog::{CatalogKind, DataCatalog, PidPolicy};
pub use changeset::{ChangeSet, RecordPatch};
pub use config::CoreConfig;
pub use error::{CatalogError, CatalogResult, FieldError};
pub use notify::{drain_outbox, Notifier, NotifyError, OutboxEntry, RecordEvent};
pub use record::{
    ApiRevision, CatalogRecord, CumulativeState, DirectoryEntry, FileEntry, NewRecord,
    RecordState, ResearchDataset,
};
pub use store::{AlternateRecordSet, CatalogStore, DatasetVersionSet, Savepoint};
pub use uniqueness::validate_preferred_identifier;
pub use versioning::{DatasetService, UpdateOutcome};

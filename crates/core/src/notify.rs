//! Outbound notifications through a transactional outbox.
//!
//! On publish, update and delete the engine appends an envelope to the
//! store's outbox *inside the same savepoint as the local mutation*: if the
//! row rolls back, so does its event. After commit the caller drains the
//! outbox through a [`Notifier`]; a delivery failure surfaces as a
//! `Dependency` error to the triggering request, but the envelope stays
//! queued for redelivery, so local state and the event log never diverge.

use crate::error::{CatalogError, CatalogResult};
use crate::record::CatalogRecord;
use crate::store::CatalogStore;
use serde::{Deserialize, Serialize};

/// What happened to a record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordEvent {
    Created,
    Updated,
    Deleted,
}

impl RecordEvent {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for RecordEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued notification: the event type plus a snapshot of the record
/// as it looked when the event happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEntry {
    /// Monotonic sequence number within the store
    pub id: u64,
    /// What happened
    pub event: RecordEvent,
    /// The record the event concerns
    pub record_identifier: String,
    /// Snapshot of the record at event time
    pub payload: serde_json::Value,
}

impl OutboxEntry {
    /// Builds an envelope snapshotting the given record.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be snapshotted.
    pub fn snapshot(id: u64, event: RecordEvent, record: &CatalogRecord) -> CatalogResult<Self> {
        Ok(Self {
            id,
            event,
            record_identifier: record.identifier.clone(),
            payload: serde_json::to_value(record)?,
        })
    }
}

/// The message-bus collaborator.
///
/// Delivery is at-least-once: the engine only dequeues an envelope after
/// `deliver` returns `Ok`.
pub trait Notifier {
    /// Delivers one envelope.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if the bus is unavailable; the envelope
    /// remains queued.
    fn deliver(&self, entry: &OutboxEntry) -> Result<(), NotifyError>;
}

/// The notification bus rejected or never received an envelope.
#[derive(Debug, thiserror::Error)]
#[error("notification bus unavailable: {0}")]
pub struct NotifyError(pub String);

/// Drains the outbox in order, stopping at the first failed delivery.
///
/// Returns the number of envelopes delivered.
///
/// # Errors
///
/// Returns [`CatalogError::Dependency`] if a delivery fails. Envelopes not
/// yet delivered (including the failed one) stay queued.
pub fn drain_outbox(store: &mut CatalogStore, notifier: &dyn Notifier) -> CatalogResult<usize> {
    let mut delivered = 0;
    while let Some(entry) = store.peek_outbox() {
        if let Err(err) = notifier.deliver(entry) {
            tracing::warn!(
                entry = entry.id,
                event = %entry.event,
                record = %entry.record_identifier,
                "notification delivery failed, leaving envelope queued"
            );
            return Err(CatalogError::Dependency(err.to_string()));
        }
        store.pop_outbox();
        delivered += 1;
    }
    Ok(delivered)
}

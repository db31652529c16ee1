//! Persistent-identifier minting and validation.
//!
//! Every server-generated identifier in the catalog flows through this crate:
//!
//! - **Record identifiers**: each catalog record gets a canonical UUID.
//! - **Preferred identifiers**: the externally visible PID of a published
//!   dataset, minted as a URN or a DOI depending on catalog policy.
//! - **Metadata version identifiers**: an opaque URN that changes every time
//!   a dataset's descriptive metadata changes.
//! - **Draft placeholders**: `draft:<record identifier>`, carried by an
//!   unpublished record until it is independently published.
//!
//! To keep identifier derivation deterministic and consistent across the
//! codebase, the catalog uses a *canonical* UUID representation for record
//! identifiers: **32 lowercase hexadecimal characters** (no hyphens).
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Notes:
//! - This is the same value you would get from
//!   `Uuid::new_v4().simple().to_string()`.
//! - Canonical form is *required* for externally supplied record
//!   identifiers. Use [`CanonicalUuid::parse`] to validate an input string.
//! - Non-canonical values (uppercase, hyphenated, wrong length, non-hex)
//!   are rejected.
//!
//! ## Determinism in tests
//!
//! [`PidMinter`] draws raw UUIDs from a [`UuidSource`]; production code uses
//! [`RandomUuidSource`], tests inject [`SequenceUuidSource`] so minted
//! identifiers are stable across runs.

mod minter;

pub use minter::{
    CanonicalUuid, PidMinter, PidType, RandomUuidSource, SequenceUuidSource, UuidSource,
};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum PidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// The requested identifier type is not recognised
    #[error("Unknown identifier type: {0}")]
    UnknownPidType(String),
}

/// Result type for identifier operations.
pub type PidResult<T> = Result<T, PidError>;

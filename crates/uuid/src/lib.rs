//! Record identifiers and sharded-path utilities.
//!
//! Every triage record (assessment, queue entry, protocol, patient and department references)
//! is identified by a UUID held in a *canonical* representation: **32 lowercase hexadecimal
//! characters** (no hyphens).
//!
//! This crate provides:
//! - [`RecordId`], a wrapper that guarantees the canonical format once constructed.
//! - [`TimestampId`], a time-prefixed identifier generated monotonically so that identifier
//!   order matches chronological order within one parent record.
//! - Shared sharding logic used by the on-disk journal.
//!
//! ## Canonical UUID form
//! - Length: 32
//! - Characters: `0-9` and `a-f` only
//! - Example: `550e8400e29b41d4a716446655440000`
//!
//! Non-canonical values (uppercase, hyphenated, wrong length, non-hex) are rejected by
//! [`RecordId::parse`].
//!
//! ## Sharded directory layout
//! For a canonical UUID `u`, records live under `parent_dir/<u[0..2]>/<u[2..4]>/<u>/`, which
//! keeps directory fan-out small.

mod service;

pub use service::{RecordId, TimestampId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;

//! Record identifiers for the lab workflow.
//!
//! Every sample and analysis process is keyed by a [`RecordId`]: a UUID held in a *canonical*
//! text form of **32 lowercase hexadecimal characters** (no hyphens).
//!
//! - [`RecordId::new`] allocates a fresh identifier (UUID v4).
//! - [`RecordId::parse`] validates an identifier supplied from outside the core (CLI
//!   arguments, REST paths). Non-canonical values (uppercase, hyphenated, wrong length,
//!   non-hex) are rejected rather than normalised, so a record has exactly one spelling.
//!
//! Example: `550e8400e29b41d4a716446655440000`

mod record_id;

pub use record_id::{RecordId, Uuid};

/// Error type for identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type UuidResult<T> = Result<T, UuidError>;

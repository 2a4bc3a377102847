//! Unified error type.
//!
//! Every fallible operation in the crate returns [`DbError`]; driver errors
//! are forwarded untouched, never retried and never upgraded to a panic.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the crate.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// The database could not be opened. Whether to abort or retry is the
    /// caller's decision; nothing in this crate reconnects.
    #[error("could not open database at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        source: rusqlite::Error,
    },

    /// Statement preparation or execution failure reported by the driver.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A text or blob payload in the named column was not valid UTF-8, so
    /// the row could not be materialized.
    #[error("column `{column}` holds a non-UTF-8 payload")]
    Decode { column: String },
}

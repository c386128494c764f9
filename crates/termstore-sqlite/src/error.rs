//! Error type for `termstore-sqlite`.

use termstore_core::term::TermType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] termstore_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("batch size must be at least 1, got {0}")]
  InvalidBatchSize(usize),

  #[error("unknown type id: {0}")]
  UnknownTypeId(i64),

  #[error("no type id registered for {0}")]
  MissingTypeId(TermType),

  /// Rows were inserted but could not be read back, e.g. because another
  /// process deleted them in between.
  #[error("{missing} {table} rows missing after insert")]
  Incomplete {
    table:   &'static str,
    missing: usize,
  },

  /// New rows would point at parent rows the primary no longer has, read
  /// from a replica that has not caught up with a cleanup.
  #[error("{table} rows {ids:?} are missing on the primary")]
  MissingParent {
    table: &'static str,
    ids:   Vec<i64>,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

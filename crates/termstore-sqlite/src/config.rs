//! Store configuration, deserialised from the binary's config file.

use std::path::PathBuf;

use serde::Deserialize;

fn default_batch_size() -> usize { 100 }

/// Where the database lives and how it is read.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
  /// Primary database file; all writes go here.
  pub path:         PathBuf,
  /// Read-only replica for lag-tolerant reads. Defaults to the primary.
  #[serde(default)]
  pub replica_path: Option<PathBuf>,
  /// Rows per statement for batched lookups, inserts and deletes.
  #[serde(default = "default_batch_size")]
  pub batch_size:   usize,
}

impl StoreConfig {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), replica_path: None, batch_size: default_batch_size() }
  }
}

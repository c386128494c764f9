//! The primary/replica pair every component reads and writes through.

use std::path::Path;

use rusqlite::{OpenFlags, Transaction, TransactionBehavior};
use tokio_rusqlite::Connection;

use crate::{Result, schema::SCHEMA};

/// A primary connection for writes and consistent reads, plus a replica for
/// reads that tolerate lag.
///
/// With a single database both handles point at the same connection.
/// Cloning is cheap; the inner connections are reference-counted.
#[derive(Clone)]
pub struct Connections {
  primary: Connection,
  replica: Connection,
}

impl Connections {
  /// Open (or create) the primary at `path` and run schema initialisation.
  /// `replica_path`, if given, is opened read-only.
  pub async fn open(path: impl AsRef<Path>, replica_path: Option<&Path>) -> Result<Self> {
    let primary = Connection::open(path).await?;
    let replica = match replica_path {
      Some(replica_path) => {
        Connection::open_with_flags(
          replica_path,
          OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .await?
      }
      None => primary.clone(),
    };
    let conns = Self { primary, replica };
    conns.init_schema().await?;
    Ok(conns)
  }

  /// A single in-memory database serving as both primary and replica,
  /// useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let primary = Connection::open_in_memory().await?;
    let conns = Self { replica: primary.clone(), primary };
    conns.init_schema().await?;
    Ok(conns)
  }

  /// Pair two already-open connections. The schema is initialised on the
  /// primary only.
  pub async fn with_replica(primary: Connection, replica: Connection) -> Result<Self> {
    let conns = Self { primary, replica };
    conns.init_schema().await?;
    Ok(conns)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .primary
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  pub fn primary(&self) -> &Connection { &self.primary }

  pub fn replica(&self) -> &Connection { &self.replica }

  /// The connection to read from: the replica unless `primary_only`.
  pub fn reader(&self, primary_only: bool) -> &Connection {
    if primary_only { &self.primary } else { &self.replica }
  }

  /// Run `f` inside one immediate transaction on the primary. The
  /// transaction commits if `f` succeeds and rolls back otherwise.
  pub async fn atomic<F, R>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&Transaction<'_>) -> rusqlite::Result<R> + Send + 'static,
    R: Send + 'static,
  {
    let out = self
      .primary
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
      })
      .await?;
    Ok(out)
  }
}

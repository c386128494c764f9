//! Acquire-or-insert surrogate ids for one interning table.
//!
//! Ids are looked up on the replica first. Records the replica does not know
//! are inserted into the primary with `INSERT OR IGNORE`, so two writers
//! racing on the same record both end up with the row the unique key kept,
//! and then re-read from the primary. No locks are taken.
//!
//! A record that points at a lower interning level is only inserted when its
//! parent row still exists on the primary, checked in the same transaction.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::types::Value;
use tokio_rusqlite::Connection;

use crate::{
  Error, Result,
  connections::Connections,
  record::{Record, placeholders, select_ids_in},
};

// ─── Forced ids ──────────────────────────────────────────────────────────────

/// Pre-insert hook that puts specific ids back onto specific records.
///
/// Used to restore ids a concurrent cleanup deleted. The hook only applies
/// when the records about to be inserted are exactly the forced ones;
/// otherwise it is skipped and ids are auto-assigned.
#[derive(Debug, Clone)]
pub struct ForcedIds<R> {
  ids: HashMap<R, i64>,
}

/// The records to insert did not line up with the forced ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedIdMismatch {
  pub forced:            Vec<i64>,
  pub records_to_insert: usize,
}

impl<R: Record> ForcedIds<R> {
  pub fn new(ids: HashMap<R, i64>) -> Self { Self { ids } }

  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }

  /// The forced id of each record, or a mismatch if `records` are not
  /// exactly the forced records (an empty `records` with forced ids left
  /// over is a mismatch too) or two records would share an id.
  pub fn assign(&self, records: &[R]) -> Result<Vec<Option<i64>>, ForcedIdMismatch> {
    let distinct: HashSet<i64> = self.ids.values().copied().collect();
    let assigned: Option<Vec<i64>> = records.iter().map(|r| self.ids.get(r).copied()).collect();

    match assigned {
      Some(ids) if records.len() == self.ids.len() && distinct.len() == self.ids.len() => {
        Ok(ids.into_iter().map(Some).collect())
      }
      _ => {
        let mut forced: Vec<i64> = distinct.into_iter().collect();
        forced.sort_unstable();
        Err(ForcedIdMismatch { forced, records_to_insert: records.len() })
      }
    }
  }
}

// ─── Acquirer ────────────────────────────────────────────────────────────────

/// Per-call options for [`IdAcquirer::acquire_ids`].
#[derive(Debug)]
pub struct AcquireOptions<'a, R> {
  /// Read from the primary instead of the replica.
  pub primary_only: bool,
  pub forced:       Option<&'a ForcedIds<R>>,
}

impl<R> Default for AcquireOptions<'_, R> {
  fn default() -> Self { Self { primary_only: false, forced: None } }
}

/// Ids for every requested record.
#[derive(Debug, Clone)]
pub struct AcquiredIds<R> {
  pub ids:             HashMap<R, i64>,
  /// Set when forced ids were supplied but could not be applied.
  pub forced_mismatch: Option<ForcedIdMismatch>,
}

impl<R: Record> AcquiredIds<R> {
  pub fn get(&self, record: &R) -> Option<i64> { self.ids.get(record).copied() }
}

/// Acquire-or-insert for any [`Record`] table.
#[derive(Clone)]
pub struct IdAcquirer {
  conns:      Connections,
  batch_size: usize,
}

impl IdAcquirer {
  pub fn new(conns: Connections, batch_size: usize) -> Result<Self> {
    if batch_size < 1 {
      return Err(Error::InvalidBatchSize(batch_size));
    }
    Ok(Self { conns, batch_size })
  }

  /// Return the id of every record in `records`, inserting the ones that do
  /// not exist yet. `records` should already be de-duplicated.
  pub async fn acquire_ids<R: Record>(
    &self,
    records: Vec<R>,
    options: AcquireOptions<'_, R>,
  ) -> Result<AcquiredIds<R>> {
    if records.is_empty() {
      return Ok(AcquiredIds { ids: HashMap::new(), forced_mismatch: None });
    }

    let reader = self.conns.reader(options.primary_only);
    let mut ids = select_ids(reader, records.clone(), self.batch_size).await?;

    let missing: Vec<R> = records.into_iter().filter(|r| !ids.contains_key(r)).collect();

    let (assigned, forced_mismatch) = match options.forced {
      None => (vec![None; missing.len()], None),
      Some(forced) => match forced.assign(&missing) {
        Ok(assigned) => (assigned, None),
        Err(mismatch) => {
          tracing::info!(
            table = R::TABLE.name,
            forced = ?mismatch.forced,
            records_to_insert = mismatch.records_to_insert,
            "forced ids do not match records to insert; assigning fresh ids"
          );
          (vec![None; missing.len()], Some(mismatch))
        }
      },
    };

    if missing.is_empty() {
      return Ok(AcquiredIds { ids, forced_mismatch });
    }

    let rows: Vec<(R, Option<i64>)> = missing.iter().cloned().zip(assigned).collect();
    if let Some((table, ids)) = self.insert_ignore(rows).await? {
      return Err(Error::MissingParent { table, ids });
    }

    let inserted = select_ids(self.conns.primary(), missing.clone(), self.batch_size).await?;
    // Only a cleaner committing between the insert and this read gets here.
    // No id has been handed out yet, so the save fails whole and can be
    // retried; reconciliation covers ids the caller already holds.
    if inserted.len() < missing.len() {
      return Err(Error::Incomplete {
        table:   R::TABLE.name,
        missing: missing.len() - inserted.len(),
      });
    }

    tracing::debug!(
      table = R::TABLE.name,
      inserted = inserted.len(),
      found = ids.len(),
      "acquired ids"
    );

    ids.extend(inserted);
    Ok(AcquiredIds { ids, forced_mismatch })
  }

  /// Insert `rows` into the primary in one transaction, ignoring unique-key
  /// conflicts. A row whose forced id is already taken falls back to an
  /// auto-assigned id.
  ///
  /// Nothing is inserted if a parent row is missing on the primary; its
  /// table and ids are returned instead.
  async fn insert_ignore<R: Record>(
    &self,
    rows: Vec<(R, Option<i64>)>,
  ) -> Result<Option<(&'static str, Vec<i64>)>> {
    let batch_size = self.batch_size;
    self
      .conns
      .atomic(move |tx| {
        if let Some(missing) = missing_parents(tx, rows.iter().map(|(r, _)| r), batch_size)? {
          return Ok(Some(missing));
        }

        let table = R::TABLE;
        let columns = table.key_columns.join(", ");
        let marks = placeholders(table.key_columns.len());

        let mut auto = tx.prepare(&format!(
          "INSERT OR IGNORE INTO {} ({columns}) VALUES ({marks})",
          table.name
        ))?;
        let mut forced = tx.prepare(&format!(
          "INSERT OR IGNORE INTO {} (id, {columns}) VALUES (?, {marks})",
          table.name
        ))?;

        for (record, id) in &rows {
          let changed = match id {
            Some(id) => {
              let mut params = vec![Value::Integer(*id)];
              params.extend(record.values());
              forced.execute(rusqlite::params_from_iter(params))?
            }
            None => 0,
          };
          if changed == 0 {
            auto.execute(rusqlite::params_from_iter(record.values()))?;
          }
        }
        Ok(None)
      })
      .await
  }
}

/// The first parent table some of `records` point into without a row there,
/// with the absent ids.
fn missing_parents<'r, R: Record>(
  conn:       &rusqlite::Connection,
  records:    impl Iterator<Item = &'r R>,
  batch_size: usize,
) -> rusqlite::Result<Option<(&'static str, Vec<i64>)>> {
  let mut by_table: BTreeMap<&'static str, Vec<i64>> = BTreeMap::new();
  for (table, id) in records.filter_map(|record| record.parent()) {
    by_table.entry(table).or_default().push(id);
  }

  for (table, mut ids) in by_table {
    ids.sort_unstable();
    ids.dedup();
    let found: HashSet<i64> = select_ids_in(
      conn,
      &format!("SELECT id FROM {table} WHERE id IN ({{ids}})"),
      &ids,
      batch_size,
    )?
    .into_iter()
    .collect();
    let absent: Vec<i64> = ids.into_iter().filter(|id| !found.contains(id)).collect();
    if !absent.is_empty() {
      return Ok(Some((table, absent)));
    }
  }
  Ok(None)
}

/// Look up the ids of `records` on `conn`. Records without a row are absent
/// from the result.
async fn select_ids<R: Record>(
  conn:       &Connection,
  records:    Vec<R>,
  batch_size: usize,
) -> Result<HashMap<R, i64>> {
  let found = conn
    .call(move |conn| {
      let table = R::TABLE;
      let columns = table.key_columns.join(", ");
      let row_match = format!(
        "({})",
        table
          .key_columns
          .iter()
          .map(|c| format!("{c} = ?"))
          .collect::<Vec<_>>()
          .join(" AND ")
      );

      let mut found = Vec::new();
      for chunk in records.chunks(batch_size) {
        let where_clause = vec![row_match.as_str(); chunk.len()].join(" OR ");
        let sql = format!("SELECT id, {columns} FROM {} WHERE {where_clause}", table.name);
        let params: Vec<Value> = chunk.iter().flat_map(|r| r.values()).collect();

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            Ok((R::from_row(row, 1)?, row.get::<_, i64>(0)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        found.extend(rows);
      }
      Ok(found)
    })
    .await?;

  Ok(found.into_iter().collect())
}

//! The SQLite implementation of [`TermStore`].

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use serde::Serialize;
use termstore_core::{
  entity::{EntityId, EntityKind},
  store::{Acquired, CleanupReport, TermStore},
  term::{Language, TermInLangId, TermSet, TermType},
};

use crate::{
  Error, Result,
  cleaner::TermStoreCleaner,
  config::StoreConfig,
  connections::Connections,
  pipeline::TermInLangIdsAcquirer,
  record::placeholders,
  resolver::TermInLangIdsResolver,
  schema::terms_table,
  type_ids::TypeIds,
};

/// Row counts per table, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RowCounts {
  pub text:           i64,
  pub text_in_lang:   i64,
  pub term_in_lang:   i64,
  pub item_terms:     i64,
  pub property_terms: i64,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A term store backed by SQLite.
///
/// Cloning is cheap; the inner connections are reference-counted.
#[derive(Clone)]
pub struct SqliteTermStore {
  conns:      Connections,
  type_ids:   Arc<TypeIds>,
  pipeline:   TermInLangIdsAcquirer,
  cleaner:    TermStoreCleaner,
  resolver:   TermInLangIdsResolver,
  batch_size: usize,
}

impl SqliteTermStore {
  /// Open (or create) the store described by `config`.
  pub async fn open(config: &StoreConfig) -> Result<Self> {
    let conns = Connections::open(&config.path, config.replica_path.as_deref()).await?;
    Self::with_connections(conns, config.batch_size).await
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conns = Connections::open_in_memory().await?;
    Self::with_connections(conns, 100).await
  }

  /// Build a store over already-open connections, loading the type codes
  /// from the primary.
  pub async fn with_connections(conns: Connections, batch_size: usize) -> Result<Self> {
    if batch_size < 1 {
      return Err(Error::InvalidBatchSize(batch_size));
    }
    let type_ids = Arc::new(TypeIds::load(conns.primary()).await?);
    Self::with_type_ids(conns, type_ids, batch_size)
  }

  pub fn with_type_ids(
    conns:      Connections,
    type_ids:   Arc<TypeIds>,
    batch_size: usize,
  ) -> Result<Self> {
    let pipeline = TermInLangIdsAcquirer::new(conns.clone(), type_ids.clone(), batch_size)?;
    let cleaner = TermStoreCleaner::new(conns.clone(), batch_size)?;
    let resolver = TermInLangIdsResolver::new(conns.clone(), type_ids.clone(), batch_size)?;
    Ok(Self { conns, type_ids, pipeline, cleaner, resolver, batch_size })
  }

  pub fn connections(&self) -> &Connections { &self.conns }

  pub fn type_ids(&self) -> &TypeIds { &self.type_ids }

  /// The interning pipeline, for callers that need the post-acquisition
  /// callback.
  pub fn pipeline(&self) -> &TermInLangIdsAcquirer { &self.pipeline }

  pub fn resolver(&self) -> &TermInLangIdsResolver { &self.resolver }

  /// The ids `entity` links to, read from the primary.
  async fn linked_ids(&self, entity: EntityId) -> Result<Vec<TermInLangId>> {
    let table = terms_table(entity.kind);
    let numeric = entity.numeric;
    let ids: Vec<i64> = self
      .conns
      .primary()
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT term_in_lang_id FROM {table} WHERE entity_id = ?1 ORDER BY term_in_lang_id"
        ))?;
        let ids = stmt
          .query_map(rusqlite::params![numeric], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
      })
      .await?;
    Ok(ids.into_iter().map(TermInLangId).collect())
  }

  pub async fn row_counts(&self) -> Result<RowCounts> {
    let counts = self
      .conns
      .primary()
      .call(|conn| {
        let count = |table: &str| -> rusqlite::Result<i64> {
          conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        };
        Ok(RowCounts {
          text:           count("text")?,
          text_in_lang:   count("text_in_lang")?,
          term_in_lang:   count("term_in_lang")?,
          item_terms:     count(terms_table(EntityKind::Item))?,
          property_terms: count(terms_table(EntityKind::Property))?,
        })
      })
      .await?;
    Ok(counts)
  }
}

/// Make the links of `entity` exactly `ids`, in one transaction.
async fn replace_links(conns: Connections, entity: EntityId, ids: Vec<TermInLangId>) -> Result<()> {
  let table = terms_table(entity.kind);
  let numeric = entity.numeric;
  let wanted: HashSet<i64> = ids.iter().map(|id| id.0).collect();

  conns
    .atomic(move |tx| {
      let existing: Vec<i64> = {
        let mut stmt =
          tx.prepare(&format!("SELECT term_in_lang_id FROM {table} WHERE entity_id = ?1"))?;
        let ids = stmt
          .query_map(rusqlite::params![numeric], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        ids
      };

      let mut delete = tx.prepare(&format!(
        "DELETE FROM {table} WHERE entity_id = ?1 AND term_in_lang_id = ?2"
      ))?;
      for id in existing.iter().filter(|id| !wanted.contains(*id)) {
        delete.execute(rusqlite::params![numeric, id])?;
      }

      let mut insert = tx.prepare(&format!(
        "INSERT OR IGNORE INTO {table} (entity_id, term_in_lang_id) VALUES (?1, ?2)"
      ))?;
      for id in &wanted {
        insert.execute(rusqlite::params![numeric, id])?;
      }
      Ok(())
    })
    .await
}

// ─── TermStore impl ──────────────────────────────────────────────────────────

impl TermStore for SqliteTermStore {
  type Error = Error;

  // ── Interning ─────────────────────────────────────────────────────────────

  async fn acquire_term_in_lang_ids(&self, terms: &TermSet) -> Result<Acquired> {
    self.pipeline.acquire_term_in_lang_ids(terms).await
  }

  async fn clean_term_in_lang_ids(&self, ids: &[TermInLangId]) -> Result<CleanupReport> {
    self.cleaner.clean_term_in_lang_ids(ids).await
  }

  // ── Entity links ──────────────────────────────────────────────────────────

  async fn store_entity_terms(&self, entity: EntityId, terms: &TermSet) -> Result<Acquired> {
    let previous = self.linked_ids(entity).await?;

    let conns = self.conns.clone();
    let acquired = self
      .pipeline
      .acquire_term_in_lang_ids_with(terms, |ids| replace_links(conns, entity, ids))
      .await?;

    // The links written by the callback point at ids that were replaced.
    if acquired.mismatch.is_some() {
      replace_links(self.conns.clone(), entity, acquired.ids.ids()).await?;
    }

    let current: HashSet<TermInLangId> = acquired.ids.ids().into_iter().collect();
    let removed: Vec<TermInLangId> = previous
      .into_iter()
      .filter(|id| !current.contains(id))
      .collect();

    tracing::debug!(%entity, terms = current.len(), removed = removed.len(), "stored entity terms");

    if !removed.is_empty() {
      self.cleaner.clean_term_in_lang_ids(&removed).await?;
    }
    Ok(acquired)
  }

  async fn delete_entity_terms(&self, entity: EntityId) -> Result<CleanupReport> {
    let table = terms_table(entity.kind);
    let numeric = entity.numeric;

    let removed: Vec<i64> = self
      .conns
      .atomic(move |tx| {
        let ids: Vec<i64> = {
          let mut stmt =
            tx.prepare(&format!("SELECT term_in_lang_id FROM {table} WHERE entity_id = ?1"))?;
          let ids = stmt
            .query_map(rusqlite::params![numeric], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          ids
        };
        tx.execute(
          &format!("DELETE FROM {table} WHERE entity_id = ?1"),
          rusqlite::params![numeric],
        )?;
        Ok(ids)
      })
      .await?;

    tracing::debug!(%entity, removed = removed.len(), "deleted entity terms");

    let removed: Vec<TermInLangId> = removed.into_iter().map(TermInLangId).collect();
    self.cleaner.clean_term_in_lang_ids(&removed).await
  }

  async fn get_term_in_lang_ids(
    &self,
    entities: &[EntityId],
  ) -> Result<HashMap<EntityId, Vec<TermInLangId>>> {
    let mut by_kind: HashMap<EntityKind, Vec<u32>> = HashMap::new();
    for entity in entities {
      by_kind.entry(entity.kind).or_default().push(entity.numeric);
    }

    let mut out: HashMap<EntityId, Vec<TermInLangId>> = HashMap::new();
    for (kind, mut numerics) in by_kind {
      numerics.sort_unstable();
      numerics.dedup();

      let table = terms_table(kind);
      let batch_size = self.batch_size;
      let rows: Vec<(u32, i64)> = self
        .conns
        .replica()
        .call(move |conn| {
          let mut rows = Vec::new();
          for chunk in numerics.chunks(batch_size) {
            let sql = format!(
              "SELECT entity_id, term_in_lang_id FROM {table}
               WHERE entity_id IN ({})
               ORDER BY entity_id, term_in_lang_id",
              placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let chunk_rows = stmt
              .query_map(rusqlite::params_from_iter(chunk), |row| {
                Ok((row.get(0)?, row.get(1)?))
              })?
              .collect::<rusqlite::Result<Vec<_>>>()?;
            rows.extend(chunk_rows);
          }
          Ok(rows)
        })
        .await?;

      for (numeric, id) in rows {
        out
          .entry(EntityId::new(kind, numeric))
          .or_default()
          .push(TermInLangId(id));
      }
    }
    Ok(out)
  }

  // ── Resolution ────────────────────────────────────────────────────────────

  async fn resolve_grouped_term_in_lang_ids(
    &self,
    groups:    HashMap<EntityId, Vec<TermInLangId>>,
    types:     &[TermType],
    languages: &[Language],
  ) -> Result<HashMap<EntityId, TermSet>> {
    self.resolver.resolve_grouped(groups, types, languages).await
  }
}

//! Garbage collection of interned rows no entity links to any more.
//!
//! A `term_in_lang` id is only unused when *no* junction table references
//! it: an item dropping a label does not free it while a property still uses
//! the same label. Detection and the cascading delete run in one
//! transaction, so no other connection sees a half-cleaned store.

use std::collections::HashSet;

use rusqlite::Connection;
use termstore_core::{entity::EntityKind, store::CleanupReport, term::TermInLangId};

use crate::{
  Result,
  connections::Connections,
  record::{delete_ids_in, select_ids_in},
  schema::terms_table,
};

/// Those of `ids` that no entity of any kind links to.
pub(crate) fn find_unused_term_in_lang_ids(
  conn:       &Connection,
  ids:        &[i64],
  batch_size: usize,
) -> rusqlite::Result<Vec<i64>> {
  let mut used = HashSet::new();
  for kind in EntityKind::ALL {
    let sql = format!(
      "SELECT DISTINCT term_in_lang_id FROM {} WHERE term_in_lang_id IN ({{ids}})",
      terms_table(kind)
    );
    used.extend(select_ids_in(conn, &sql, ids, batch_size)?);
  }

  let mut unused: Vec<i64> = ids.iter().copied().filter(|id| !used.contains(id)).collect();
  unused.sort_unstable();
  unused.dedup();
  Ok(unused)
}

/// `candidates` minus those still referenced according to `referenced_sql`.
fn unreferenced(
  conn:           &Connection,
  referenced_sql: &str,
  candidates:     Vec<i64>,
  batch_size:     usize,
) -> rusqlite::Result<Vec<i64>> {
  let still_used: HashSet<i64> = select_ids_in(conn, referenced_sql, &candidates, batch_size)?
    .into_iter()
    .collect();
  let mut out: Vec<i64> = candidates
    .into_iter()
    .filter(|id| !still_used.contains(id))
    .collect();
  out.sort_unstable();
  out.dedup();
  Ok(out)
}

/// Delete the unused ones among `ids` and everything below them that is left
/// without a referrer. Must run inside a transaction.
pub(crate) fn clean(
  conn:       &Connection,
  ids:        &[i64],
  batch_size: usize,
) -> rusqlite::Result<CleanupReport> {
  let unused = find_unused_term_in_lang_ids(conn, ids, batch_size)?;
  if unused.is_empty() {
    return Ok(CleanupReport::default());
  }

  // term_in_lang
  let text_in_lang_candidates = select_ids_in(
    conn,
    "SELECT DISTINCT text_in_lang_id FROM term_in_lang WHERE id IN ({ids})",
    &unused,
    batch_size,
  )?;
  let existing = select_ids_in(
    conn,
    "SELECT id FROM term_in_lang WHERE id IN ({ids})",
    &unused,
    batch_size,
  )?;
  delete_ids_in(conn, "DELETE FROM term_in_lang WHERE id IN ({ids})", &existing, batch_size)?;

  // text_in_lang
  let text_in_lang = unreferenced(
    conn,
    "SELECT DISTINCT text_in_lang_id FROM term_in_lang WHERE text_in_lang_id IN ({ids})",
    text_in_lang_candidates,
    batch_size,
  )?;
  let text_candidates = select_ids_in(
    conn,
    "SELECT DISTINCT text_id FROM text_in_lang WHERE id IN ({ids})",
    &text_in_lang,
    batch_size,
  )?;
  delete_ids_in(conn, "DELETE FROM text_in_lang WHERE id IN ({ids})", &text_in_lang, batch_size)?;

  // text
  let text = unreferenced(
    conn,
    "SELECT DISTINCT text_id FROM text_in_lang WHERE text_id IN ({ids})",
    text_candidates,
    batch_size,
  )?;
  delete_ids_in(conn, "DELETE FROM text WHERE id IN ({ids})", &text, batch_size)?;

  let mut term_in_lang = existing;
  term_in_lang.sort_unstable();

  Ok(CleanupReport {
    term_in_lang: term_in_lang.into_iter().map(TermInLangId).collect(),
    text_in_lang,
    text,
  })
}

/// Runs [`clean`] in its own transaction on the primary.
#[derive(Clone)]
pub struct TermStoreCleaner {
  conns:      Connections,
  batch_size: usize,
}

impl TermStoreCleaner {
  pub fn new(conns: Connections, batch_size: usize) -> Result<Self> {
    if batch_size < 1 {
      return Err(crate::Error::InvalidBatchSize(batch_size));
    }
    Ok(Self { conns, batch_size })
  }

  /// Delete those of `ids` no entity links to, cascading downwards.
  /// Calling it again with the same ids is a no-op.
  pub async fn clean_term_in_lang_ids(&self, ids: &[TermInLangId]) -> Result<CleanupReport> {
    if ids.is_empty() {
      return Ok(CleanupReport::default());
    }

    let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
    let batch_size = self.batch_size;
    let report = self
      .conns
      .atomic(move |tx| clean(tx, &ids, batch_size))
      .await?;

    tracing::debug!(
      term_in_lang = ?report.term_in_lang,
      text_in_lang = ?report.text_in_lang,
      text = ?report.text,
      "cleaned unused terms"
    );
    Ok(report)
  }
}

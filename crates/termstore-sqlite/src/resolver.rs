//! Turns `term_in_lang` ids back into text.

use std::{
  collections::{HashMap, HashSet},
  hash::Hash,
  sync::Arc,
};

use termstore_core::term::{Language, TermInLangId, TermSet, TermType};

use crate::{Error, Result, connections::Connections, record::placeholders, type_ids::TypeIds};

/// One resolved `term_in_lang` row.
struct ResolvedRow {
  type_id:  i64,
  language: String,
  text:     String,
}

#[derive(Clone)]
pub struct TermInLangIdsResolver {
  conns:      Connections,
  type_ids:   Arc<TypeIds>,
  batch_size: usize,
}

impl TermInLangIdsResolver {
  pub fn new(conns: Connections, type_ids: Arc<TypeIds>, batch_size: usize) -> Result<Self> {
    if batch_size < 1 {
      return Err(Error::InvalidBatchSize(batch_size));
    }
    Ok(Self { conns, type_ids, batch_size })
  }

  /// Resolve `ids` into one [`TermSet`], keeping only `types` and
  /// `languages` (an empty filter keeps everything).
  pub async fn resolve_term_in_lang_ids(
    &self,
    ids:       &[TermInLangId],
    types:     &[TermType],
    languages: &[Language],
  ) -> Result<TermSet> {
    let groups = HashMap::from([((), ids.to_vec())]);
    let mut resolved = self.resolve_grouped(groups, types, languages).await?;
    Ok(resolved.remove(&()).unwrap_or_default())
  }

  /// Resolve each group of ids into its own [`TermSet`] with a single pass
  /// over the distinct ids. Groups left with no terms are absent.
  pub async fn resolve_grouped<K>(
    &self,
    groups:    HashMap<K, Vec<TermInLangId>>,
    types:     &[TermType],
    languages: &[Language],
  ) -> Result<HashMap<K, TermSet>>
  where
    K: Eq + Hash,
  {
    let mut all: Vec<i64> = groups.values().flatten().map(|id| id.0).collect();
    all.sort_unstable();
    all.dedup();

    let rows = self.fetch_rows(all).await?;

    let types: HashSet<TermType> = types.iter().copied().collect();
    let languages: HashSet<&str> = languages.iter().map(String::as_str).collect();

    let mut out = HashMap::new();
    for (key, ids) in groups {
      let mut terms = TermSet::new();
      for id in ids {
        let Some(row) = rows.get(&id.0) else { continue };
        let ty = self.type_ids.term_type(row.type_id)?;
        if !types.is_empty() && !types.contains(&ty) {
          continue;
        }
        if !languages.is_empty() && !languages.contains(row.language.as_str()) {
          continue;
        }
        terms.insert(ty, row.language.clone(), row.text.clone());
      }
      if !terms.is_empty() {
        out.insert(key, terms);
      }
    }
    Ok(out)
  }

  async fn fetch_rows(&self, ids: Vec<i64>) -> Result<HashMap<i64, ResolvedRow>> {
    if ids.is_empty() {
      return Ok(HashMap::new());
    }

    let batch_size = self.batch_size;
    let rows = self
      .conns
      .replica()
      .call(move |conn| {
        let mut out = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(batch_size) {
          let sql = format!(
            "SELECT tl.id, tl.type_id, til.language, t.value
             FROM term_in_lang tl
             JOIN text_in_lang til ON til.id = tl.text_in_lang_id
             JOIN text         t   ON t.id   = til.text_id
             WHERE tl.id IN ({})",
            placeholders(chunk.len())
          );
          let mut stmt = conn.prepare(&sql)?;
          let rows = stmt
            .query_map(rusqlite::params_from_iter(chunk), |row| {
              Ok((row.get::<_, i64>(0)?, ResolvedRow {
                type_id:  row.get(1)?,
                language: row.get(2)?,
                text:     row.get(3)?,
              }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
          out.extend(rows);
        }
        Ok(out)
      })
      .await?;

    Ok(rows.into_iter().collect())
  }
}

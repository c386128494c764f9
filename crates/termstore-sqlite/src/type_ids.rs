//! The mapping between term types and their stored codes.
//!
//! The codes live in the `type_codes` table rather than in code so they can
//! be migrated. They are read once when the store opens and shared read-only
//! afterwards.

use std::collections::HashMap;

use termstore_core::term::TermType;
use tokio_rusqlite::Connection;

use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct TypeIds {
  by_type: HashMap<TermType, i64>,
  by_id:   HashMap<i64, TermType>,
}

impl TypeIds {
  /// Read the codes from `conn`, first registering any term type that has
  /// no code yet. Existing codes are never changed.
  pub async fn load(conn: &Connection) -> Result<Self> {
    let rows: Vec<(i64, String)> = conn
      .call(|conn| {
        {
          let mut insert = conn.prepare("INSERT OR IGNORE INTO type_codes (name) VALUES (?1)")?;
          for ty in TermType::ALL {
            insert.execute(rusqlite::params![ty.as_str()])?;
          }
        }
        let mut stmt = conn.prepare("SELECT id, name FROM type_codes")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut pairs = Vec::with_capacity(rows.len());
    for (id, name) in rows {
      match name.parse::<TermType>() {
        Ok(ty) => pairs.push((ty, id)),
        Err(_) => tracing::warn!(id, name, "ignoring unknown term type code"),
      }
    }

    let type_ids = Self::from_pairs(pairs);
    tracing::debug!(codes = ?type_ids.by_type, "loaded term type codes");
    Ok(type_ids)
  }

  /// Build a mapping from explicit `(type, code)` pairs.
  pub fn from_pairs(pairs: impl IntoIterator<Item = (TermType, i64)>) -> Self {
    let by_type: HashMap<TermType, i64> = pairs.into_iter().collect();
    let by_id = by_type.iter().map(|(ty, id)| (*id, *ty)).collect();
    Self { by_type, by_id }
  }

  pub fn type_id(&self, term_type: TermType) -> Result<i64> {
    self
      .by_type
      .get(&term_type)
      .copied()
      .ok_or(Error::MissingTypeId(term_type))
  }

  pub fn term_type(&self, type_id: i64) -> Result<TermType> {
    self
      .by_id
      .get(&type_id)
      .copied()
      .ok_or(Error::UnknownTypeId(type_id))
  }
}

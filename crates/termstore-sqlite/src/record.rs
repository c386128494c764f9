//! Typed unique-key records for the three interning tables, and the SQL
//! helpers shared by the components that read them.

use std::{
  collections::{BTreeMap, HashSet},
  hash::Hash,
};

use rusqlite::types::Value;
use sha2::{Digest, Sha256};

// ─── Record ──────────────────────────────────────────────────────────────────

/// Where a record lives: the table and its unique-key columns, in order.
/// Every table has an integer `id` primary key.
#[derive(Debug, Clone, Copy)]
pub struct Table {
  pub name:        &'static str,
  pub key_columns: &'static [&'static str],
}

/// The unique-key columns of one row of an interning table.
pub trait Record: Clone + Eq + Hash + Send + Sync + 'static {
  const TABLE: Table;

  /// Column values in [`Table::key_columns`] order.
  fn values(&self) -> Vec<Value>;

  /// Rebuild a record from key columns starting at `offset`.
  fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self>;

  /// The interning row this record points at, as `(table, id)`. The row
  /// must exist on the primary before the record may be inserted.
  fn parent(&self) -> Option<(&'static str, i64)> { None }

  /// Stable SHA-256 over the sorted `column → value` map, hex encoded.
  fn fingerprint(&self) -> String {
    let columns: BTreeMap<&str, Value> = Self::TABLE
      .key_columns
      .iter()
      .copied()
      .zip(self.values())
      .collect();

    let mut hasher = Sha256::new();
    for (column, value) in &columns {
      hasher.update(column.as_bytes());
      hasher.update([0u8]);
      match value {
        Value::Integer(i) => {
          hasher.update(b"i");
          hasher.update(i.to_be_bytes());
        }
        Value::Text(s) => {
          hasher.update(b"t");
          hasher.update(s.as_bytes());
        }
        other => hasher.update(format!("{other:?}").as_bytes()),
      }
      hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
  }
}

/// Drop repeated records, keeping the first occurrence of each fingerprint.
pub fn dedup_records<R: Record>(records: impl IntoIterator<Item = R>) -> Vec<R> {
  let mut seen = HashSet::new();
  records
    .into_iter()
    .filter(|record| seen.insert(record.fingerprint()))
    .collect()
}

// ─── Tables ──────────────────────────────────────────────────────────────────

/// A (truncated) text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextRecord {
  pub value: String,
}

impl Record for TextRecord {
  const TABLE: Table = Table { name: "text", key_columns: &["value"] };

  fn values(&self) -> Vec<Value> { vec![Value::Text(self.value.clone())] }

  fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self { value: row.get(offset)? })
  }
}

/// A text in one language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextInLangRecord {
  pub text_id:  i64,
  pub language: String,
}

impl Record for TextInLangRecord {
  const TABLE: Table = Table { name: "text_in_lang", key_columns: &["text_id", "language"] };

  fn values(&self) -> Vec<Value> {
    vec![Value::Integer(self.text_id), Value::Text(self.language.clone())]
  }

  fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self { text_id: row.get(offset)?, language: row.get(offset + 1)? })
  }

  fn parent(&self) -> Option<(&'static str, i64)> { Some((TextRecord::TABLE.name, self.text_id)) }
}

/// A text in one language used as one term type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TermInLangRecord {
  pub text_in_lang_id: i64,
  pub type_id:         i64,
}

impl Record for TermInLangRecord {
  const TABLE: Table =
    Table { name: "term_in_lang", key_columns: &["text_in_lang_id", "type_id"] };

  fn values(&self) -> Vec<Value> {
    vec![Value::Integer(self.text_in_lang_id), Value::Integer(self.type_id)]
  }

  fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self { text_in_lang_id: row.get(offset)?, type_id: row.get(offset + 1)? })
  }

  // Type codes are never cleaned, so only the text_in_lang row is checked.
  fn parent(&self) -> Option<(&'static str, i64)> {
    Some((TextInLangRecord::TABLE.name, self.text_in_lang_id))
  }
}

// ─── SQL helpers ─────────────────────────────────────────────────────────────

/// `?, ?, ?` with `n` placeholders.
pub fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

/// Run `sql` (which must contain one `{ids}` placeholder list marker) for
/// each chunk of `ids` and collect the first integer column of every row.
pub fn select_ids_in(
  conn:       &rusqlite::Connection,
  sql:        &str,
  ids:        &[i64],
  batch_size: usize,
) -> rusqlite::Result<Vec<i64>> {
  let mut out = Vec::new();
  for chunk in ids.chunks(batch_size) {
    let sql = sql.replace("{ids}", &placeholders(chunk.len()));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(rusqlite::params_from_iter(chunk), |row| row.get::<_, i64>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    out.extend(rows);
  }
  Ok(out)
}

/// Run a `DELETE` (with one `{ids}` marker) for each chunk of `ids`.
pub fn delete_ids_in(
  conn:       &rusqlite::Connection,
  sql:        &str,
  ids:        &[i64],
  batch_size: usize,
) -> rusqlite::Result<usize> {
  let mut deleted = 0;
  for chunk in ids.chunks(batch_size) {
    let sql = sql.replace("{ids}", &placeholders(chunk.len()));
    deleted += conn.execute(&sql, rusqlite::params_from_iter(chunk))?;
  }
  Ok(deleted)
}

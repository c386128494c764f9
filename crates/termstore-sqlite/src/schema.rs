//! SQL schema for the term store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

use termstore_core::entity::EntityKind;

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
///
/// `AUTOINCREMENT` keeps a deleted surrogate id from being handed to a
/// different record later; only the restore path reuses one, for the record
/// it belonged to.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- Interned rows are write-once. Rows are only ever deleted by the cleaner.
CREATE TABLE IF NOT EXISTS text (
    id     INTEGER PRIMARY KEY AUTOINCREMENT,
    value  TEXT NOT NULL,            -- truncated to 255 bytes
    UNIQUE (value)
);

CREATE TABLE IF NOT EXISTS text_in_lang (
    id        INTEGER PRIMARY KEY AUTOINCREMENT,
    text_id   INTEGER NOT NULL,
    language  TEXT NOT NULL,
    UNIQUE (text_id, language)
);

CREATE TABLE IF NOT EXISTS term_in_lang (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    text_in_lang_id  INTEGER NOT NULL,
    type_id          INTEGER NOT NULL,
    UNIQUE (text_in_lang_id, type_id)
);

-- Small lookup; codes are read once at startup and may be migrated.
CREATE TABLE IF NOT EXISTS type_codes (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL,
    UNIQUE (name)
);

-- One junction table per entity kind.
CREATE TABLE IF NOT EXISTS item_terms (
    entity_id        INTEGER NOT NULL,
    term_in_lang_id  INTEGER NOT NULL,
    PRIMARY KEY (entity_id, term_in_lang_id)
) WITHOUT ROWID;

CREATE TABLE IF NOT EXISTS property_terms (
    entity_id        INTEGER NOT NULL,
    term_in_lang_id  INTEGER NOT NULL,
    PRIMARY KEY (entity_id, term_in_lang_id)
) WITHOUT ROWID;

CREATE INDEX IF NOT EXISTS text_in_lang_text_idx      ON text_in_lang(text_id);
CREATE INDEX IF NOT EXISTS term_in_lang_text_lang_idx ON term_in_lang(text_in_lang_id);
CREATE INDEX IF NOT EXISTS item_terms_term_idx        ON item_terms(term_in_lang_id);
CREATE INDEX IF NOT EXISTS property_terms_term_idx    ON property_terms(term_in_lang_id);

PRAGMA user_version = 1;
";

/// The junction table linking entities of `kind` to `term_in_lang` rows.
pub fn terms_table(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::Item => "item_terms",
    EntityKind::Property => "property_terms",
  }
}

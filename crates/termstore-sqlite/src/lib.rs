//! SQLite backend for the term store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Terms are interned through three
//! levels (`text` → `text_in_lang` → `term_in_lang`); entities link to the
//! last level through one junction table per entity kind.

mod acquirer;
mod cleaner;
mod connections;
mod pipeline;
mod record;
mod resolver;
mod schema;
mod store;
mod type_ids;

pub mod config;
pub mod error;

pub use acquirer::{AcquireOptions, AcquiredIds, ForcedIdMismatch, ForcedIds, IdAcquirer};
pub use cleaner::TermStoreCleaner;
pub use config::StoreConfig;
pub use connections::Connections;
pub use error::{Error, Result};
pub use pipeline::TermInLangIdsAcquirer;
pub use record::{Record, TermInLangRecord, TextInLangRecord, TextRecord};
pub use resolver::TermInLangIdsResolver;
pub use store::{RowCounts, SqliteTermStore};
pub use type_ids::TypeIds;

#[cfg(test)]
mod tests;

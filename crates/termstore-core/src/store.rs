//! The `TermStore` trait and the result types shared by its backends.
//!
//! The trait is implemented by storage backends (e.g. `termstore-sqlite`).
//! The read path in [`crate::prefetch`] and the CLI depend on this
//! abstraction, not on any concrete backend.

use std::{collections::HashMap, future::Future};

use serde::Serialize;
use thiserror::Error;

use crate::{
  entity::EntityId,
  term::{Language, TermIds, TermInLangId, TermSet, TermType},
};

// ─── Acquisition results ─────────────────────────────────────────────────────

/// The output of interning a [`TermSet`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Acquired {
  pub ids:      TermIds,
  /// Set when a concurrently deleted id could not be restored and a fresh
  /// id was minted in its place.
  pub mismatch: Option<RestoreMismatch>,
}

impl Acquired {
  /// Turn a restore mismatch into an `Err`, for callers that need the
  /// original ids to survive a cleanup race.
  pub fn into_result(self) -> Result<TermIds, ReconciliationWarning> {
    match self.mismatch {
      None => Ok(self.ids),
      Some(mismatch) => Err(ReconciliationWarning { mismatch, ids: self.ids }),
    }
  }
}

/// Ids deleted by a racing cleanup that could not be put back because the
/// records to re-insert no longer lined up with them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreMismatch {
  pub ids_to_restore:    Vec<TermInLangId>,
  pub records_to_insert: usize,
}

/// A completed acquisition whose ids differ from the ones a cleanup race
/// removed. `ids` is still valid and persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error(
  "could not restore {} term ids ({} records to insert); fresh ids were assigned",
  .mismatch.ids_to_restore.len(),
  .mismatch.records_to_insert
)]
pub struct ReconciliationWarning {
  pub mismatch: RestoreMismatch,
  pub ids:      TermIds,
}

// ─── Cleanup results ─────────────────────────────────────────────────────────

/// Rows removed by one cleanup call, per interning level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
  pub term_in_lang: Vec<TermInLangId>,
  pub text_in_lang: Vec<i64>,
  pub text:         Vec<i64>,
}

impl CleanupReport {
  pub fn is_empty(&self) -> bool {
    self.term_in_lang.is_empty() && self.text_in_lang.is_empty() && self.text.is_empty()
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a term store backend.
///
/// Interned rows are write-once: a changed term becomes a new id and the old
/// id is garbage-collected once no entity of any kind links to it.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait TermStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Interning ─────────────────────────────────────────────────────────

  /// Intern every text of `terms`, returning ids in the input's shape.
  /// Texts never seen before get new ids; known ones reuse theirs.
  fn acquire_term_in_lang_ids<'a>(
    &'a self,
    terms: &'a TermSet,
  ) -> impl Future<Output = Result<Acquired, Self::Error>> + Send + 'a;

  /// Delete those of `ids` that no entity of any kind links to, cascading
  /// to the text-in-language and text rows left unreferenced.
  fn clean_term_in_lang_ids<'a>(
    &'a self,
    ids: &'a [TermInLangId],
  ) -> impl Future<Output = Result<CleanupReport, Self::Error>> + Send + 'a;

  // ── Entity links ──────────────────────────────────────────────────────

  /// Replace the term links of `entity` with `terms` and clean up the ids it
  /// no longer uses.
  fn store_entity_terms<'a>(
    &'a self,
    entity: EntityId,
    terms: &'a TermSet,
  ) -> impl Future<Output = Result<Acquired, Self::Error>> + Send + 'a;

  /// Remove every term link of `entity` and clean up the ids it used.
  fn delete_entity_terms(
    &self,
    entity: EntityId,
  ) -> impl Future<Output = Result<CleanupReport, Self::Error>> + Send + '_;

  /// The term ids each entity links to. Entities without links are absent.
  fn get_term_in_lang_ids<'a>(
    &'a self,
    entities: &'a [EntityId],
  ) -> impl Future<Output = Result<HashMap<EntityId, Vec<TermInLangId>>, Self::Error>> + Send + 'a;

  // ── Resolution ────────────────────────────────────────────────────────

  /// Resolve grouped ids back to text, keeping only the given types and
  /// languages (an empty filter keeps everything).
  fn resolve_grouped_term_in_lang_ids<'a>(
    &'a self,
    groups: HashMap<EntityId, Vec<TermInLangId>>,
    types: &'a [TermType],
    languages: &'a [Language],
  ) -> impl Future<Output = Result<HashMap<EntityId, TermSet>, Self::Error>> + Send + 'a;
}

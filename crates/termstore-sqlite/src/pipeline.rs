//! Interns a [`TermSet`] into `term_in_lang` ids with [`TermInLangIdsAcquirer`].
//!
//! Interning runs as four passes, each a function of the previous pass's
//! output:
//!
//! 1. texts → `text` ids (after truncation)
//! 2. (text id, language) → `text_in_lang` ids
//! 3. term types → type codes
//! 4. (text_in_lang id, type code) → `term_in_lang` ids, reassembled in the
//!    input's `{type: {language: [...]}}` shape
//!
//! A parent id read from a lagging replica may already be gone from the
//! primary. Inserting below it is refused, and the passes re-run against the
//! primary.
//!
//! After the caller's callback has run, the produced ids are checked against
//! the primary. Ids a concurrent cleanup deleted in the meantime are put back
//! by re-running the passes on the primary with those ids forced onto their
//! records.

use std::{
  collections::{BTreeMap, HashMap, HashSet},
  future::Future,
  sync::Arc,
};

use termstore_core::{
  normalize::truncate_text,
  store::{Acquired, RestoreMismatch},
  term::{Language, TermIds, TermInLangId, TermSet, TermType},
};

use crate::{
  Error, Result,
  acquirer::{AcquireOptions, ForcedIdMismatch, ForcedIds, IdAcquirer},
  connections::Connections,
  record::{TermInLangRecord, TextInLangRecord, TextRecord, dedup_records, select_ids_in},
  type_ids::TypeIds,
};

/// Original (untruncated) text → `text` id.
type TextIds = HashMap<String, i64>;

/// Language → `text` id → `text_in_lang` id.
type TextInLangIds = HashMap<Language, HashMap<i64, i64>>;

/// Ids from an earlier pass that must be put back onto their records.
#[derive(Clone, Copy)]
struct Restore<'a> {
  previous: &'a TermIds,
  ids:      &'a HashSet<TermInLangId>,
}

struct Interned {
  ids:      TermIds,
  mismatch: Option<ForcedIdMismatch>,
}

fn incomplete(table: &'static str) -> Error { Error::Incomplete { table, missing: 1 } }

/// The term interning pipeline.
#[derive(Clone)]
pub struct TermInLangIdsAcquirer {
  conns:      Connections,
  acquirer:   IdAcquirer,
  type_ids:   Arc<TypeIds>,
  batch_size: usize,
}

impl TermInLangIdsAcquirer {
  pub fn new(conns: Connections, type_ids: Arc<TypeIds>, batch_size: usize) -> Result<Self> {
    let acquirer = IdAcquirer::new(conns.clone(), batch_size)?;
    Ok(Self { conns, acquirer, type_ids, batch_size })
  }

  pub async fn acquire_term_in_lang_ids(&self, terms: &TermSet) -> Result<Acquired> {
    self
      .acquire_term_in_lang_ids_with(terms, |_| async { Ok(()) })
      .await
  }

  /// Intern `terms`, then hand the de-duplicated ids to `callback` before
  /// checking that none of them was deleted concurrently.
  ///
  /// Rows the callback makes reference these ids are what protects them from
  /// later cleanups, so link writes belong inside it. The callback runs even
  /// for empty input, with no ids.
  pub async fn acquire_term_in_lang_ids_with<F, Fut>(
    &self,
    terms:    &TermSet,
    callback: F,
  ) -> Result<Acquired>
  where
    F: FnOnce(Vec<TermInLangId>) -> Fut,
    Fut: Future<Output = Result<()>>,
  {
    if terms.is_empty() {
      callback(Vec::new()).await?;
      return Ok(Acquired::default());
    }

    let first = self.intern(terms, false, None).await?;
    callback(first.ids.ids()).await?;
    self.reconcile(terms, first.ids).await
  }

  async fn reconcile(&self, terms: &TermSet, ids: TermIds) -> Result<Acquired> {
    let produced = ids.ids();
    let persisted = self.persisted(&produced).await?;
    let to_restore: Vec<TermInLangId> = produced
      .into_iter()
      .filter(|id| !persisted.contains(id))
      .collect();

    if to_restore.is_empty() {
      return Ok(Acquired { ids, mismatch: None });
    }

    tracing::info!(ids = ?to_restore, "term ids deleted during acquisition; restoring");

    let restore_ids: HashSet<TermInLangId> = to_restore.iter().copied().collect();
    let restore = Restore { previous: &ids, ids: &restore_ids };
    let rerun = self.intern(terms, true, Some(restore)).await?;

    let mismatch = rerun.mismatch.map(|m| {
      tracing::info!(
        ids_to_restore = ?to_restore,
        records_to_insert = m.records_to_insert,
        "could not restore deleted term ids; fresh ids assigned"
      );
      RestoreMismatch { ids_to_restore: to_restore, records_to_insert: m.records_to_insert }
    });

    Ok(Acquired { ids: rerun.ids, mismatch })
  }

  /// Those of `ids` that exist on the primary.
  async fn persisted(&self, ids: &[TermInLangId]) -> Result<HashSet<TermInLangId>> {
    let ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
    let batch_size = self.batch_size;
    let found = self
      .conns
      .primary()
      .call(move |conn| {
        Ok(select_ids_in(
          conn,
          "SELECT id FROM term_in_lang WHERE id IN ({ids})",
          &ids,
          batch_size,
        )?)
      })
      .await?;
    Ok(found.into_iter().map(TermInLangId).collect())
  }

  /// Run the passes, falling back to the primary when the replica handed out
  /// a parent id a cleanup has since removed there.
  async fn intern(
    &self,
    terms:        &TermSet,
    primary_only: bool,
    restore:      Option<Restore<'_>>,
  ) -> Result<Interned> {
    match self.run_passes(terms, primary_only, restore).await {
      Err(Error::MissingParent { table, ids }) if !primary_only => {
        tracing::info!(table, ?ids, "replica ids gone from the primary; re-reading from the primary");
        self.run_passes(terms, true, restore).await
      }
      other => other,
    }
  }

  async fn run_passes(
    &self,
    terms:        &TermSet,
    primary_only: bool,
    restore:      Option<Restore<'_>>,
  ) -> Result<Interned> {
    let text_ids = self.acquire_text_ids(terms, primary_only).await?;
    let text_in_lang_ids = self
      .acquire_text_in_lang_ids(terms, &text_ids, primary_only)
      .await?;
    let type_ids = self.type_ids_of(terms)?;
    self
      .acquire_term_ids(terms, &text_ids, &text_in_lang_ids, &type_ids, primary_only, restore)
      .await
  }

  // ── Pass 1: text ──────────────────────────────────────────────────────

  async fn acquire_text_ids(&self, terms: &TermSet, primary_only: bool) -> Result<TextIds> {
    let record_of = |text: &str| TextRecord { value: truncate_text(text).to_owned() };

    let records = dedup_records(terms.texts().map(record_of));
    let acquired = self
      .acquirer
      .acquire_ids(records, AcquireOptions { primary_only, forced: None })
      .await?;

    // Several originals may share one truncated record, and so one id.
    terms
      .texts()
      .map(|text| {
        acquired
          .get(&record_of(text))
          .map(|id| (text.to_owned(), id))
          .ok_or_else(|| incomplete("text"))
      })
      .collect()
  }

  // ── Pass 2: text in language ──────────────────────────────────────────

  async fn acquire_text_in_lang_ids(
    &self,
    terms:        &TermSet,
    text_ids:     &TextIds,
    primary_only: bool,
  ) -> Result<TextInLangIds> {
    let mut records = Vec::new();
    for (_, language, texts) in terms.iter() {
      for text in texts {
        let text_id = text_ids.get(text).copied().ok_or_else(|| incomplete("text"))?;
        records.push(TextInLangRecord { text_id, language: language.to_owned() });
      }
    }

    let acquired = self
      .acquirer
      .acquire_ids(dedup_records(records), AcquireOptions { primary_only, forced: None })
      .await?;

    let mut by_lang = TextInLangIds::new();
    for (record, id) in acquired.ids {
      by_lang.entry(record.language).or_default().insert(record.text_id, id);
    }
    Ok(by_lang)
  }

  // ── Pass 3: types ─────────────────────────────────────────────────────

  fn type_ids_of(&self, terms: &TermSet) -> Result<BTreeMap<TermType, i64>> {
    terms
      .as_map()
      .keys()
      .map(|ty| Ok((*ty, self.type_ids.type_id(*ty)?)))
      .collect()
  }

  // ── Pass 4: term in language ──────────────────────────────────────────

  async fn acquire_term_ids(
    &self,
    terms:            &TermSet,
    text_ids:         &TextIds,
    text_in_lang_ids: &TextInLangIds,
    type_ids:         &BTreeMap<TermType, i64>,
    primary_only:     bool,
    restore:          Option<Restore<'_>>,
  ) -> Result<Interned> {
    let record_of = |ty: TermType, language: &str, text: &str| -> Result<TermInLangRecord> {
      let text_id = text_ids.get(text).copied().ok_or_else(|| incomplete("text"))?;
      let text_in_lang_id = text_in_lang_ids
        .get(language)
        .and_then(|by_text| by_text.get(&text_id))
        .copied()
        .ok_or_else(|| incomplete("text_in_lang"))?;
      let type_id = type_ids.get(&ty).copied().ok_or(Error::MissingTypeId(ty))?;
      Ok(TermInLangRecord { text_in_lang_id, type_id })
    };

    let mut records = Vec::new();
    for (ty, language, texts) in terms.iter() {
      for text in texts {
        records.push(record_of(ty, language, text)?);
      }
    }

    let forced = match restore {
      None => None,
      Some(restore) => {
        let mut forced = HashMap::new();
        for (ty, language, texts) in terms.iter() {
          let previous = restore.previous.get(ty, language).unwrap_or_default();
          for (text, previous_id) in texts.iter().zip(previous) {
            if restore.ids.contains(previous_id) {
              forced.insert(record_of(ty, language, text)?, previous_id.0);
            }
          }
        }
        Some(ForcedIds::new(forced))
      }
    };

    let acquired = self
      .acquirer
      .acquire_ids(dedup_records(records), AcquireOptions {
        primary_only,
        forced: forced.as_ref(),
      })
      .await?;

    let mut ids = TermIds::new();
    for (ty, language, texts) in terms.iter() {
      let list = texts
        .iter()
        .map(|text| {
          let record = record_of(ty, language, text)?;
          acquired
            .get(&record)
            .map(TermInLangId)
            .ok_or_else(|| incomplete("term_in_lang"))
        })
        .collect::<Result<Vec<_>>>()?;
      ids.insert(ty, language, list);
    }

    Ok(Interned { ids, mismatch: acquired.forced_mismatch })
  }
}

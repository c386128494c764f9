//! Batched term reads for one entity kind.
//!
//! Rendering a list of entities needs a label or description for each of
//! them. [`PrefetchingTermLookup`] fetches the junction links of many
//! entities in one call, resolves all their ids in one grouped call, and
//! buffers the texts for the lifetime of the lookup.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use crate::{
  Error, Result,
  entity::{EntityId, EntityKind},
  store::TermStore,
  term::{Language, TermSet, TermType},
};

/// Outcome of reading the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefetched {
  /// The (entity, type, language) triple was never prefetched.
  NotPrefetched,
  /// Prefetched; the entity has no such term.
  Absent,
  Found(String),
}

/// A per-instance term buffer in front of a [`TermStore`].
pub struct PrefetchingTermLookup<S> {
  store:   Arc<S>,
  kind:    EntityKind,
  /// Resolved terms keyed by entity serialization (`Q42`).
  buffer:  HashMap<String, TermSet>,
  fetched: HashSet<(String, TermType, Language)>,
}

impl<S> PrefetchingTermLookup<S>
where
  S: TermStore,
{
  pub fn new(store: Arc<S>, kind: EntityKind) -> Self {
    Self { store, kind, buffer: HashMap::new(), fetched: HashSet::new() }
  }

  /// A lookup for items, the usual case.
  pub fn for_items(store: Arc<S>) -> Self { Self::new(store, EntityKind::Item) }

  pub fn kind(&self) -> EntityKind { self.kind }

  fn check_kind(&self, entity: EntityId) -> Result<()> {
    if entity.kind != self.kind {
      return Err(Error::UnsupportedEntityKind { expected: self.kind, actual: entity.kind });
    }
    Ok(())
  }

  /// Load the given term types and languages for every entity that does
  /// not already have all of them buffered.
  pub async fn prefetch_terms(
    &mut self,
    entities:   &[EntityId],
    term_types: &[TermType],
    languages:  &[Language],
  ) -> Result<()> {
    for entity in entities {
      self.check_kind(*entity)?;
    }

    let mut to_fetch: Vec<EntityId> = entities
      .iter()
      .copied()
      .filter(|entity| {
        let key = entity.to_string();
        term_types.iter().any(|ty| {
          languages
            .iter()
            .any(|lang| !self.fetched.contains(&(key.clone(), *ty, lang.clone())))
        })
      })
      .collect();
    to_fetch.sort_unstable();
    to_fetch.dedup();

    if to_fetch.is_empty() {
      return Ok(());
    }

    let groups = self
      .store
      .get_term_in_lang_ids(&to_fetch)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;
    let resolved = self
      .store
      .resolve_grouped_term_in_lang_ids(groups, term_types, languages)
      .await
      .map_err(|e| Error::Store(Box::new(e)))?;

    tracing::debug!(
      kind = %self.kind,
      entities = to_fetch.len(),
      resolved = resolved.len(),
      "prefetched terms"
    );

    for entity in to_fetch {
      let key = entity.to_string();
      let terms = resolved.get(&entity);
      let buffered = self.buffer.entry(key.clone()).or_default();
      for ty in term_types {
        for lang in languages {
          let texts = terms
            .and_then(|t| t.get(*ty, lang))
            .map(<[String]>::to_vec)
            .unwrap_or_default();
          buffered.set(*ty, lang.clone(), texts);
          self.fetched.insert((key.clone(), *ty, lang.clone()));
        }
      }
    }

    Ok(())
  }

  /// Read one buffered term. For aliases this is the first alias; use
  /// [`Self::get_prefetched_aliases`] for all of them.
  pub fn get_prefetched_term(
    &self,
    entity:    EntityId,
    term_type: TermType,
    language:  &str,
  ) -> Result<Prefetched> {
    self.check_kind(entity)?;
    let key = entity.to_string();
    if !self.fetched.contains(&(key.clone(), term_type, language.to_owned())) {
      return Ok(Prefetched::NotPrefetched);
    }
    let text = self
      .buffer
      .get(&key)
      .and_then(|terms| terms.get(term_type, language))
      .and_then(<[String]>::first);
    Ok(match text {
      Some(text) => Prefetched::Found(text.clone()),
      None => Prefetched::Absent,
    })
  }

  /// All buffered aliases, or `None` if they were never prefetched.
  pub fn get_prefetched_aliases(
    &self,
    entity:   EntityId,
    language: &str,
  ) -> Result<Option<Vec<String>>> {
    self.check_kind(entity)?;
    let key = entity.to_string();
    if !self.fetched.contains(&(key.clone(), TermType::Alias, language.to_owned())) {
      return Ok(None);
    }
    let aliases = self
      .buffer
      .get(&key)
      .and_then(|terms| terms.get(TermType::Alias, language))
      .map(<[String]>::to_vec)
      .unwrap_or_default();
    Ok(Some(aliases))
  }

  async fn get_or_fetch(
    &mut self,
    entity:    EntityId,
    term_type: TermType,
    language:  &str,
  ) -> Result<Option<String>> {
    let languages = [language.to_owned()];
    self.prefetch_terms(&[entity], &[term_type], &languages).await?;
    match self.get_prefetched_term(entity, term_type, language)? {
      Prefetched::Found(text) => Ok(Some(text)),
      Prefetched::Absent | Prefetched::NotPrefetched => Ok(None),
    }
  }

  pub async fn get_label(&mut self, entity: EntityId, language: &str) -> Result<Option<String>> {
    self.get_or_fetch(entity, TermType::Label, language).await
  }

  pub async fn get_description(
    &mut self,
    entity:   EntityId,
    language: &str,
  ) -> Result<Option<String>> {
    self.get_or_fetch(entity, TermType::Description, language).await
  }

  pub async fn get_aliases(&mut self, entity: EntityId, language: &str) -> Result<Vec<String>> {
    let languages = [language.to_owned()];
    self.prefetch_terms(&[entity], &[TermType::Alias], &languages).await?;
    Ok(self.get_prefetched_aliases(entity, language)?.unwrap_or_default())
  }
}

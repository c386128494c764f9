//! Terms, the (type, language, text) facts attached to an entity, and the
//! nested maps used to pass them around.
//!
//! Both the interning input ([`TermSet`]) and its output ([`TermIds`]) keep
//! the `{type: {language: [...]}}` shape so a result can be matched back to
//! the input key that produced it.

use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A language code such as `en` or `de-ch`. Not validated.
pub type Language = String;

// ─── TermType ────────────────────────────────────────────────────────────────

/// The kind of a term. Stored as a small integer via the type-id mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TermType {
  Label,
  Description,
  Alias,
}

impl TermType {
  pub const ALL: [TermType; 3] = [TermType::Label, TermType::Description, TermType::Alias];

  pub fn as_str(self) -> &'static str {
    match self {
      TermType::Label => "label",
      TermType::Description => "description",
      TermType::Alias => "alias",
    }
  }
}

impl fmt::Display for TermType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for TermType {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "label" => Ok(TermType::Label),
      "description" => Ok(TermType::Description),
      "alias" => Ok(TermType::Alias),
      other => Err(Error::UnknownTermType(other.to_owned())),
    }
  }
}

// ─── TermInLangId ────────────────────────────────────────────────────────────

/// Surrogate id of an interned (text, language, type) triple.
///
/// This is the id entities link to; the lower interning levels are private to
/// the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermInLangId(pub i64);

impl fmt::Display for TermInLangId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

// ─── TermSet ─────────────────────────────────────────────────────────────────

/// Texts grouped by term type and language.
///
/// Deserialises from JSON where each language maps to either one string or
/// an array of strings:
///
/// ```json
/// { "label": { "en": "cat" }, "alias": { "en": ["kitty", "puss"] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TermSet(BTreeMap<TermType, BTreeMap<Language, Vec<String>>>);

impl TermSet {
  pub fn new() -> Self { Self::default() }

  pub fn from_json(json: &str) -> Result<Self> { Ok(serde_json::from_str(json)?) }

  /// Append `text` to the texts of `term_type` in `language`.
  pub fn insert(
    &mut self,
    term_type: TermType,
    language:  impl Into<Language>,
    text:      impl Into<String>,
  ) {
    self
      .0
      .entry(term_type)
      .or_default()
      .entry(language.into())
      .or_default()
      .push(text.into());
  }

  /// Replace the texts of `term_type` in `language`. An empty `texts`
  /// removes the entry.
  pub fn set(&mut self, term_type: TermType, language: impl Into<Language>, texts: Vec<String>) {
    let language = language.into();
    if texts.is_empty() {
      if let Some(by_lang) = self.0.get_mut(&term_type) {
        by_lang.remove(&language);
        if by_lang.is_empty() {
          self.0.remove(&term_type);
        }
      }
      return;
    }
    self.0.entry(term_type).or_default().insert(language, texts);
  }

  pub fn with_label(mut self, language: impl Into<Language>, text: impl Into<String>) -> Self {
    self.set(TermType::Label, language, vec![text.into()]);
    self
  }

  pub fn with_description(
    mut self,
    language: impl Into<Language>,
    text:     impl Into<String>,
  ) -> Self {
    self.set(TermType::Description, language, vec![text.into()]);
    self
  }

  pub fn with_alias(mut self, language: impl Into<Language>, text: impl Into<String>) -> Self {
    self.insert(TermType::Alias, language, text);
    self
  }

  pub fn get(&self, term_type: TermType, language: &str) -> Option<&[String]> {
    self
      .0
      .get(&term_type)
      .and_then(|by_lang| by_lang.get(language))
      .map(Vec::as_slice)
  }

  /// `true` when the set holds no text at all, even if some type or
  /// language keys are present.
  pub fn is_empty(&self) -> bool {
    self.0.values().all(|by_lang| by_lang.values().all(Vec::is_empty))
  }

  /// Every `(type, language, texts)` entry, in key order.
  pub fn iter(&self) -> impl Iterator<Item = (TermType, &str, &[String])> + '_ {
    self.0.iter().flat_map(|(ty, by_lang)| {
      by_lang
        .iter()
        .map(move |(lang, texts)| (*ty, lang.as_str(), texts.as_slice()))
    })
  }

  /// Every text leaf across all types and languages. May repeat.
  pub fn texts(&self) -> impl Iterator<Item = &str> + '_ {
    self.iter().flat_map(|(_, _, texts)| texts.iter().map(String::as_str))
  }

  pub fn as_map(&self) -> &BTreeMap<TermType, BTreeMap<Language, Vec<String>>> { &self.0 }
}

impl From<BTreeMap<TermType, BTreeMap<Language, Vec<String>>>> for TermSet {
  fn from(map: BTreeMap<TermType, BTreeMap<Language, Vec<String>>>) -> Self { Self(map) }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
  One(String),
  Many(Vec<String>),
}

impl<'de> Deserialize<'de> for TermSet {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let raw = BTreeMap::<TermType, BTreeMap<Language, OneOrMany>>::deserialize(deserializer)?;
    let map = raw
      .into_iter()
      .map(|(ty, by_lang)| {
        let by_lang = by_lang
          .into_iter()
          .map(|(lang, texts)| {
            let texts = match texts {
              OneOrMany::One(text) => vec![text],
              OneOrMany::Many(texts) => texts,
            };
            (lang, texts)
          })
          .collect();
        (ty, by_lang)
      })
      .collect();
    Ok(Self(map))
  }
}

// ─── TermIds ─────────────────────────────────────────────────────────────────

/// Interned ids in the same `{type: {language: [...]}}` shape as the
/// [`TermSet`] that produced them. Position `i` of a list is the id of text
/// `i` of the matching input list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermIds(BTreeMap<TermType, BTreeMap<Language, Vec<TermInLangId>>>);

impl TermIds {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, term_type: TermType, language: impl Into<Language>, ids: Vec<TermInLangId>) {
    self.0.entry(term_type).or_default().insert(language.into(), ids);
  }

  pub fn get(&self, term_type: TermType, language: &str) -> Option<&[TermInLangId]> {
    self
      .0
      .get(&term_type)
      .and_then(|by_lang| by_lang.get(language))
      .map(Vec::as_slice)
  }

  /// All ids, sorted and de-duplicated.
  pub fn ids(&self) -> Vec<TermInLangId> {
    let mut ids: Vec<TermInLangId> = self
      .0
      .values()
      .flat_map(|by_lang| by_lang.values().flatten().copied())
      .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
  }

  pub fn is_empty(&self) -> bool {
    self.0.values().all(|by_lang| by_lang.values().all(Vec::is_empty))
  }

  pub fn as_map(&self) -> &BTreeMap<TermType, BTreeMap<Language, Vec<TermInLangId>>> { &self.0 }
}

//! Entity identity: the owners of term sets.
//!
//! The entity document itself lives elsewhere; the term store only needs the
//! kind (which junction table to use) and the numeric id.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// The kinds of entity that link to interned terms.
///
/// Each kind has its own junction table; a term id is only unused once no
/// kind references it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Item,
  Property,
}

impl EntityKind {
  pub const ALL: [EntityKind; 2] = [EntityKind::Item, EntityKind::Property];

  pub fn as_str(self) -> &'static str {
    match self {
      EntityKind::Item => "item",
      EntityKind::Property => "property",
    }
  }

  /// The letter that prefixes the numeric id in serialized form.
  pub fn prefix(self) -> char {
    match self {
      EntityKind::Item => 'Q',
      EntityKind::Property => 'P',
    }
  }

  fn from_prefix(c: char) -> Option<Self> {
    match c.to_ascii_uppercase() {
      'Q' => Some(EntityKind::Item),
      'P' => Some(EntityKind::Property),
      _ => None,
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for EntityKind {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "item" => Ok(EntityKind::Item),
      "property" => Ok(EntityKind::Property),
      other => Err(Error::UnknownEntityKind(other.to_owned())),
    }
  }
}

/// An entity reference such as `Q42` or `P31`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId {
  pub kind:    EntityKind,
  pub numeric: u32,
}

impl EntityId {
  pub fn new(kind: EntityKind, numeric: u32) -> Self { Self { kind, numeric } }

  pub fn item(numeric: u32) -> Self { Self::new(EntityKind::Item, numeric) }

  pub fn property(numeric: u32) -> Self { Self::new(EntityKind::Property, numeric) }
}

impl fmt::Display for EntityId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{}", self.kind.prefix(), self.numeric)
  }
}

impl FromStr for EntityId {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let invalid = || Error::InvalidEntityId(s.to_owned());

    let mut chars = s.chars();
    let kind = chars
      .next()
      .and_then(EntityKind::from_prefix)
      .ok_or_else(invalid)?;
    let digits = chars.as_str();
    if digits.is_empty() || digits.starts_with('0') {
      return Err(invalid());
    }
    let numeric = digits.parse::<u32>().map_err(|_| invalid())?;

    Ok(Self { kind, numeric })
  }
}

impl Serialize for EntityId {
  fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(self)
  }
}

impl<'de> Deserialize<'de> for EntityId {
  fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

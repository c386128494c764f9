//! Error types for `termstore-core`.

use thiserror::Error;

use crate::entity::EntityKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown term type: {0:?}")]
  UnknownTermType(String),

  #[error("unknown entity kind: {0:?}")]
  UnknownEntityKind(String),

  #[error("invalid entity id: {0:?}")]
  InvalidEntityId(String),

  /// A lookup specialised for one entity kind was handed another kind.
  #[error("lookup only supports {expected} entities, got {actual}")]
  UnsupportedEntityKind {
    expected: EntityKind,
    actual:   EntityKind,
  },

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

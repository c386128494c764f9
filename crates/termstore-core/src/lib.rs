//! Core types and trait definitions for the term store.
//!
//! Terms (labels, descriptions, aliases) are interned into small surrogate
//! ids by a storage backend (e.g. `termstore-sqlite`). This crate holds the
//! backend-independent vocabulary plus the batched read path built on top of
//! the [`store::TermStore`] trait. It has no database dependency.

// Trait methods spell out `Send` futures; implementations use `async fn`.
#![allow(async_fn_in_trait)]

pub mod entity;
pub mod error;
pub mod normalize;
pub mod prefetch;
pub mod store;
pub mod term;

pub use error::{Error, Result};

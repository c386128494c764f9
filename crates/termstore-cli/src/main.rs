//! `termstore`: command-line access to a term store.
//!
//! Reads `termstore.toml` (or the path given with `--config`), layered with
//! `TERMSTORE_*` environment variables, opens the SQLite store and runs one
//! subcommand. Results are printed as JSON.
//!
//! ```
//! termstore intern '{"label": {"en": "cat"}}'
//! termstore store Q42 '{"label": {"en": "cat"}, "alias": {"en": ["kitty", "puss"]}}'
//! termstore show Q42 P31 --language en --type label
//! termstore delete Q42
//! ```

use std::{
  collections::BTreeMap,
  io::Read as _,
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Serialize;
use termstore_core::{
  entity::{EntityId, EntityKind},
  prefetch::{Prefetched, PrefetchingTermLookup},
  store::TermStore,
  term::{Language, TermInLangId, TermSet, TermType},
};
use termstore_sqlite::{SqliteTermStore, StoreConfig};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "termstore", version, about = "Intern, link and clean up entity terms")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "termstore.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Intern a term set without linking it to any entity.
  Intern {
    /// Term set as JSON (`{"label": {"en": "cat"}}`), or `-` for stdin.
    terms: String,
  },
  /// Replace the terms of an entity.
  Store {
    entity: EntityId,
    /// Term set as JSON, or `-` for stdin.
    terms:  String,
  },
  /// Remove every term of an entity.
  Delete { entity: EntityId },
  /// Delete the given term ids if no entity uses them.
  Clean {
    #[arg(required = true)]
    ids: Vec<i64>,
  },
  /// Print the terms of some entities.
  Show {
    #[arg(required = true)]
    entities:  Vec<EntityId>,
    /// Term types to show; all of them when omitted.
    #[arg(short = 't', long = "type")]
    types:     Vec<TermType>,
    #[arg(short, long = "language", required = true)]
    languages: Vec<Language>,
  },
  /// Print row counts per table.
  Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("TERMSTORE").try_parsing(true))
    .build()
    .context("failed to read config file")?;

  let mut store_cfg: StoreConfig = settings
    .try_deserialize()
    .context("failed to deserialise StoreConfig")?;
  store_cfg.path = expand_tilde(&store_cfg.path);
  store_cfg.replica_path = store_cfg.replica_path.as_deref().map(expand_tilde);

  let store = SqliteTermStore::open(&store_cfg)
    .await
    .with_context(|| format!("failed to open store at {:?}", store_cfg.path))?;

  match cli.command {
    Command::Intern { terms } => {
      let terms = read_terms(&terms)?;
      let acquired = store.acquire_term_in_lang_ids(&terms).await?;
      warn_on_mismatch(acquired.mismatch.is_some());
      print_json(&acquired)
    }
    Command::Store { entity, terms } => {
      let terms = read_terms(&terms)?;
      let acquired = store.store_entity_terms(entity, &terms).await?;
      warn_on_mismatch(acquired.mismatch.is_some());
      tracing::info!(%entity, ids = acquired.ids.ids().len(), "stored");
      print_json(&acquired)
    }
    Command::Delete { entity } => {
      let report = store.delete_entity_terms(entity).await?;
      tracing::info!(%entity, cleaned = report.term_in_lang.len(), "deleted");
      print_json(&report)
    }
    Command::Clean { ids } => {
      let ids: Vec<TermInLangId> = ids.into_iter().map(TermInLangId).collect();
      let report = store.clean_term_in_lang_ids(&ids).await?;
      print_json(&report)
    }
    Command::Show { entities, types, languages } => {
      let types = if types.is_empty() { TermType::ALL.to_vec() } else { types };
      let shown = show(Arc::new(store), &entities, &types, &languages).await?;
      print_json(&shown)
    }
    Command::Stats => print_json(&store.row_counts().await?),
  }
}

// ─── Show ────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Shown {
  entity: EntityId,
  terms:  TermSet,
}

/// Prefetch every requested term with one lookup per entity kind, then read
/// the buffers back in input order.
async fn show(
  store:     Arc<SqliteTermStore>,
  entities:  &[EntityId],
  types:     &[TermType],
  languages: &[Language],
) -> anyhow::Result<Vec<Shown>> {
  let mut lookups = BTreeMap::new();
  for kind in EntityKind::ALL {
    let of_kind: Vec<EntityId> = entities.iter().copied().filter(|e| e.kind == kind).collect();
    if of_kind.is_empty() {
      continue;
    }
    let mut lookup = PrefetchingTermLookup::new(store.clone(), kind);
    lookup.prefetch_terms(&of_kind, types, languages).await?;
    lookups.insert(kind, lookup);
  }

  let mut shown = Vec::with_capacity(entities.len());
  for entity in entities {
    let Some(lookup) = lookups.get(&entity.kind) else { continue };
    let mut terms = TermSet::new();
    for ty in types {
      for lang in languages {
        let texts = match ty {
          TermType::Alias => lookup.get_prefetched_aliases(*entity, lang)?.unwrap_or_default(),
          _ => match lookup.get_prefetched_term(*entity, *ty, lang)? {
            Prefetched::Found(text) => vec![text],
            Prefetched::Absent | Prefetched::NotPrefetched => Vec::new(),
          },
        };
        terms.set(*ty, lang.clone(), texts);
      }
    }
    shown.push(Shown { entity: *entity, terms });
  }
  Ok(shown)
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Parse a term set from `arg`, reading stdin when it is `-`.
fn read_terms(arg: &str) -> anyhow::Result<TermSet> {
  let json = if arg == "-" {
    let mut buf = String::new();
    std::io::stdin()
      .read_to_string(&mut buf)
      .context("failed to read terms from stdin")?;
    buf
  } else {
    arg.to_owned()
  };
  TermSet::from_json(&json).context("invalid term set JSON")
}

fn warn_on_mismatch(mismatch: bool) {
  if mismatch {
    tracing::warn!("some deleted term ids could not be restored; fresh ids were assigned");
  }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

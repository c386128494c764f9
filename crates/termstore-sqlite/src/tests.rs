//! Integration tests for `SqliteTermStore` against in-memory databases.

use std::{cell::RefCell, sync::Arc};

use termstore_core::{
  entity::EntityId,
  normalize::MAX_TEXT_BYTES,
  prefetch::{Prefetched, PrefetchingTermLookup},
  store::TermStore,
  term::{TermInLangId, TermSet, TermType},
};
use tokio_rusqlite::Connection;

use crate::{
  Connections, Error, RowCounts, SqliteTermStore, TermInLangIdsResolver, TypeIds,
  schema::SCHEMA,
};

async fn store() -> SqliteTermStore {
  SqliteTermStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn cat() -> TermSet { TermSet::new().with_label("en", "cat") }

fn only_id(ids: &[TermInLangId]) -> TermInLangId {
  assert_eq!(ids.len(), 1, "expected exactly one id, got {ids:?}");
  ids[0]
}

async fn counts(s: &SqliteTermStore) -> RowCounts { s.row_counts().await.unwrap() }

/// Junction rows pointing at a `term_in_lang` row that does not exist.
async fn dangling_links(s: &SqliteTermStore) -> i64 {
  s.connections()
    .primary()
    .call(|conn| {
      Ok(conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM item_terms
             WHERE term_in_lang_id NOT IN (SELECT id FROM term_in_lang))
         + (SELECT COUNT(*) FROM property_terms
             WHERE term_in_lang_id NOT IN (SELECT id FROM term_in_lang))",
        [],
        |row| row.get(0),
      )?)
    })
    .await
    .unwrap()
}

/// Lower-level rows pointing at a parent row that does not exist.
async fn broken_chains(s: &SqliteTermStore) -> i64 {
  s.connections()
    .primary()
    .call(|conn| {
      Ok(conn.query_row(
        "SELECT
           (SELECT COUNT(*) FROM text_in_lang
             WHERE text_id NOT IN (SELECT id FROM text))
         + (SELECT COUNT(*) FROM term_in_lang
             WHERE text_in_lang_id NOT IN (SELECT id FROM text_in_lang))",
        [],
        |row| row.get(0),
      )?)
    })
    .await
    .unwrap()
}

async fn term_exists(s: &SqliteTermStore, id: TermInLangId) -> bool {
  s.connections()
    .primary()
    .call(move |conn| {
      Ok(conn.query_row(
        "SELECT COUNT(*) FROM term_in_lang WHERE id = ?1",
        rusqlite::params![id.0],
        |row| row.get::<_, i64>(0),
      )? == 1)
    })
    .await
    .unwrap()
}

// ─── Interning ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn cat_on_empty_store_creates_one_row_per_level() {
  let s = store().await;

  let first = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let id = only_id(first.ids.get(TermType::Label, "en").unwrap());
  assert!(first.mismatch.is_none());
  assert_eq!(counts(&s).await, RowCounts {
    text: 1,
    text_in_lang: 1,
    term_in_lang: 1,
    ..RowCounts::default()
  });

  let second = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  assert_eq!(only_id(second.ids.get(TermType::Label, "en").unwrap()), id);
  assert_eq!(counts(&s).await.term_in_lang, 1);
  assert_eq!(counts(&s).await.text, 1);
}

#[tokio::test]
async fn acquisition_is_idempotent() {
  let s = store().await;
  let terms = TermSet::new()
    .with_label("en", "cat")
    .with_label("de", "Katze")
    .with_description("en", "domesticated feline")
    .with_alias("en", "kitty")
    .with_alias("en", "puss");

  let first = s.acquire_term_in_lang_ids(&terms).await.unwrap();
  let before = counts(&s).await;
  let second = s.acquire_term_in_lang_ids(&terms).await.unwrap();

  assert_eq!(first, second);
  assert_eq!(counts(&s).await, before);
  assert_eq!(first.ids.ids().len(), 5);
}

#[tokio::test]
async fn same_text_is_shared_across_types_and_languages() {
  let s = store().await;
  let terms = TermSet::new()
    .with_label("en", "cat")
    .with_alias("en", "cat")
    .with_label("fr", "cat");

  let acquired = s.acquire_term_in_lang_ids(&terms).await.unwrap();

  let c = counts(&s).await;
  assert_eq!(c.text, 1);
  assert_eq!(c.text_in_lang, 2);
  assert_eq!(c.term_in_lang, 3);

  let label_en = only_id(acquired.ids.get(TermType::Label, "en").unwrap());
  let alias_en = only_id(acquired.ids.get(TermType::Alias, "en").unwrap());
  let label_fr = only_id(acquired.ids.get(TermType::Label, "fr").unwrap());
  assert_ne!(label_en, alias_en);
  assert_ne!(label_en, label_fr);
}

#[tokio::test]
async fn ids_keep_the_input_shape() {
  let s = store().await;
  let terms = TermSet::new()
    .with_alias("en", "kitty")
    .with_alias("en", "puss")
    .with_alias("en", "kitty");

  let acquired = s.acquire_term_in_lang_ids(&terms).await.unwrap();
  let aliases = acquired.ids.get(TermType::Alias, "en").unwrap();

  assert_eq!(aliases.len(), 3);
  assert_eq!(aliases[0], aliases[2]);
  assert_ne!(aliases[0], aliases[1]);
  assert_eq!(acquired.ids.ids().len(), 2);
}

#[tokio::test]
async fn texts_sharing_a_truncated_prefix_collapse() {
  let s = store().await;
  let prefix = "x".repeat(MAX_TEXT_BYTES);
  let terms = TermSet::new()
    .with_label("en", format!("{prefix}-first"))
    .with_description("en", format!("{prefix}-second"));

  let acquired = s.acquire_term_in_lang_ids(&terms).await.unwrap();

  let c = counts(&s).await;
  assert_eq!(c.text, 1);
  assert_eq!(c.text_in_lang, 1);
  // Different types still get different term ids.
  assert_eq!(c.term_in_lang, 2);
  assert_eq!(acquired.ids.ids().len(), 2);

  let stored: String = s
    .connections()
    .primary()
    .call(|conn| Ok(conn.query_row("SELECT value FROM text", [], |row| row.get(0))?))
    .await
    .unwrap();
  assert_eq!(stored, prefix);
}

#[tokio::test]
async fn empty_input_still_runs_callback() {
  let s = store().await;
  let seen = RefCell::new(None);

  let acquired = s
    .pipeline()
    .acquire_term_in_lang_ids_with(&TermSet::new(), |ids| {
      *seen.borrow_mut() = Some(ids);
      async { Ok(()) }
    })
    .await
    .unwrap();

  assert!(acquired.ids.is_empty());
  assert_eq!(seen.into_inner(), Some(vec![]));
  assert_eq!(counts(&s).await, RowCounts::default());
}

#[tokio::test]
async fn callback_receives_deduplicated_ids() {
  let s = store().await;
  let terms = TermSet::new().with_label("en", "cat").with_alias("en", "cat");
  let seen = RefCell::new(Vec::new());

  let acquired = s
    .pipeline()
    .acquire_term_in_lang_ids_with(&terms, |ids| {
      *seen.borrow_mut() = ids;
      async { Ok(()) }
    })
    .await
    .unwrap();

  assert_eq!(seen.into_inner(), acquired.ids.ids());
}

#[tokio::test]
async fn callback_error_propagates() {
  let s = store().await;

  let err = s
    .pipeline()
    .acquire_term_in_lang_ids_with(&cat(), |_| async { Err(Error::InvalidBatchSize(0)) })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidBatchSize(0)));
}

#[tokio::test]
async fn batch_size_of_one_still_interns_everything() {
  let conns = Connections::open_in_memory().await.unwrap();
  let s = SqliteTermStore::with_connections(conns, 1).await.unwrap();

  let mut terms = TermSet::new();
  for i in 0..12 {
    terms.insert(TermType::Alias, "en", format!("alias {i}"));
    terms.insert(TermType::Label, format!("l{i}"), "same");
  }

  let first = s.acquire_term_in_lang_ids(&terms).await.unwrap();
  let second = s.acquire_term_in_lang_ids(&terms).await.unwrap();
  assert_eq!(first, second);
  assert_eq!(first.ids.ids().len(), 24);

  let c = counts(&s).await;
  assert_eq!(c.text, 13);
  assert_eq!(c.text_in_lang, 24);
}

#[tokio::test]
async fn zero_batch_size_is_rejected() {
  let conns = Connections::open_in_memory().await.unwrap();
  let err = SqliteTermStore::with_connections(conns, 0)
    .await
    .err()
    .expect("batch size 0 must be rejected");
  assert!(matches!(err, Error::InvalidBatchSize(0)));
}

#[tokio::test]
async fn resolver_rejects_zero_batch_size() {
  let s = store().await;
  let type_ids = Arc::new(s.type_ids().clone());
  let err = TermInLangIdsResolver::new(s.connections().clone(), type_ids, 0)
    .err()
    .expect("batch size 0 must be rejected");
  assert!(matches!(err, Error::InvalidBatchSize(0)));
}

// ─── Type codes ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn migrated_type_codes_are_honoured() {
  let conns = Connections::open_in_memory().await.unwrap();
  conns
    .primary()
    .call(|conn| {
      conn.execute_batch(
        "INSERT INTO type_codes (id, name) VALUES (1, 'alias');
         INSERT INTO type_codes (id, name) VALUES (7, 'label');",
      )?;
      Ok(())
    })
    .await
    .unwrap();

  let s = SqliteTermStore::with_connections(conns, 100).await.unwrap();
  assert_eq!(s.type_ids().type_id(TermType::Alias).unwrap(), 1);
  assert_eq!(s.type_ids().type_id(TermType::Label).unwrap(), 7);
  // A fresh code; ignored inserts may still have consumed sequence values.
  let description = s.type_ids().type_id(TermType::Description).unwrap();
  assert!(description > 7, "got {description}");

  s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let type_id: i64 = s
    .connections()
    .primary()
    .call(|conn| Ok(conn.query_row("SELECT type_id FROM term_in_lang", [], |row| row.get(0))?))
    .await
    .unwrap();
  assert_eq!(type_id, 7);
}

#[test]
fn unknown_type_codes_are_errors() {
  let type_ids = TypeIds::from_pairs([(TermType::Label, 1)]);
  assert_eq!(type_ids.term_type(1).unwrap(), TermType::Label);
  assert!(matches!(type_ids.term_type(5), Err(Error::UnknownTypeId(5))));
  assert!(matches!(
    type_ids.type_id(TermType::Alias),
    Err(Error::MissingTypeId(TermType::Alias))
  ));
}

// ─── Cleanup ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn deleting_the_only_user_cascades_all_levels() {
  let s = store().await;
  s.store_entity_terms(EntityId::item(1), &cat()).await.unwrap();

  let report = s.delete_entity_terms(EntityId::item(1)).await.unwrap();
  assert_eq!(report.term_in_lang.len(), 1);
  assert_eq!(report.text_in_lang.len(), 1);
  assert_eq!(report.text.len(), 1);
  assert_eq!(counts(&s).await, RowCounts::default());
}

#[tokio::test]
async fn shared_terms_survive_one_entity_leaving() {
  let s = store().await;
  let a = s.store_entity_terms(EntityId::item(1), &cat()).await.unwrap();
  let b = s.store_entity_terms(EntityId::item(2), &cat()).await.unwrap();
  assert_eq!(a.ids, b.ids);

  let report = s.delete_entity_terms(EntityId::item(1)).await.unwrap();
  assert!(report.is_empty());

  let c = counts(&s).await;
  assert_eq!((c.text, c.text_in_lang, c.term_in_lang, c.item_terms), (1, 1, 1, 1));
}

#[tokio::test]
async fn ids_used_by_another_entity_kind_are_kept() {
  let s = store().await;
  let item = s.store_entity_terms(EntityId::item(1), &cat()).await.unwrap();
  s.store_entity_terms(EntityId::property(1), &cat()).await.unwrap();
  let id = only_id(&item.ids.ids());

  s.delete_entity_terms(EntityId::item(1)).await.unwrap();
  let report = s.clean_term_in_lang_ids(&[id]).await.unwrap();
  assert!(report.is_empty());
  assert!(term_exists(&s, id).await);

  s.delete_entity_terms(EntityId::property(1)).await.unwrap();
  assert!(!term_exists(&s, id).await);
  assert_eq!(counts(&s).await, RowCounts::default());
}

#[tokio::test]
async fn cascade_stops_at_rows_still_referenced() {
  let s = store().await;
  // Same text in one language as two types, and in a second language.
  s.store_entity_terms(EntityId::item(1), &TermSet::new().with_label("en", "cat"))
    .await
    .unwrap();
  s.store_entity_terms(EntityId::item(2), &TermSet::new().with_alias("en", "cat"))
    .await
    .unwrap();
  s.store_entity_terms(EntityId::item(3), &TermSet::new().with_label("de", "cat"))
    .await
    .unwrap();

  let report = s.delete_entity_terms(EntityId::item(1)).await.unwrap();
  assert_eq!(report.term_in_lang.len(), 1);
  assert!(report.text_in_lang.is_empty());
  assert!(report.text.is_empty());

  let report = s.delete_entity_terms(EntityId::item(2)).await.unwrap();
  assert_eq!(report.term_in_lang.len(), 1);
  assert_eq!(report.text_in_lang.len(), 1);
  assert!(report.text.is_empty());

  let c = counts(&s).await;
  assert_eq!((c.text, c.text_in_lang, c.term_in_lang), (1, 1, 1));

  let report = s.delete_entity_terms(EntityId::item(3)).await.unwrap();
  assert_eq!(report.text.len(), 1);
  assert_eq!(counts(&s).await, RowCounts::default());
}

#[tokio::test]
async fn cleaning_twice_is_a_no_op() {
  let s = store().await;
  let acquired = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let ids = acquired.ids.ids();

  let first = s.clean_term_in_lang_ids(&ids).await.unwrap();
  assert_eq!(first.term_in_lang, ids);

  let second = s.clean_term_in_lang_ids(&ids).await.unwrap();
  assert!(second.is_empty());
}

#[tokio::test]
async fn cleaning_unknown_or_no_ids_is_harmless() {
  let s = store().await;
  assert!(s.clean_term_in_lang_ids(&[]).await.unwrap().is_empty());
  assert!(s.clean_term_in_lang_ids(&[TermInLangId(404)]).await.unwrap().is_empty());
}

#[tokio::test]
async fn changing_terms_cleans_only_what_the_entity_dropped() {
  let s = store().await;
  let q1 = EntityId::item(1);
  let old = TermSet::new().with_label("en", "cat").with_description("en", "animal");
  let new = TermSet::new().with_label("en", "dog").with_description("en", "animal");

  let before = s.store_entity_terms(q1, &old).await.unwrap();
  let after = s.store_entity_terms(q1, &new).await.unwrap();

  let description = before.ids.get(TermType::Description, "en").unwrap();
  assert_eq!(after.ids.get(TermType::Description, "en").unwrap(), description);

  let c = counts(&s).await;
  assert_eq!((c.text, c.term_in_lang, c.item_terms), (2, 2, 2));

  let linked = s.get_term_in_lang_ids(&[q1]).await.unwrap();
  assert_eq!(linked[&q1], after.ids.ids());
  assert_eq!(dangling_links(&s).await, 0);
}

#[tokio::test]
async fn no_link_ever_dangles() {
  let s = store().await;
  let sets = [
    cat(),
    TermSet::new().with_label("en", "cat").with_alias("en", "kitty"),
    TermSet::new().with_alias("en", "kitty"),
    TermSet::new(),
    TermSet::new().with_label("en", "dog"),
  ];

  for (round, terms) in sets.iter().enumerate() {
    s.store_entity_terms(EntityId::item(1), terms).await.unwrap();
    s.store_entity_terms(EntityId::property(2), &sets[(round + 1) % sets.len()])
      .await
      .unwrap();
    assert_eq!(dangling_links(&s).await, 0, "round {round}");
  }

  s.delete_entity_terms(EntityId::item(1)).await.unwrap();
  s.delete_entity_terms(EntityId::property(2)).await.unwrap();
  assert_eq!(counts(&s).await, RowCounts::default());
}

// ─── Replica lag ─────────────────────────────────────────────────────────────

/// A primary and a separate, manually synced replica.
async fn lagging_pair() -> (Connection, Connection, SqliteTermStore) {
  let primary = Connection::open_in_memory().await.unwrap();
  let replica = Connection::open_in_memory().await.unwrap();
  replica
    .call(|conn| {
      conn.execute_batch(SCHEMA)?;
      Ok(())
    })
    .await
    .unwrap();

  let conns = Connections::with_replica(primary.clone(), replica.clone())
    .await
    .unwrap();
  let s = SqliteTermStore::with_connections(conns, 100).await.unwrap();
  (primary, replica, s)
}

/// A store reading and writing `primary` only, like a second writer without
/// a replica.
async fn direct_store(primary: &Connection) -> SqliteTermStore {
  let conns = Connections::with_replica(primary.clone(), primary.clone())
    .await
    .unwrap();
  SqliteTermStore::with_connections(conns, 100).await.unwrap()
}

/// Copy the interning tables from `primary` to `replica`.
async fn sync_replica(primary: &Connection, replica: &Connection) {
  let rows: Vec<(i64, String, i64, i64, String, i64, i64, i64)> = primary
    .call(|conn| {
      let mut stmt = conn.prepare(
        "SELECT t.id, t.value, til.id, til.text_id, til.language,
                tl.id, tl.text_in_lang_id, tl.type_id
         FROM term_in_lang tl
         JOIN text_in_lang til ON til.id = tl.text_in_lang_id
         JOIN text         t   ON t.id   = til.text_id",
      )?;
      let rows = stmt
        .query_map([], |r| {
          Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?, r.get(6)?, r.get(7)?))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(rows)
    })
    .await
    .unwrap();

  replica
    .call(move |conn| {
      for (t_id, value, til_id, text_id, language, tl_id, til_ref, type_id) in rows {
        conn.execute(
          "INSERT OR IGNORE INTO text (id, value) VALUES (?1, ?2)",
          rusqlite::params![t_id, value],
        )?;
        conn.execute(
          "INSERT OR IGNORE INTO text_in_lang (id, text_id, language) VALUES (?1, ?2, ?3)",
          rusqlite::params![til_id, text_id, language],
        )?;
        conn.execute(
          "INSERT OR IGNORE INTO term_in_lang (id, text_in_lang_id, type_id) VALUES (?1, ?2, ?3)",
          rusqlite::params![tl_id, til_ref, type_id],
        )?;
      }
      Ok(())
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn id_deleted_behind_a_stale_replica_is_restored() {
  let (primary, replica, s) = lagging_pair().await;

  let original = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let id = only_id(&original.ids.ids());
  sync_replica(&primary, &replica).await;

  // A cleanup on the primary the replica has not seen yet.
  s.clean_term_in_lang_ids(&[id]).await.unwrap();
  assert!(!term_exists(&s, id).await);

  let again = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  assert!(again.mismatch.is_none());
  assert_eq!(again.ids, original.ids);
  assert!(term_exists(&s, id).await);

  // The restored row points at the re-created text on the primary.
  let (value, language, type_id): (String, String, i64) = primary
    .call(move |conn| {
      Ok(conn.query_row(
        "SELECT t.value, til.language, tl.type_id
         FROM term_in_lang tl
         JOIN text_in_lang til ON til.id = tl.text_in_lang_id
         JOIN text         t   ON t.id   = til.text_id
         WHERE tl.id = ?1",
        rusqlite::params![id.0],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(value, "cat");
  assert_eq!(language, "en");
  assert_eq!(type_id, s.type_ids().type_id(TermType::Label).unwrap());
}

#[tokio::test]
async fn restore_mismatch_is_reported_not_raised() {
  let (primary, replica, s) = lagging_pair().await;

  let original = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let old_id = only_id(&original.ids.ids());
  sync_replica(&primary, &replica).await;
  s.clean_term_in_lang_ids(&[old_id]).await.unwrap();

  // Another writer re-interns the same term straight on the primary.
  let direct = direct_store(&primary).await;
  let fresh = direct.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let new_id = only_id(&fresh.ids.ids());
  assert_ne!(new_id, old_id);

  let raced = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  assert_eq!(only_id(&raced.ids.ids()), new_id);

  let mismatch = raced.mismatch.clone().expect("mismatch must be reported");
  assert_eq!(mismatch.ids_to_restore, vec![old_id]);
  assert_eq!(mismatch.records_to_insert, 0);

  let warning = raced.into_result().unwrap_err();
  assert_eq!(warning.ids.ids(), vec![new_id]);
}

#[tokio::test]
async fn entity_links_follow_a_failed_restore() {
  let (primary, replica, s) = lagging_pair().await;
  let q1 = EntityId::item(1);

  let original = s.acquire_term_in_lang_ids(&cat()).await.unwrap();
  let old_id = only_id(&original.ids.ids());
  sync_replica(&primary, &replica).await;
  s.clean_term_in_lang_ids(&[old_id]).await.unwrap();

  let direct = direct_store(&primary).await;
  direct.acquire_term_in_lang_ids(&cat()).await.unwrap();

  let stored = s.store_entity_terms(q1, &cat()).await.unwrap();
  assert!(stored.mismatch.is_some());

  // Junction rows only exist on the primary.
  let linked = direct.get_term_in_lang_ids(&[q1]).await.unwrap();
  assert_eq!(linked[&q1], stored.ids.ids());
  assert_eq!(dangling_links(&s).await, 0);
}

#[tokio::test]
async fn text_cleaned_behind_a_stale_replica_is_not_built_upon() {
  let (primary, replica, s) = lagging_pair().await;
  let q1 = EntityId::item(1);
  let q2 = EntityId::item(2);

  s.store_entity_terms(q1, &cat()).await.unwrap();
  sync_replica(&primary, &replica).await;
  // Removes the text row on the primary; the replica still has it.
  s.delete_entity_terms(q1).await.unwrap();

  let french = TermSet::new().with_label("fr", "cat");
  let stored = s.store_entity_terms(q2, &french).await.unwrap();
  assert!(stored.mismatch.is_none());

  assert_eq!(broken_chains(&s).await, 0);
  assert_eq!(dangling_links(&s).await, 0);
  let c = counts(&s).await;
  assert_eq!((c.text, c.text_in_lang, c.term_in_lang, c.item_terms), (1, 1, 1, 1));

  let direct = direct_store(&primary).await;
  let groups = direct.get_term_in_lang_ids(&[q2]).await.unwrap();
  assert_eq!(groups[&q2], stored.ids.ids());
  let resolved = direct
    .resolve_grouped_term_in_lang_ids(groups, &[], &[])
    .await
    .unwrap();
  assert_eq!(resolved[&q2], french);
}

#[tokio::test]
async fn text_in_lang_cleaned_behind_a_stale_replica_is_not_built_upon() {
  let (primary, replica, s) = lagging_pair().await;

  s.store_entity_terms(EntityId::item(1), &cat()).await.unwrap();
  sync_replica(&primary, &replica).await;
  s.delete_entity_terms(EntityId::item(1)).await.unwrap();

  // Same text and language, new type: only the term_in_lang row is new.
  let alias = TermSet::new().with_alias("en", "cat");
  let stored = s.store_entity_terms(EntityId::item(2), &alias).await.unwrap();
  assert!(stored.mismatch.is_none());

  assert_eq!(broken_chains(&s).await, 0);
  let resolved = direct_store(&primary)
    .await
    .resolver()
    .resolve_term_in_lang_ids(&stored.ids.ids(), &[], &[])
    .await
    .unwrap();
  assert_eq!(resolved, alias);
}

// ─── Resolution ──────────────────────────────────────────────────────────────

fn full_terms() -> TermSet {
  TermSet::new()
    .with_label("en", "cat")
    .with_label("de", "Katze")
    .with_description("en", "domesticated feline")
    .with_alias("en", "kitty")
    .with_alias("en", "puss")
}

#[tokio::test]
async fn grouped_resolution_filters_types_and_languages() {
  let s = store().await;
  let q1 = EntityId::item(1);
  let q2 = EntityId::item(2);
  s.store_entity_terms(q1, &full_terms()).await.unwrap();
  s.store_entity_terms(q2, &TermSet::new().with_label("de", "Hund"))
    .await
    .unwrap();

  let groups = s.get_term_in_lang_ids(&[q1, q2]).await.unwrap();
  assert_eq!(groups[&q1].len(), 5);

  let everything = s
    .resolve_grouped_term_in_lang_ids(groups.clone(), &[], &[])
    .await
    .unwrap();
  let mut aliases = everything[&q1].get(TermType::Alias, "en").unwrap().to_vec();
  aliases.sort();
  assert_eq!(aliases, ["kitty", "puss"]);

  let english_labels = s
    .resolve_grouped_term_in_lang_ids(groups, &[TermType::Label], &["en".to_owned()])
    .await
    .unwrap();
  assert_eq!(english_labels[&q1], TermSet::new().with_label("en", "cat"));
  // Q2 has no English label, so it has no entry at all.
  assert!(!english_labels.contains_key(&q2));
}

#[tokio::test]
async fn entities_without_links_are_absent() {
  let s = store().await;
  let groups = s.get_term_in_lang_ids(&[EntityId::item(9)]).await.unwrap();
  assert!(groups.is_empty());
}

// ─── Prefetching ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn prefetch_distinguishes_absent_from_not_fetched() {
  let s = store().await;
  let q1 = EntityId::item(1);
  let q2 = EntityId::item(2);
  s.store_entity_terms(q1, &full_terms()).await.unwrap();
  s.store_entity_terms(q2, &TermSet::new().with_description("en", "a dog"))
    .await
    .unwrap();

  let mut lookup = PrefetchingTermLookup::for_items(Arc::new(s));
  assert_eq!(
    lookup.get_prefetched_term(q1, TermType::Label, "en").unwrap(),
    Prefetched::NotPrefetched
  );

  lookup
    .prefetch_terms(&[q1, q2], &[TermType::Label, TermType::Alias], &["en".to_owned()])
    .await
    .unwrap();

  assert_eq!(
    lookup.get_prefetched_term(q1, TermType::Label, "en").unwrap(),
    Prefetched::Found("cat".into())
  );
  assert_eq!(
    lookup.get_prefetched_term(q2, TermType::Label, "en").unwrap(),
    Prefetched::Absent
  );
  // Not requested, so not fetched even though the entity has it.
  assert_eq!(
    lookup.get_prefetched_term(q1, TermType::Label, "de").unwrap(),
    Prefetched::NotPrefetched
  );
  assert_eq!(
    lookup.get_prefetched_term(q2, TermType::Description, "en").unwrap(),
    Prefetched::NotPrefetched
  );

  let mut aliases = lookup.get_prefetched_aliases(q1, "en").unwrap().unwrap();
  aliases.sort();
  assert_eq!(aliases, ["kitty", "puss"]);
  assert_eq!(lookup.get_prefetched_aliases(q2, "en").unwrap(), Some(vec![]));
  assert_eq!(lookup.get_prefetched_aliases(q1, "de").unwrap(), None);
}

#[tokio::test]
async fn prefetch_fetches_on_demand() {
  let s = store().await;
  let q1 = EntityId::item(1);
  s.store_entity_terms(q1, &full_terms()).await.unwrap();

  let mut lookup = PrefetchingTermLookup::for_items(Arc::new(s));
  assert_eq!(lookup.get_label(q1, "de").await.unwrap().as_deref(), Some("Katze"));
  assert_eq!(
    lookup.get_description(q1, "en").await.unwrap().as_deref(),
    Some("domesticated feline")
  );
  assert_eq!(lookup.get_description(q1, "de").await.unwrap(), None);
  assert_eq!(lookup.get_aliases(q1, "en").await.unwrap().len(), 2);
}

#[tokio::test]
async fn prefetch_rejects_foreign_entity_kinds() {
  let s = store().await;
  let mut lookup = PrefetchingTermLookup::for_items(Arc::new(s));
  let p1 = EntityId::property(1);

  let err = lookup
    .prefetch_terms(&[EntityId::item(1), p1], &[TermType::Label], &["en".to_owned()])
    .await
    .unwrap_err();
  assert!(matches!(err, termstore_core::Error::UnsupportedEntityKind { .. }));

  assert!(lookup.get_prefetched_term(p1, TermType::Label, "en").is_err());
  assert!(lookup.get_prefetched_aliases(p1, "en").is_err());
}

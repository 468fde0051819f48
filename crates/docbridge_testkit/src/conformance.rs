//! Behavior every backend must share.
//!
//! Each scenario works in its own freshly named collection, so the suite
//! can run against a shared server. Scenarios panic on the first
//! divergence.

use crate::fixtures::scenarios::unique_collection;
use docbridge_core::{
    record, Database, DbError, Document, FindOptions, IndexDefinition, Sort, Value, WriteAction,
    ID_FIELD,
};
use futures::future::join_all;
use tracing::info;

fn id_of(record: &Document) -> Value {
    record
        .get(ID_FIELD)
        .cloned()
        .expect("created record carries an id")
}

fn by_id(record: &Document) -> Document {
    record! { ID_FIELD => id_of(record) }
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// `create_one` then `find_one` by the returned id yields the same data.
pub async fn round_trip(db: &dyn Database) {
    let collection = unique_collection(db, "round_trip");
    let input = record! {
        "name" => "widget",
        "count" => 3,
        "ratio" => 0.5,
        "active" => true,
        "tags" => vec!["a", "b"],
        "dims" => record! { "w" => 2, "h" => 4 },
    };

    let created = db.create_one(&collection, input.clone()).await.unwrap();
    let found = db
        .find_one(&collection, &by_id(&created), &FindOptions::new())
        .await
        .unwrap()
        .expect("created record is found by id");

    assert_eq!(found, created);
    let mut without_id = found;
    without_id.remove(ID_FIELD);
    assert_eq!(without_id, input);
}

/// Undefined and null both read back as null and match a null lookup.
pub async fn null_fidelity(db: &dyn Database) {
    let collection = unique_collection(db, "nulls");
    let undefined: Option<i64> = None;
    db.create(
        &collection,
        vec![
            record! { "label" => "undefined", "value" => undefined },
            record! { "label" => "null", "value" => Value::Null },
            record! { "label" => "set", "value" => 1 },
        ],
    )
    .await
    .unwrap();

    for label in ["undefined", "null"] {
        let found = db
            .find_one(&collection, &record! { "label" => label }, &FindOptions::new())
            .await
            .unwrap()
            .expect("record exists");
        assert_eq!(found.get("value"), Some(&Value::Null), "label {label}");
    }

    let nulls = db
        .count(&collection, &record! { "value" => Value::Null })
        .await
        .unwrap();
    assert_eq!(nulls, 2);
}

/// Singular update of nothing fails; upsert with the same arguments creates.
pub async fn not_found_semantics(db: &dyn Database) {
    let collection = unique_collection(db, "not_found");
    let missing = record! { ID_FIELD => db.generate_id() };
    let update = record! { "name" => "x" };

    match db.update_one(&collection, &missing, &update).await {
        Err(DbError::RecordNotFound { query, .. }) => assert_eq!(query, missing),
        other => panic!("expected RECORD_NOT_FOUND, got {other:?}"),
    }
    assert!(db
        .find_one(&collection, &missing, &FindOptions::new())
        .await
        .unwrap()
        .is_none());
    assert!(!db.delete_one(&collection, &missing).await.unwrap());
    assert_eq!(db.delete(&collection, &missing).await.unwrap(), 0);
    assert_eq!(db.update(&collection, &missing, &update).await.unwrap(), 0);

    let created = db.upsert_one(&collection, &missing, &update).await.unwrap();
    assert_eq!(created.get(ID_FIELD), missing.get(ID_FIELD));
    assert_eq!(created.get("name"), Some(&Value::from("x")));
    assert_eq!(db.count(&collection, &record! {}).await.unwrap(), 1);

    let updated = db
        .upsert_one(&collection, &missing, &record! { "name" => "y" })
        .await
        .unwrap();
    assert_eq!(updated.get("name"), Some(&Value::from("y")));
    assert_eq!(db.count(&collection, &record! {}).await.unwrap(), 1);
}

/// A second record with the same unique value is rejected with its details.
pub async fn duplicate_record(db: &dyn Database) {
    let collection = unique_collection(db, "widgets");
    db.create_unique_index(&collection, IndexDefinition::new(["sku"]))
        .await
        .unwrap();

    db.create_one(&collection, record! { "sku" => "A" })
        .await
        .unwrap();
    match db.create_one(&collection, record! { "sku" => "A" }).await {
        Err(DbError::DuplicateRecord {
            duplicate_fields,
            duplicate_values,
            action,
            ..
        }) => {
            assert_eq!(duplicate_fields, fields(&["sku"]));
            assert_eq!(duplicate_values, vec![Value::from("A")]);
            assert_eq!(action, WriteAction::Create);
        }
        other => panic!("expected DUPLICATE_RECORD, got {other:?}"),
    }
    assert_eq!(db.count(&collection, &record! {}).await.unwrap(), 1);

    let b = db
        .create_one(&collection, record! { "sku" => "B" })
        .await
        .unwrap();
    let err = db
        .update_one(&collection, &by_id(&b), &record! { "sku" => "A" })
        .await
        .unwrap_err();
    assert!(err.is_duplicate_record());
}

/// Concurrent inserts of one unique value yield exactly one success.
pub async fn concurrent_duplicates(db: &dyn Database) {
    const WRITERS: usize = 8;
    let collection = unique_collection(db, "race");
    db.create_unique_index(&collection, IndexDefinition::new(["sku"]))
        .await
        .unwrap();

    let results = join_all(
        (0..WRITERS).map(|_| db.create_one(&collection, record! { "sku" => "same" })),
    )
    .await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_duplicate_record()))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(duplicates, WRITERS - 1);
}

/// Sorting, skipping and limiting.
pub async fn sort_and_page(db: &dyn Database) {
    let collection = unique_collection(db, "sorted");
    db.create(
        &collection,
        [1, 5, -1]
            .into_iter()
            .map(|count| record! { "count" => count })
            .collect(),
    )
    .await
    .unwrap();

    let counts = |records: Vec<Document>| -> Vec<Value> {
        records
            .into_iter()
            .filter_map(|mut r| r.remove("count"))
            .collect()
    };

    let desc = FindOptions::new().sort(Sort::desc("count"));
    let all = db.find(&collection, &record! {}, &desc).await.unwrap();
    assert_eq!(counts(all), vec![Value::Int(5), Value::Int(1), Value::Int(-1)]);

    let page = desc.clone().skip(1).limit(1);
    let second = db.find(&collection, &record! {}, &page).await.unwrap();
    assert_eq!(counts(second), vec![Value::Int(1)]);

    let lowest = db
        .find_one(
            &collection,
            &record! {},
            &FindOptions::new().sort(Sort::asc("count")),
        )
        .await
        .unwrap()
        .expect("collection is not empty");
    assert_eq!(lowest.get("count"), Some(&Value::Int(-1)));

    let positive = db
        .count(&collection, &record! { "count" => record! { "$gt" => 0 } })
        .await
        .unwrap();
    assert_eq!(positive, 2);
}

/// Plain updates merge, operator updates apply, bulk writes report counts.
pub async fn update_and_delete(db: &dyn Database) {
    let collection = unique_collection(db, "updates");
    let created = db
        .create(
            &collection,
            vec![
                record! { "group" => "a", "n" => 1, "keep" => true },
                record! { "group" => "a", "n" => 2, "keep" => true },
                record! { "group" => "b", "n" => 3, "keep" => true },
            ],
        )
        .await
        .unwrap();

    let first = db
        .update_one(&collection, &by_id(&created[0]), &record! { "n" => 10 })
        .await
        .unwrap();
    assert_eq!(first.get("n"), Some(&Value::Int(10)));
    assert_eq!(first.get("keep"), Some(&Value::Bool(true)));
    assert_eq!(first.get(ID_FIELD), created[0].get(ID_FIELD));

    let bumped = db
        .update(
            &collection,
            &record! { "group" => "a" },
            &record! { "$inc" => record! { "n" => 1 } },
        )
        .await
        .unwrap();
    assert_eq!(bumped, 2);
    let second = db
        .find_one(&collection, &by_id(&created[1]), &FindOptions::new())
        .await
        .unwrap()
        .expect("record exists");
    assert_eq!(second.get("n"), Some(&Value::Int(3)));

    assert!(db
        .delete_one(&collection, &record! { "group" => "b" })
        .await
        .unwrap());
    assert_eq!(
        db.delete(&collection, &record! { "group" => "a" })
            .await
            .unwrap(),
        2
    );
    assert_eq!(db.count(&collection, &record! {}).await.unwrap(), 0);
}

/// Index sync is idempotent and ignores field order.
pub async fn index_sync(db: &dyn Database) {
    let collection = unique_collection(db, "synced");

    let report = db
        .sync_indexes(&collection, vec![IndexDefinition::new(["a", "b"])])
        .await
        .unwrap();
    assert_eq!(report.created.len(), 1);
    assert!(report.dropped.is_empty());

    let again = db
        .sync_indexes(&collection, vec![IndexDefinition::new(["a", "b"])])
        .await
        .unwrap();
    assert!(again.is_noop());

    let reordered = db
        .sync_indexes(&collection, vec![IndexDefinition::new(["b", "a"])])
        .await
        .unwrap();
    assert!(reordered.is_noop());

    let unique = db
        .sync_unique_indexes(&collection, vec![IndexDefinition::new(["sku"])])
        .await
        .unwrap();
    assert_eq!(unique.created.len(), 1);
    assert_eq!(db.get_indexes(&collection).await.unwrap().len(), 1);
    assert_eq!(db.get_unique_indexes(&collection).await.unwrap().len(), 1);

    let cleared = db.sync_indexes(&collection, Vec::new()).await.unwrap();
    assert_eq!(cleared.dropped.len(), 1);
    assert!(db.get_indexes(&collection).await.unwrap().is_empty());
    assert_eq!(db.get_unique_indexes(&collection).await.unwrap().len(), 1);
}

/// Index creation and removal failures carry the documented codes.
pub async fn index_errors(db: &dyn Database) {
    let collection = unique_collection(db, "index_errors");
    db.create(
        &collection,
        vec![record! { "sku" => "A" }, record! { "sku" => "A" }],
    )
    .await
    .unwrap();

    let err = db
        .create_unique_index(&collection, IndexDefinition::new(["sku"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_KEY");

    db.create_index(&collection, IndexDefinition::new(["sku"]))
        .await
        .unwrap();
    let err = db
        .create_index(&collection, IndexDefinition::new(["sku"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INDEX_EXISTS");

    match db.drop_index(&collection, &fields(&["nope"])).await {
        Err(DbError::IndexNotFound { missing_index, .. }) => {
            assert_eq!(missing_index, fields(&["nope"]));
        }
        other => panic!("expected INDEX_NOT_FOUND, got {other:?}"),
    }

    db.drop_index(&collection, &fields(&["sku"])).await.unwrap();
    assert!(db.get_indexes(&collection).await.unwrap().is_empty());
}

/// After `close`, every operation fails with `DATABASE_NOT_CONNECTED`.
///
/// Leaves the database closed.
pub async fn closed_database(db: &dyn Database) {
    let collection = unique_collection(db, "closed");
    db.close().await.unwrap();
    assert!(!db.is_connected());

    let err = db
        .create_one(&collection, record! { "a" => 1 })
        .await
        .unwrap_err();
    assert!(err.is_not_connected());
    let err = db
        .find(&collection, &record! {}, &FindOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_connected());
    let err = db.get_indexes(&collection).await.unwrap_err();
    assert!(err.is_not_connected());
}

/// Runs every scenario, finishing with [`closed_database`].
pub async fn run_all(db: &dyn Database) {
    info!(backend = %db.backend(), "running conformance suite");
    round_trip(db).await;
    null_fidelity(db).await;
    not_found_semantics(db).await;
    duplicate_record(db).await;
    concurrent_duplicates(db).await;
    sort_and_page(db).await;
    update_and_delete(db).await;
    index_sync(db).await;
    index_errors(db).await;
    closed_database(db).await;
}

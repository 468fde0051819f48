//! End-to-end use through the facade.

use docbridge::{
    backend_for, connect, open, record, BackendKind, ConnectionRegistry, Database,
    DatabaseOptions, FindOptions, IndexDefinition, Sort, Value,
};
use docbridge_testkit::prelude::*;
use std::sync::Arc;

#[tokio::test]
async fn memory_url_passes_conformance() {
    init_test_tracing();
    let db = connect("memory://conformance", DatabaseOptions::new("facade"))
        .await
        .unwrap();
    conformance::run_all(db.as_ref()).await;
}

#[tokio::test]
async fn open_does_not_connect() {
    let db = open("memory://lazy", DatabaseOptions::new("facade")).unwrap();
    assert!(!db.is_connected());
    assert!(db
        .count("widgets", &record! {})
        .await
        .unwrap_err()
        .is_not_connected());
    db.connect().await.unwrap();
    assert_eq!(db.count("widgets", &record! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn mongo_url_opens_without_a_server() {
    let db = open("mongodb://localhost:27017", DatabaseOptions::new("facade")).unwrap();
    assert_eq!(db.backend(), BackendKind::Mongo);
    assert!(!db.is_connected());
    assert_eq!(backend_for("mongodb+srv://cluster.example").unwrap(), BackendKind::Mongo);
}

#[tokio::test]
async fn registry_handles_are_shared_across_tasks() {
    let registry = Arc::new(ConnectionRegistry::new());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let db = registry
                    .get_or_connect("memory://shared", DatabaseOptions::new("facade"))
                    .await
                    .unwrap();
                db.create_one("events", record! { "task" => i }).await.unwrap();
                db
            })
        })
        .collect();

    let mut dbs = Vec::new();
    for handle in handles {
        dbs.push(handle.await.unwrap());
    }
    assert!(dbs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(dbs[0].count("events", &record! {}).await.unwrap(), 4);
    registry.close_all().await.unwrap();
}

#[tokio::test]
async fn widgets_walkthrough() {
    let db = connect("memory://walkthrough", DatabaseOptions::new("shop"))
        .await
        .unwrap();
    db.sync_unique_indexes("widgets", vec![IndexDefinition::new(["sku"])])
        .await
        .unwrap();

    for (sku, count) in [("A", 1), ("B", 5), ("C", -1)] {
        db.create_one("widgets", record! { "sku" => sku, "count" => count })
            .await
            .unwrap();
    }
    let err = db
        .create_one("widgets", record! { "sku" => "A" })
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DUPLICATE_RECORD");

    let skus: Vec<_> = db
        .find(
            "widgets",
            &record! {},
            &FindOptions::new().sort(Sort::desc("count")),
        )
        .await
        .unwrap()
        .into_iter()
        .filter_map(|mut w| w.remove("sku"))
        .collect();
    assert_eq!(skus, vec![Value::from("B"), Value::from("A"), Value::from("C")]);
}

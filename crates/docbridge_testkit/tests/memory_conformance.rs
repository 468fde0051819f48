//! Runs the conformance suite against the embedded backend.

use docbridge_core::{record, Database, DatabaseOptions, FindOptions};
use docbridge_testkit::prelude::*;
use proptest::prelude::*;

#[tokio::test]
async fn memory_backend_passes_conformance() {
    init_test_tracing();
    let db = TestDatabase::memory().await;
    conformance::run_all(db.db.as_ref()).await;
}

#[tokio::test]
async fn conformance_scenarios_share_one_database() {
    let db = TestDatabase::memory_with(DatabaseOptions::new("shared")).await;
    conformance::duplicate_record(db.db.as_ref()).await;
    conformance::duplicate_record(db.db.as_ref()).await;
    assert_eq!(db.collection_names().len(), 2);
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn any_record_round_trips(record in record_strategy()) {
        let found = runtime().block_on(async {
            let db = TestDatabase::memory().await;
            let created = db.create_one("props", record.clone()).await.unwrap();
            let mut found = db
                .find_one("props", &record! { "id" => created["id"].clone() }, &FindOptions::new())
                .await
                .unwrap()
                .unwrap();
            found.remove("id");
            found
        });
        prop_assert_eq!(found, record);
    }

    #[test]
    fn index_sync_converges(first in index_set_strategy(), second in index_set_strategy()) {
        let (created_again, dropped_again, listed) = runtime().block_on(async {
            let db = TestDatabase::memory().await;
            db.sync_indexes("props", first).await.unwrap();
            db.sync_indexes("props", second.clone()).await.unwrap();
            let again = db.sync_indexes("props", second.clone()).await.unwrap();
            let listed = db.get_indexes("props").await.unwrap().len();
            (again.created.len(), again.dropped.len(), listed)
        });
        prop_assert_eq!(created_again, 0);
        prop_assert_eq!(dropped_again, 0);
        prop_assert_eq!(listed, second.len());
    }
}

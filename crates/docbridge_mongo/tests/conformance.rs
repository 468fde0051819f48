//! Conformance suite against a live server.
//!
//! Set `DOCBRIDGE_MONGO_URL` (for example `mongodb://localhost:27017`) to
//! run; without it the tests return early.

use docbridge_core::{Database, DatabaseOptions};
use docbridge_mongo::MongoDatabase;
use docbridge_testkit::prelude::*;
use std::time::Duration;

fn server_url() -> Option<String> {
    std::env::var("DOCBRIDGE_MONGO_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

async fn connected(url: &str) -> MongoDatabase {
    let options = DatabaseOptions::new("docbridge_conformance")
        .server_selection_timeout(Duration::from_secs(2))
        .app_name("docbridge-tests");
    let db = MongoDatabase::new(url, options).expect("valid connection string");
    db.connect().await.expect("server reachable");
    db
}

#[tokio::test]
async fn mongo_backend_passes_conformance() {
    let Some(url) = server_url() else {
        eprintln!("DOCBRIDGE_MONGO_URL not set; skipping");
        return;
    };
    init_test_tracing();
    let db = connected(&url).await;
    conformance::run_all(&db).await;
}

#[tokio::test]
async fn reconnect_after_close() {
    let Some(url) = server_url() else {
        return;
    };
    let db = connected(&url).await;
    db.close().await.unwrap();
    assert!(!db.is_connected());
    db.connect().await.unwrap();
    conformance::round_trip(&db).await;
    db.close().await.unwrap();
}

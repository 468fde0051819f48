//! Benchmark utilities.

use docbridge_core::{record, Database, DatabaseOptions, Document};
use docbridge_memory::MemoryDatabase;

/// Generate `count` deterministic widget records.
pub fn generate_widgets(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            let n = i64::try_from(i).unwrap_or(i64::MAX);
            record! {
                "sku" => format!("sku-{i:06}"),
                "count" => n % 97,
                "region" => ["eu", "us", "apac"][i % 3],
                "tags" => vec!["bench", if i % 2 == 0 { "even" } else { "odd" }],
            }
        })
        .collect()
}

/// Build a multi-threaded runtime for async benchmarks.
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// Connect a memory database preloaded with `count` widgets.
pub async fn populated_memory(count: usize) -> MemoryDatabase {
    let db = MemoryDatabase::new(DatabaseOptions::new("bench")).expect("valid options");
    db.connect().await.expect("connect");
    db.create("widgets", generate_widgets(count))
        .await
        .expect("populate");
    db
}

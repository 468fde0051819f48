//! Test fixtures and database helpers.
//!
//! Provides convenience functions for setting up connected test databases
//! and common test scenarios.

use docbridge_core::{record, Database, DatabaseOptions, Document};
use docbridge_memory::MemoryDatabase;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Installs a test-friendly tracing subscriber once per process.
///
/// Honors `RUST_LOG`; defaults to `warn` so passing tests stay quiet.
pub fn init_test_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A connected test database.
#[derive(Debug, Clone)]
pub struct TestDatabase {
    /// The database instance.
    pub db: Arc<MemoryDatabase>,
}

impl TestDatabase {
    /// Creates and connects an in-memory database named `test`.
    pub async fn memory() -> Self {
        Self::memory_with(DatabaseOptions::new("test")).await
    }

    /// Creates and connects an in-memory database with `options`.
    pub async fn memory_with(options: DatabaseOptions) -> Self {
        let db = MemoryDatabase::new(options).expect("Failed to create memory database");
        db.connect().await.expect("Failed to connect memory database");
        Self { db: Arc::new(db) }
    }

    /// Returns the database as a trait object.
    pub fn dyn_db(&self) -> Arc<dyn Database> {
        Arc::clone(&self.db) as Arc<dyn Database>
    }
}

impl AsRef<MemoryDatabase> for TestDatabase {
    fn as_ref(&self) -> &MemoryDatabase {
        &self.db
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = MemoryDatabase;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Inserts `count` records `{index: i, parity: "even"|"odd"}`.
    pub async fn populate(db: &dyn Database, collection: &str, count: usize) -> Vec<Document> {
        let records = (0..count)
            .map(|i| {
                let index = i64::try_from(i).expect("index fits in i64");
                record! {
                    "index" => index,
                    "parity" => if i % 2 == 0 { "even" } else { "odd" },
                }
            })
            .collect();
        db.create(collection, records)
            .await
            .expect("Failed to populate collection")
    }

    /// Returns a collection name unique to this run.
    pub fn unique_collection(db: &dyn Database, base: &str) -> String {
        let suffix: String = db
            .generate_id()
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(12)
            .collect();
        format!("{base}_{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_database_is_connected() {
        let test_db = TestDatabase::memory().await;
        assert!(test_db.is_connected());
        assert_eq!(test_db.options().database_name, "test");
    }

    #[tokio::test]
    async fn populated_scenario() {
        init_test_tracing();
        let test_db = TestDatabase::memory().await;
        let db = test_db.dyn_db();
        let created = scenarios::populate(db.as_ref(), "items", 10).await;
        assert_eq!(created.len(), 10);
        assert_eq!(db.count("items", &record! { "parity" => "odd" }).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn unique_collections_differ() {
        let test_db = TestDatabase::memory().await;
        let a = scenarios::unique_collection(test_db.db.as_ref(), "widgets");
        let b = scenarios::unique_collection(test_db.db.as_ref(), "widgets");
        assert!(a.starts_with("widgets_"));
        assert_ne!(a, b);
    }
}

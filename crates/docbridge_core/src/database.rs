//! The database contract.

use crate::error::DbResult;
use crate::index::{IndexDefinition, SyncReport};
use crate::query::FindOptions;
use crate::value::Document;
use async_trait::async_trait;
use std::fmt;

/// Which engine backs a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Embedded in-process store.
    Memory,
    /// Networked document store.
    Mongo,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Memory => f.write_str("memory"),
            BackendKind::Mongo => f.write_str("mongodb"),
        }
    }
}

/// One storage contract over every backend.
///
/// Records cross this boundary as [`Document`]s whose identifier is always
/// the `id` field, whatever the backend stores natively. Queries use the
/// operator dialect described in [`crate::translate`].
///
/// # Lifecycle
///
/// A handle starts unconnected. Every data or index operation before
/// [`connect`](Database::connect) or after [`close`](Database::close) fails
/// with [`DbError::NotConnected`](crate::DbError::NotConnected).
///
/// # Guarantees
///
/// - `find` / `find_one` never fail for zero matches
/// - `update_one` fails `RECORD_NOT_FOUND` when nothing matches; `update`
///   returns a count where 0 is valid
/// - `upsert_one` never fails not-found
/// - every write violating a unique index fails `DUPLICATE_RECORD`
#[async_trait]
pub trait Database: Send + Sync {
    /// Returns the backend kind.
    fn backend(&self) -> BackendKind;

    /// Opens the connection. Idempotent.
    async fn connect(&self) -> DbResult<()>;

    /// Closes the connection. Idempotent.
    async fn close(&self) -> DbResult<()>;

    /// Returns true between `connect` and `close`.
    fn is_connected(&self) -> bool;

    /// Generates a fresh identifier in the backend's native format.
    fn generate_id(&self) -> String;

    /// Returns true if `create` assigns identifiers to records without one.
    fn auto_generates_ids(&self) -> bool;

    /// Inserts one record and returns it as stored.
    async fn create_one(&self, collection: &str, record: Document) -> DbResult<Document>;

    /// Inserts records in order, stopping at the first failure.
    async fn create(&self, collection: &str, records: Vec<Document>) -> DbResult<Vec<Document>>;

    /// Returns the first record matching `query` under the sort order.
    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> DbResult<Option<Document>>;

    /// Returns every record matching `query`.
    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> DbResult<Vec<Document>>;

    /// Updates the first matching record and returns it.
    async fn update_one(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<Document>;

    /// Updates every matching record and returns the match count.
    async fn update(&self, collection: &str, query: &Document, update: &Document)
        -> DbResult<u64>;

    /// Updates the first match, or creates a record from the query's
    /// equality fields merged with the update.
    async fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<Document>;

    /// Deletes the first matching record; returns whether one was removed.
    async fn delete_one(&self, collection: &str, query: &Document) -> DbResult<bool>;

    /// Deletes every matching record and returns how many were removed.
    async fn delete(&self, collection: &str, query: &Document) -> DbResult<u64>;

    /// Counts matching records.
    async fn count(&self, collection: &str, query: &Document) -> DbResult<u64>;

    /// Creates a non-unique index and returns its name.
    async fn create_index(&self, collection: &str, index: IndexDefinition) -> DbResult<String>;

    /// Creates a unique index and returns its name.
    async fn create_unique_index(
        &self,
        collection: &str,
        index: IndexDefinition,
    ) -> DbResult<String>;

    /// Lists non-unique indexes.
    async fn get_indexes(&self, collection: &str) -> DbResult<Vec<IndexDefinition>>;

    /// Lists unique indexes.
    async fn get_unique_indexes(&self, collection: &str) -> DbResult<Vec<IndexDefinition>>;

    /// Drops the index covering exactly `fields`, in any order.
    async fn drop_index(&self, collection: &str, fields: &[String]) -> DbResult<()>;

    /// Reconciles non-unique indexes with `desired`.
    async fn sync_indexes(
        &self,
        collection: &str,
        desired: Vec<IndexDefinition>,
    ) -> DbResult<SyncReport>;

    /// Reconciles unique indexes with `desired`.
    async fn sync_unique_indexes(
        &self,
        collection: &str,
        desired: Vec<IndexDefinition>,
    ) -> DbResult<SyncReport>;
}

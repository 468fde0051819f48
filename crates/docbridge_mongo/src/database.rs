//! The networked backend.

use crate::dialect::{MongoDialect, NATIVE_ID_FIELD};
use crate::error::{has_code, map_error, map_index_error, map_write_error, NAMESPACE_NOT_FOUND};
use async_trait::async_trait;
use bson::oid::ObjectId;
use bson::{doc, Bson, Document as BsonDocument};
use docbridge_core::translate::{restore_record, translate_query, translate_record, translate_update};
use docbridge_core::{
    BackendKind, Database, DatabaseOptions, DbError, DbResult, Document, FindOptions,
    IndexBackend, IndexDefinition, IndexInfo, IndexManager, KeyedMutex, SortDirection, SyncReport,
    WriteAction, ID_FIELD,
};
use futures::TryStreamExt;
use mongodb::options::{ClientOptions, ConnectionString, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, IndexModel};
use parking_lot::RwLock;
use std::fmt;
use tracing::{debug, info, warn};

/// Name of the built-in identifier index, never reported.
const BUILTIN_ID_INDEX: &str = "_id_";

/// Key `connect` is serialised under.
const CONNECT_KEY: &str = "mongo-connect";

/// A document-store server reached over the network.
///
/// Construction only validates; [`Database::connect`] builds the driver
/// client with a bounded server-selection timeout and pings the server.
///
/// # Example
///
/// ```rust,ignore
/// use docbridge_core::{Database, DatabaseOptions};
/// use docbridge_mongo::MongoDatabase;
///
/// let db = MongoDatabase::new("mongodb://localhost:27017", DatabaseOptions::new("shop"))?;
/// db.connect().await?;
/// ```
pub struct MongoDatabase {
    /// Connection string as supplied.
    url: String,
    /// Configuration.
    options: DatabaseOptions,
    /// Driver client while connected.
    client: RwLock<Option<Client>>,
    /// Index lifecycle.
    indexes: IndexManager,
    /// Serialises `connect` so only one client is ever built.
    connecting: KeyedMutex,
}

impl fmt::Debug for MongoDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDatabase")
            .field("database", &self.options.database_name)
            .field("connected", &self.client.read().is_some())
            .finish_non_exhaustive()
    }
}

impl MongoDatabase {
    /// Creates an unconnected handle.
    ///
    /// # Errors
    ///
    /// - [`DbError::InvalidConnectionString`] if the driver cannot parse `url`
    /// - [`DbError::InvalidDatabaseName`] for a reserved or malformed name
    pub fn new(url: impl Into<String>, options: DatabaseOptions) -> DbResult<Self> {
        let url = url.into();
        ConnectionString::parse(&url)
            .map_err(|e| DbError::invalid_connection_string(url.as_str(), e.to_string()))?;
        options.validate()?;
        Ok(Self {
            url,
            options,
            client: RwLock::new(None),
            indexes: IndexManager::new(),
            connecting: KeyedMutex::new(),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    fn collection(&self, operation: &str, name: &str) -> DbResult<Collection<BsonDocument>> {
        let client = self
            .client
            .read()
            .clone()
            .ok_or_else(|| DbError::not_connected(operation, Some(name)))?;
        Ok(client
            .database(&self.options.database_name)
            .collection::<BsonDocument>(name))
    }

    fn filter(query: &Document) -> DbResult<BsonDocument> {
        translate_query(&MongoDialect, query)
    }

    fn restore(native: BsonDocument) -> Document {
        restore_record(&MongoDialect, native)
    }

    fn sort_document(options: &FindOptions) -> Option<BsonDocument> {
        if options.sort.is_empty() {
            return None;
        }
        Some(
            options
                .sort
                .iter()
                .map(|s| {
                    let field = if s.field == ID_FIELD {
                        NATIVE_ID_FIELD.to_string()
                    } else {
                        s.field.clone()
                    };
                    let direction = match s.direction {
                        SortDirection::Asc => 1,
                        SortDirection::Desc => -1,
                    };
                    (field, Bson::Int32(direction))
                })
                .collect(),
        )
    }

    /// Prepares a contract record for insertion, assigning an id if due.
    fn prepare(&self, record: &Document) -> BsonDocument {
        let mut native = translate_record(&MongoDialect, record);
        let has_id = matches!(native.get(NATIVE_ID_FIELD), Some(id) if *id != Bson::Null);
        if !has_id {
            native.remove(NATIVE_ID_FIELD);
            if self.options.auto_id {
                native.insert(NATIVE_ID_FIELD, ObjectId::new());
            }
        }
        native
    }

    async fn insert(&self, collection: &str, record: &Document) -> DbResult<Document> {
        let target = self.collection("create", collection)?;
        let mut native = self.prepare(record);
        let inserted = target
            .insert_one(&native)
            .await
            .map_err(|e| map_write_error(e, collection, WriteAction::Create))
            .map_err(|e| {
                warn!(collection, error = %e, "rejected insert");
                e
            })?;
        if !native.contains_key(NATIVE_ID_FIELD) {
            native.insert(NATIVE_ID_FIELD, inserted.inserted_id);
        }
        Ok(Self::restore(native))
    }

    fn index_keys(index: &IndexDefinition) -> BsonDocument {
        index
            .fields
            .iter()
            .map(|f| {
                let field = if f == ID_FIELD { NATIVE_ID_FIELD } else { f.as_str() };
                (field.to_string(), Bson::Int32(1))
            })
            .collect()
    }

    fn index_info(model: IndexModel) -> Option<IndexInfo> {
        let options = model.options.unwrap_or_default();
        let name = options.name.clone()?;
        if name == BUILTIN_ID_INDEX {
            return None;
        }
        let fields = model
            .keys
            .keys()
            .map(|k| if k == NATIVE_ID_FIELD { ID_FIELD.to_string() } else { k.clone() })
            .collect::<Vec<_>>();
        let mut definition = IndexDefinition::new(fields).with_name(name);
        definition.filter = options
            .partial_filter_expression
            .map(|f| restore_record(&MongoDialect, f));
        Some(IndexInfo {
            definition,
            unique: options.unique.unwrap_or(false),
        })
    }
}

#[async_trait]
impl Database for MongoDatabase {
    fn backend(&self) -> BackendKind {
        BackendKind::Mongo
    }

    async fn connect(&self) -> DbResult<()> {
        let _guard = self.connecting.lock(CONNECT_KEY).await;
        if self.client.read().is_some() {
            return Ok(());
        }

        // The string was validated in `new`; failures here are SRV/TXT
        // resolution, i.e. the cluster cannot be reached.
        let mut options = ClientOptions::parse(self.url.as_str()).await.map_err(|e| {
            warn!(database = %self.options.database_name, error = %e, "resolving hosts failed");
            DbError::unable_to_connect(e.to_string())
        })?;
        options.server_selection_timeout = Some(self.options.server_selection_timeout);
        if let Some(app_name) = &self.options.app_name {
            options.app_name = Some(app_name.clone());
        }

        let client =
            Client::with_options(options).map_err(|e| DbError::unable_to_connect(e.to_string()))?;
        client
            .database(&self.options.database_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| {
                warn!(database = %self.options.database_name, error = %e, "ping failed");
                DbError::unable_to_connect(e.to_string())
            })?;

        *self.client.write() = Some(client);
        info!(database = %self.options.database_name, "connected to document store");
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let client = self.client.write().take();
        if let Some(client) = client {
            client.shutdown().await;
            info!(database = %self.options.database_name, "closed document store connection");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.client.read().is_some()
    }

    fn generate_id(&self) -> String {
        ObjectId::new().to_hex()
    }

    fn auto_generates_ids(&self) -> bool {
        self.options.auto_id
    }

    async fn create_one(&self, collection: &str, record: Document) -> DbResult<Document> {
        debug!(collection, "create_one");
        self.insert(collection, &record).await
    }

    async fn create(&self, collection: &str, records: Vec<Document>) -> DbResult<Vec<Document>> {
        self.collection("create", collection)?;
        debug!(collection, count = records.len(), "create");
        let mut created = Vec::with_capacity(records.len());
        for record in &records {
            created.push(self.insert(collection, record).await?);
        }
        Ok(created)
    }

    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> DbResult<Option<Document>> {
        let target = self.collection("find_one", collection)?;
        let filter = Self::filter(query)?;
        let mut action = target.find_one(filter);
        if let Some(sort) = Self::sort_document(options) {
            action = action.sort(sort);
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip as u64);
        }
        let found = action.await.map_err(map_error)?;
        Ok(found.map(Self::restore))
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> DbResult<Vec<Document>> {
        let target = self.collection("find", collection)?;
        let filter = Self::filter(query)?;
        let mut action = target.find(filter);
        if let Some(sort) = Self::sort_document(options) {
            action = action.sort(sort);
        }
        if let Some(skip) = options.skip {
            action = action.skip(skip as u64);
        }
        if let Some(limit) = options.limit {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let cursor = action.await.map_err(map_error)?;
        let found: Vec<BsonDocument> = cursor.try_collect().await.map_err(map_error)?;
        debug!(collection, matched = found.len(), "find");
        Ok(found.into_iter().map(Self::restore).collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<Document> {
        let target = self.collection("update_one", collection)?;
        let filter = Self::filter(query)?;
        let native_update = translate_update(&MongoDialect, update)?;
        let updated = target
            .find_one_and_update(filter, native_update)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_write_error(e, collection, WriteAction::Update))?;
        debug!(collection, matched = updated.is_some(), "update_one");
        updated
            .map(Self::restore)
            .ok_or_else(|| DbError::record_not_found(collection, query.clone()))
    }

    async fn update(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<u64> {
        let target = self.collection("update", collection)?;
        let filter = Self::filter(query)?;
        let native_update = translate_update(&MongoDialect, update)?;
        let result = target
            .update_many(filter, native_update)
            .await
            .map_err(|e| map_write_error(e, collection, WriteAction::Update))?;
        debug!(collection, matched = result.matched_count, "update");
        Ok(result.matched_count)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<Document> {
        let target = self.collection("upsert_one", collection)?;
        let filter = Self::filter(query)?;
        let native_update = translate_update(&MongoDialect, update)?;
        let upserted = target
            .find_one_and_update(filter, native_update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_write_error(e, collection, WriteAction::Upsert))?;
        debug!(collection, "upsert_one");
        upserted
            .map(Self::restore)
            .ok_or_else(|| DbError::backend("upsert returned no document"))
    }

    async fn delete_one(&self, collection: &str, query: &Document) -> DbResult<bool> {
        let target = self.collection("delete_one", collection)?;
        let filter = Self::filter(query)?;
        let result = target.delete_one(filter).await.map_err(map_error)?;
        debug!(collection, removed = result.deleted_count, "delete_one");
        Ok(result.deleted_count > 0)
    }

    async fn delete(&self, collection: &str, query: &Document) -> DbResult<u64> {
        let target = self.collection("delete", collection)?;
        let filter = Self::filter(query)?;
        let result = target.delete_many(filter).await.map_err(map_error)?;
        debug!(collection, removed = result.deleted_count, "delete");
        Ok(result.deleted_count)
    }

    async fn count(&self, collection: &str, query: &Document) -> DbResult<u64> {
        let target = self.collection("count", collection)?;
        let filter = Self::filter(query)?;
        target.count_documents(filter).await.map_err(map_error)
    }

    async fn create_index(&self, collection: &str, index: IndexDefinition) -> DbResult<String> {
        self.collection("create_index", collection)?;
        self.indexes.create(self, collection, index, false).await
    }

    async fn create_unique_index(
        &self,
        collection: &str,
        index: IndexDefinition,
    ) -> DbResult<String> {
        self.collection("create_unique_index", collection)?;
        self.indexes.create(self, collection, index, true).await
    }

    async fn get_indexes(&self, collection: &str) -> DbResult<Vec<IndexDefinition>> {
        self.collection("get_indexes", collection)?;
        self.indexes.list(self, collection, false).await
    }

    async fn get_unique_indexes(&self, collection: &str) -> DbResult<Vec<IndexDefinition>> {
        self.collection("get_unique_indexes", collection)?;
        self.indexes.list(self, collection, true).await
    }

    async fn drop_index(&self, collection: &str, fields: &[String]) -> DbResult<()> {
        self.collection("drop_index", collection)?;
        self.indexes.drop(self, collection, fields).await
    }

    async fn sync_indexes(
        &self,
        collection: &str,
        desired: Vec<IndexDefinition>,
    ) -> DbResult<SyncReport> {
        self.collection("sync_indexes", collection)?;
        self.indexes.sync(self, collection, &desired, false).await
    }

    async fn sync_unique_indexes(
        &self,
        collection: &str,
        desired: Vec<IndexDefinition>,
    ) -> DbResult<SyncReport> {
        self.collection("sync_unique_indexes", collection)?;
        self.indexes.sync(self, collection, &desired, true).await
    }
}

#[async_trait]
impl IndexBackend for MongoDatabase {
    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexInfo>> {
        let target = self.collection("list_indexes", collection)?;
        let cursor = match target.list_indexes().await {
            Ok(cursor) => cursor,
            Err(e) if has_code(&e, NAMESPACE_NOT_FOUND) => return Ok(Vec::new()),
            Err(e) => return Err(map_error(e)),
        };
        let models: Vec<IndexModel> = cursor.try_collect().await.map_err(map_error)?;
        Ok(models.into_iter().filter_map(Self::index_info).collect())
    }

    async fn create_index_raw(
        &self,
        collection: &str,
        index: &IndexDefinition,
        name: &str,
        unique: bool,
    ) -> DbResult<()> {
        let target = self.collection("create_index", collection)?;
        let mut options = IndexOptions::default();
        options.name = Some(name.to_string());
        options.unique = Some(unique);
        options.partial_filter_expression = index
            .filter
            .as_ref()
            .map(|f| translate_query(&MongoDialect, f))
            .transpose()?;
        let model = IndexModel::builder()
            .keys(Self::index_keys(index))
            .options(options)
            .build();
        target
            .create_index(model)
            .await
            .map_err(|e| map_index_error(e, collection, &index.fields))?;
        Ok(())
    }

    async fn drop_index_raw(&self, collection: &str, name: &str) -> DbResult<()> {
        let target = self.collection("drop_index", collection)?;
        target.drop_index(name).await.map_err(map_error)
    }
}

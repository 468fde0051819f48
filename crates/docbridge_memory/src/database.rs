//! The embedded backend.

use crate::collection::{Collection, RowId};
use crate::dialect::{MemoryDialect, NATIVE_ID_FIELD};
use crate::matcher::Filter;
use crate::update::{apply_update, set_path};
use async_trait::async_trait;
use docbridge_core::translate::{
    equality_fields, restore_record, translate_query, translate_record, translate_update,
};
use docbridge_core::{
    BackendKind, Database, DatabaseOptions, DbError, DbResult, Document, FindOptions,
    IndexBackend, IndexDefinition, IndexInfo, IndexManager, KeyedMutex, SyncReport, Value,
    WriteAction, ID_FIELD,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Key every uniqueness-preserving write is serialised under.
const WRITE_KEY: &str = "memory-write";

/// Decides per collection whether `create` assigns identifiers.
pub type AutoIdHook = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// In-process document store implementing [`Database`].
///
/// Collections are created on first write. Nulls are stored as a
/// placeholder and restored on read, so `{field: null}` matches both
/// stored nulls and missing fields.
///
/// # Example
///
/// ```rust,ignore
/// use docbridge_core::{record, Database, DatabaseOptions};
/// use docbridge_memory::MemoryDatabase;
///
/// let db = MemoryDatabase::new(DatabaseOptions::new("shop"))?;
/// db.connect().await?;
/// let widget = db.create_one("widgets", record! { "sku" => "A" }).await?;
/// ```
pub struct MemoryDatabase {
    /// Configuration.
    options: DatabaseOptions,
    /// Collections by name.
    collections: RwLock<HashMap<String, Collection>>,
    /// Whether the database is connected.
    is_connected: RwLock<bool>,
    /// Serialises check-then-write sequences.
    writes: KeyedMutex,
    /// Index lifecycle.
    indexes: IndexManager,
    /// Per-collection auto-id override.
    auto_id_hook: Option<AutoIdHook>,
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("database", &self.options.database_name)
            .field("connected", &*self.is_connected.read())
            .field("collections", &self.collections.read().len())
            .finish_non_exhaustive()
    }
}

impl MemoryDatabase {
    /// Creates an unconnected embedded database.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidDatabaseName`] for a reserved or malformed name.
    pub fn new(options: DatabaseOptions) -> DbResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            collections: RwLock::new(HashMap::new()),
            is_connected: RwLock::new(false),
            writes: KeyedMutex::new(),
            indexes: IndexManager::new(),
            auto_id_hook: None,
        })
    }

    /// Installs a hook deciding, per collection, whether `create` assigns
    /// identifiers. Overrides [`DatabaseOptions::auto_id`].
    #[must_use]
    pub fn with_auto_id_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.auto_id_hook = Some(Arc::new(hook));
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn options(&self) -> &DatabaseOptions {
        &self.options
    }

    /// Names of collections holding at least one write.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn ensure_connected(&self, operation: &str, collection: Option<&str>) -> DbResult<()> {
        if *self.is_connected.read() {
            Ok(())
        } else {
            Err(DbError::not_connected(operation, collection))
        }
    }

    /// Whether `create` assigns identifiers in `collection`.
    ///
    /// Consults the auto-id hook when one is installed; otherwise the
    /// database-wide default reported by [`Database::auto_generates_ids`].
    pub fn auto_generates_ids_for(&self, collection: &str) -> bool {
        match &self.auto_id_hook {
            Some(hook) => hook(collection),
            None => self.options.auto_id,
        }
    }

    fn compile(query: &Document) -> DbResult<Filter> {
        Filter::compile(&translate_query(&MemoryDialect, query)?)
    }

    fn restore(document: &Document) -> Document {
        restore_record(&MemoryDialect, document.clone())
    }

    /// Prepares a contract record for storage, assigning an id if due.
    fn prepare(&self, collection: &str, record: &Document) -> Document {
        let mut native = translate_record(&MemoryDialect, record);
        let has_id = record.get(ID_FIELD).is_some_and(|id| !id.is_null());
        if !has_id {
            native.remove(NATIVE_ID_FIELD);
            if self.auto_generates_ids_for(collection) {
                native.insert(NATIVE_ID_FIELD.to_string(), Value::from(self.generate_id()));
            }
        }
        native
    }

    fn insert_locked(&self, collection: &str, record: &Document) -> DbResult<Document> {
        let native = self.prepare(collection, record);
        let mut collections = self.collections.write();
        let target = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection));
        let row = target.insert(native, WriteAction::Create).map_err(|e| {
            warn!(collection, error = %e, "rejected insert");
            e
        })?;
        target
            .get(row)
            .map(Self::restore)
            .ok_or_else(|| DbError::backend("inserted row vanished"))
    }

    /// Applies `update` to each row, stopping at the first failure.
    fn update_rows(
        target: &mut Collection,
        rows: &[RowId],
        update: &Document,
        action: WriteAction,
    ) -> DbResult<Vec<Document>> {
        let mut updated = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(current) = target.get(*row) else {
                continue;
            };
            let mut next = current.clone();
            apply_update(&mut next, update)?;
            target.replace(*row, next.clone(), action)?;
            updated.push(Self::restore(&next));
        }
        Ok(updated)
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn backend(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn connect(&self) -> DbResult<()> {
        let mut connected = self.is_connected.write();
        if !*connected {
            *connected = true;
            info!(database = %self.options.database_name, "connected to embedded store");
        }
        Ok(())
    }

    async fn close(&self) -> DbResult<()> {
        let mut connected = self.is_connected.write();
        if *connected {
            *connected = false;
            info!(database = %self.options.database_name, "closed embedded store");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.is_connected.read()
    }

    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// The database-wide default; a hook installed with
    /// [`MemoryDatabase::with_auto_id_hook`] may override it per
    /// collection, see [`MemoryDatabase::auto_generates_ids_for`].
    fn auto_generates_ids(&self) -> bool {
        self.options.auto_id
    }

    async fn create_one(&self, collection: &str, record: Document) -> DbResult<Document> {
        self.ensure_connected("create_one", Some(collection))?;
        debug!(collection, "create_one");
        let _guard = self.writes.lock(WRITE_KEY).await;
        self.insert_locked(collection, &record)
    }

    async fn create(&self, collection: &str, records: Vec<Document>) -> DbResult<Vec<Document>> {
        self.ensure_connected("create", Some(collection))?;
        debug!(collection, count = records.len(), "create");
        let _guard = self.writes.lock(WRITE_KEY).await;
        records
            .iter()
            .map(|record| self.insert_locked(collection, record))
            .collect()
    }

    async fn find_one(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> DbResult<Option<Document>> {
        self.ensure_connected("find_one", Some(collection))?;
        let options = options.clone().limit(1);
        Ok(self
            .find(collection, query, &options)
            .await?
            .into_iter()
            .next())
    }

    async fn find(
        &self,
        collection: &str,
        query: &Document,
        options: &FindOptions,
    ) -> DbResult<Vec<Document>> {
        self.ensure_connected("find", Some(collection))?;
        let filter = Self::compile(query)?;
        let found: Vec<Document> = {
            let collections = self.collections.read();
            match collections.get(collection) {
                Some(target) => target
                    .matching(&filter)
                    .into_iter()
                    .filter_map(|row| target.get(row).map(Self::restore))
                    .collect(),
                None => Vec::new(),
            }
        };
        debug!(collection, matched = found.len(), "find");
        Ok(options.apply(found))
    }

    async fn update_one(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<Document> {
        self.ensure_connected("update_one", Some(collection))?;
        let filter = Self::compile(query)?;
        let native_update = translate_update(&MemoryDialect, update)?;
        let _guard = self.writes.lock(WRITE_KEY).await;

        let mut collections = self.collections.write();
        let target = collections.get_mut(collection);
        let row = target.as_ref().and_then(|t| t.first_matching(&filter));
        let (Some(target), Some(row)) = (target, row) else {
            return Err(DbError::record_not_found(collection, query.clone()));
        };
        let mut updated = Self::update_rows(target, &[row], &native_update, WriteAction::Update)?;
        debug!(collection, "update_one");
        updated
            .pop()
            .ok_or_else(|| DbError::record_not_found(collection, query.clone()))
    }

    async fn update(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<u64> {
        self.ensure_connected("update", Some(collection))?;
        let filter = Self::compile(query)?;
        let native_update = translate_update(&MemoryDialect, update)?;
        let _guard = self.writes.lock(WRITE_KEY).await;

        let mut collections = self.collections.write();
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let rows = target.matching(&filter);
        Self::update_rows(target, &rows, &native_update, WriteAction::Update)?;
        debug!(collection, matched = rows.len(), "update");
        Ok(rows.len() as u64)
    }

    async fn upsert_one(
        &self,
        collection: &str,
        query: &Document,
        update: &Document,
    ) -> DbResult<Document> {
        self.ensure_connected("upsert_one", Some(collection))?;
        let filter = Self::compile(query)?;
        let native_update = translate_update(&MemoryDialect, update)?;
        let _guard = self.writes.lock(WRITE_KEY).await;

        let mut collections = self.collections.write();
        let target = collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection));

        if let Some(row) = target.first_matching(&filter) {
            let mut updated =
                Self::update_rows(target, &[row], &native_update, WriteAction::Upsert)?;
            debug!(collection, "upsert_one matched");
            return updated
                .pop()
                .ok_or_else(|| DbError::record_not_found(collection, query.clone()));
        }

        let mut seed = Document::new();
        for (path, value) in translate_record(&MemoryDialect, &equality_fields(query)) {
            set_path(&mut seed, &path, value)?;
        }
        if seed
            .get(NATIVE_ID_FIELD)
            .is_some_and(MemoryDialect::is_placeholder)
        {
            seed.remove(NATIVE_ID_FIELD);
        }
        if !seed.contains_key(NATIVE_ID_FIELD) && self.auto_generates_ids_for(collection) {
            seed.insert(NATIVE_ID_FIELD.to_string(), Value::from(self.generate_id()));
        }
        apply_update(&mut seed, &native_update)?;

        let row = target.insert(seed, WriteAction::Upsert).map_err(|e| {
            warn!(collection, error = %e, "rejected upsert");
            e
        })?;
        debug!(collection, "upsert_one created");
        target
            .get(row)
            .map(Self::restore)
            .ok_or_else(|| DbError::backend("upserted row vanished"))
    }

    async fn delete_one(&self, collection: &str, query: &Document) -> DbResult<bool> {
        self.ensure_connected("delete_one", Some(collection))?;
        let filter = Self::compile(query)?;
        let _guard = self.writes.lock(WRITE_KEY).await;

        let mut collections = self.collections.write();
        let Some(target) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let removed = target
            .first_matching(&filter)
            .and_then(|row| target.remove(row))
            .is_some();
        debug!(collection, removed, "delete_one");
        Ok(removed)
    }

    async fn delete(&self, collection: &str, query: &Document) -> DbResult<u64> {
        self.ensure_connected("delete", Some(collection))?;
        let filter = Self::compile(query)?;
        let _guard = self.writes.lock(WRITE_KEY).await;

        let mut collections = self.collections.write();
        let Some(target) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let rows = target.matching(&filter);
        for row in &rows {
            target.remove(*row);
        }
        debug!(collection, removed = rows.len(), "delete");
        Ok(rows.len() as u64)
    }

    async fn count(&self, collection: &str, query: &Document) -> DbResult<u64> {
        self.ensure_connected("count", Some(collection))?;
        let filter = Self::compile(query)?;
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map_or(0, |target| target.matching(&filter).len() as u64))
    }

    async fn create_index(&self, collection: &str, index: IndexDefinition) -> DbResult<String> {
        self.ensure_connected("create_index", Some(collection))?;
        self.indexes.create(self, collection, index, false).await
    }

    async fn create_unique_index(
        &self,
        collection: &str,
        index: IndexDefinition,
    ) -> DbResult<String> {
        self.ensure_connected("create_unique_index", Some(collection))?;
        self.indexes.create(self, collection, index, true).await
    }

    async fn get_indexes(&self, collection: &str) -> DbResult<Vec<IndexDefinition>> {
        self.ensure_connected("get_indexes", Some(collection))?;
        self.indexes.list(self, collection, false).await
    }

    async fn get_unique_indexes(&self, collection: &str) -> DbResult<Vec<IndexDefinition>> {
        self.ensure_connected("get_unique_indexes", Some(collection))?;
        self.indexes.list(self, collection, true).await
    }

    async fn drop_index(&self, collection: &str, fields: &[String]) -> DbResult<()> {
        self.ensure_connected("drop_index", Some(collection))?;
        self.indexes.drop(self, collection, fields).await
    }

    async fn sync_indexes(
        &self,
        collection: &str,
        desired: Vec<IndexDefinition>,
    ) -> DbResult<SyncReport> {
        self.ensure_connected("sync_indexes", Some(collection))?;
        self.indexes.sync(self, collection, &desired, false).await
    }

    async fn sync_unique_indexes(
        &self,
        collection: &str,
        desired: Vec<IndexDefinition>,
    ) -> DbResult<SyncReport> {
        self.ensure_connected("sync_unique_indexes", Some(collection))?;
        self.indexes.sync(self, collection, &desired, true).await
    }
}

#[async_trait]
impl IndexBackend for MemoryDatabase {
    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexInfo>> {
        Ok(self
            .collections
            .read()
            .get(collection)
            .map(Collection::indexes)
            .unwrap_or_default())
    }

    async fn create_index_raw(
        &self,
        collection: &str,
        index: &IndexDefinition,
        name: &str,
        unique: bool,
    ) -> DbResult<()> {
        // Unique key tables must not race with writes.
        let _guard = self.writes.lock(WRITE_KEY).await;
        let mut collections = self.collections.write();
        collections
            .entry(collection.to_string())
            .or_insert_with(|| Collection::new(collection))
            .add_index(index, name, unique)
    }

    async fn drop_index_raw(&self, collection: &str, name: &str) -> DbResult<()> {
        let _guard = self.writes.lock(WRITE_KEY).await;
        let dropped = self
            .collections
            .write()
            .get_mut(collection)
            .is_some_and(|target| target.drop_index(name));
        if dropped {
            Ok(())
        } else {
            Err(DbError::backend(format!(
                "index {name} not found on {collection}"
            )))
        }
    }
}

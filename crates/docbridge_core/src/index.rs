//! Index definitions, diffing and synchronization.
//!
//! Indexes are identified by what they cover, not what they are called:
//! two definitions are the same index iff their field sets (order
//! independent) and partial filters match. Stored names are ignored when
//! comparing, so indexes created under a legacy naming scheme are never
//! dropped and recreated just to rename them.
//!
//! Backends supply three primitives through [`IndexBackend`]; the
//! [`IndexManager`] layers existence checks, drop-by-fields and sync on
//! top, funnelling every compare-and-mutate sequence for a collection
//! through a [`KeyedMutex`].

use crate::error::{DbError, DbResult};
use crate::mutex::KeyedMutex;
use crate::value::{Document, Value};
use async_trait::async_trait;
use std::collections::HashSet;
use tracing::{debug, info};

/// A declared index: fields, optional partial filter, optional name.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    /// Indexed fields, in declared order.
    pub fields: Vec<String>,
    /// Partial filter; only matching records are indexed.
    pub filter: Option<Document>,
    /// Explicit name; a deterministic default is derived when absent.
    pub name: Option<String>,
}

impl IndexDefinition {
    /// Creates a definition over `fields`.
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            filter: None,
            name: None,
        }
    }

    /// Sets the partial filter.
    #[must_use]
    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets an explicit name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the identity used for comparison.
    ///
    /// Field names are sorted here only; the persisted order is kept.
    pub fn identity(&self) -> IndexIdentity {
        let mut fields = self.fields.clone();
        fields.sort();
        IndexIdentity {
            fields,
            filter: self
                .filter
                .as_ref()
                .map(|f| Value::Map(f.clone()).to_string()),
        }
    }

    /// Returns true if `fields` names the same field set.
    pub fn covers(&self, fields: &[String]) -> bool {
        let mut mine = self.fields.clone();
        let mut theirs = fields.to_vec();
        mine.sort();
        theirs.sort();
        mine == theirs
    }

    /// Deterministic name derived from the fields and the filter flag.
    pub fn default_name(&self) -> String {
        let mut name = self
            .fields
            .iter()
            .map(|f| format!("{f}_1"))
            .collect::<Vec<_>>()
            .join("_");
        if self.filter.is_some() {
            name.push_str("_partial");
        }
        name
    }

    /// The explicit name, or the default one.
    pub fn resolved_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.default_name())
    }
}

/// Normalised index identity: sorted fields plus canonical filter text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexIdentity {
    fields: Vec<String>,
    filter: Option<String>,
}

/// An index as it exists on a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    /// The definition, with the stored name filled in.
    pub definition: IndexDefinition,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

/// Creations and drops needed to reach a desired index set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    /// Desired but not present.
    pub create: Vec<IndexDefinition>,
    /// Present but not desired.
    pub drop: Vec<IndexDefinition>,
}

impl SyncPlan {
    /// Returns true if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.drop.is_empty()
    }
}

/// What a sync actually did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Names of created indexes.
    pub created: Vec<String>,
    /// Names of dropped indexes.
    pub dropped: Vec<String>,
}

impl SyncReport {
    /// Returns true if the sync changed nothing.
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.dropped.is_empty()
    }
}

/// Diffs the current index set against the desired one.
///
/// Indexes in both sets are left untouched even when their names differ.
/// Duplicate identities in `desired` are created once.
pub fn plan_sync(current: &[IndexDefinition], desired: &[IndexDefinition]) -> SyncPlan {
    let current_ids: HashSet<IndexIdentity> = current.iter().map(IndexDefinition::identity).collect();
    let desired_ids: HashSet<IndexIdentity> = desired.iter().map(IndexDefinition::identity).collect();

    let mut seen = HashSet::new();
    let create = desired
        .iter()
        .filter(|d| {
            let id = d.identity();
            !current_ids.contains(&id) && seen.insert(id)
        })
        .cloned()
        .collect();
    let drop = current
        .iter()
        .filter(|c| !desired_ids.contains(&c.identity()))
        .cloned()
        .collect();

    SyncPlan { create, drop }
}

/// Index primitives a backend provides.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    /// Lists every index on the collection, unique or not.
    ///
    /// A collection that does not exist has no indexes.
    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<IndexInfo>>;

    /// Creates an index under the given name.
    ///
    /// Must fail [`DbError::DuplicateKey`] when `unique` is set and existing
    /// records already collide, creating nothing.
    async fn create_index_raw(
        &self,
        collection: &str,
        index: &IndexDefinition,
        name: &str,
        unique: bool,
    ) -> DbResult<()>;

    /// Drops the named index.
    async fn drop_index_raw(&self, collection: &str, name: &str) -> DbResult<()>;
}

/// Index lifecycle over any [`IndexBackend`].
#[derive(Debug, Default)]
pub struct IndexManager {
    locks: KeyedMutex,
}

impl IndexManager {
    /// Creates a new index manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_key(collection: &str) -> String {
        format!("index-sync:{collection}")
    }

    /// Creates an index unless one with the same identity exists.
    ///
    /// Returns the index name.
    ///
    /// # Errors
    ///
    /// [`DbError::IndexExists`] if the identity is taken, or whatever the
    /// backend reports (notably [`DbError::DuplicateKey`]).
    pub async fn create<B: IndexBackend + ?Sized>(
        &self,
        backend: &B,
        collection: &str,
        index: IndexDefinition,
        unique: bool,
    ) -> DbResult<String> {
        let _guard = self.locks.lock(&Self::lock_key(collection)).await;
        let current = backend.list_indexes(collection).await?;
        self.create_locked(backend, collection, &current, &index, unique)
            .await
    }

    async fn create_locked<B: IndexBackend + ?Sized>(
        &self,
        backend: &B,
        collection: &str,
        current: &[IndexInfo],
        index: &IndexDefinition,
        unique: bool,
    ) -> DbResult<String> {
        let identity = index.identity();
        if current
            .iter()
            .any(|info| info.definition.identity() == identity)
        {
            return Err(DbError::IndexExists {
                collection: collection.to_string(),
                fields: index.fields.clone(),
            });
        }

        let name = index.resolved_name();
        backend
            .create_index_raw(collection, index, &name, unique)
            .await?;
        info!(collection, index = %name, unique, "created index");
        Ok(name)
    }

    /// Lists indexes of one kind.
    ///
    /// # Errors
    ///
    /// Propagates backend failures.
    pub async fn list<B: IndexBackend + ?Sized>(
        &self,
        backend: &B,
        collection: &str,
        unique: bool,
    ) -> DbResult<Vec<IndexDefinition>> {
        Ok(backend
            .list_indexes(collection)
            .await?
            .into_iter()
            .filter(|info| info.unique == unique)
            .map(|info| info.definition)
            .collect())
    }

    /// Drops the index covering exactly `fields` (order independent).
    ///
    /// # Errors
    ///
    /// [`DbError::IndexNotFound`] naming the field list if none matches.
    pub async fn drop<B: IndexBackend + ?Sized>(
        &self,
        backend: &B,
        collection: &str,
        fields: &[String],
    ) -> DbResult<()> {
        let _guard = self.locks.lock(&Self::lock_key(collection)).await;
        let current = backend.list_indexes(collection).await?;
        let target = current
            .iter()
            .find(|info| info.definition.covers(fields))
            .ok_or_else(|| DbError::IndexNotFound {
                collection: collection.to_string(),
                missing_index: fields.to_vec(),
            })?;

        let name = target.definition.resolved_name();
        backend.drop_index_raw(collection, &name).await?;
        info!(collection, index = %name, "dropped index");
        Ok(())
    }

    /// Reconciles the collection's indexes of one kind with `desired`.
    ///
    /// Safe under concurrent calls for the same collection: the whole
    /// list-diff-apply sequence runs under the collection's lock.
    ///
    /// # Errors
    ///
    /// [`DbError::IndexExists`] if a desired index matches an existing
    /// index of the other kind; backend failures otherwise. Changes made
    /// before a failure are kept.
    pub async fn sync<B: IndexBackend + ?Sized>(
        &self,
        backend: &B,
        collection: &str,
        desired: &[IndexDefinition],
        unique: bool,
    ) -> DbResult<SyncReport> {
        let _guard = self.locks.lock(&Self::lock_key(collection)).await;
        let all = backend.list_indexes(collection).await?;
        let current: Vec<IndexDefinition> = all
            .iter()
            .filter(|info| info.unique == unique)
            .map(|info| info.definition.clone())
            .collect();

        let plan = plan_sync(&current, desired);
        debug!(
            collection,
            unique,
            create = plan.create.len(),
            drop = plan.drop.len(),
            "planned index sync"
        );

        let mut report = SyncReport::default();
        for index in &plan.drop {
            let name = index.resolved_name();
            backend.drop_index_raw(collection, &name).await?;
            info!(collection, index = %name, "dropped index");
            report.dropped.push(name);
        }

        let remaining: Vec<IndexInfo> = all
            .into_iter()
            .filter(|info| !plan.drop.contains(&info.definition))
            .collect();
        for index in &plan.create {
            let name = self
                .create_locked(backend, collection, &remaining, index, unique)
                .await?;
            report.created.push(name);
        }

        Ok(report)
    }
}

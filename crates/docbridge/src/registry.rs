//! Caller-owned cache of live connections.

use crate::url::open;
use docbridge_core::{Database, DatabaseOptions, DbResult, KeyedMutex};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Reuses one connected handle per connection string and database name.
///
/// Concurrent requests for the same key open a single connection; requests
/// for different keys proceed independently.
#[derive(Default)]
pub struct ConnectionRegistry {
    handles: Mutex<HashMap<String, Arc<dyn Database>>>,
    opening: KeyedMutex,
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("handles", &self.handles.lock().len())
            .finish()
    }
}

/// Canonical registry key: trimmed URL without trailing `/`, plus the
/// database name.
pub fn registry_key(url: &str, options: &DatabaseOptions) -> String {
    format!(
        "{}|{}",
        url.trim().trim_end_matches('/'),
        options.database_name
    )
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached live handle, or opens and connects a new one.
    ///
    /// # Errors
    ///
    /// Propagates [`crate::open`] and connect failures; nothing is cached
    /// on failure.
    pub async fn get_or_connect(
        &self,
        url: &str,
        options: DatabaseOptions,
    ) -> DbResult<Arc<dyn Database>> {
        let key = registry_key(url, &options);
        let _guard = self.opening.lock(&key).await;

        let cached = self.handles.lock().get(&key).cloned();
        if let Some(db) = cached {
            if db.is_connected() {
                return Ok(db);
            }
        }

        let db = open(url, options)?;
        db.connect().await?;
        self.handles.lock().insert(key.clone(), Arc::clone(&db));
        info!(key = %key, "registered connection");
        Ok(db)
    }

    /// Number of cached handles.
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Closes every cached handle and clears the registry.
    ///
    /// # Errors
    ///
    /// Returns the first close failure; every handle is still attempted.
    pub async fn close_all(&self) -> DbResult<()> {
        let handles: Vec<_> = self.handles.lock().drain().map(|(_, db)| db).collect();
        let mut first_error = None;
        for db in handles {
            if let Err(e) = db.close().await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

//! Connection-string dispatch.

use docbridge_core::{BackendKind, Database, DatabaseOptions, DbError, DbResult};
use docbridge_memory::MemoryDatabase;
use docbridge_mongo::MongoDatabase;
use std::sync::Arc;
use tracing::debug;

/// Scheme of the embedded backend.
pub const MEMORY_SCHEME: &str = "memory";

/// Schemes of the networked backend.
pub const MONGO_SCHEMES: &[&str] = &["mongodb", "mongodb+srv"];

/// Returns the backend a connection string selects.
///
/// # Errors
///
/// - [`DbError::InvalidConnectionString`] if there is no `scheme://` prefix
/// - [`DbError::InvalidConnectionStringScheme`] for an unknown scheme
pub fn backend_for(url: &str) -> DbResult<BackendKind> {
    let trimmed = url.trim();
    let scheme = match trimmed.split_once("://") {
        Some((scheme, _)) if !scheme.is_empty() => scheme.to_ascii_lowercase(),
        _ => {
            return Err(DbError::invalid_connection_string(
                url,
                "expected <scheme>://",
            ))
        }
    };

    if scheme == MEMORY_SCHEME {
        Ok(BackendKind::Memory)
    } else if MONGO_SCHEMES.contains(&scheme.as_str()) {
        Ok(BackendKind::Mongo)
    } else {
        Err(DbError::InvalidConnectionStringScheme { scheme })
    }
}

/// Creates an unconnected database for `url`.
///
/// # Errors
///
/// See [`backend_for`]; also propagates the backend's own construction
/// checks (database name, driver-level URL parsing).
pub fn open(url: &str, options: DatabaseOptions) -> DbResult<Arc<dyn Database>> {
    let backend = backend_for(url)?;
    debug!(%backend, database = %options.database_name, "opening database");
    let db: Arc<dyn Database> = match backend {
        BackendKind::Memory => Arc::new(MemoryDatabase::new(options)?),
        BackendKind::Mongo => Arc::new(MongoDatabase::new(url.trim(), options)?),
    };
    Ok(db)
}

/// Creates and connects a database for `url`.
///
/// # Errors
///
/// See [`open`]; also [`DbError::UnableToConnect`] from the backend.
pub async fn connect(url: &str, options: DatabaseOptions) -> DbResult<Arc<dyn Database>> {
    let db = open(url, options)?;
    db.connect().await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schemes_select_backends() {
        assert_eq!(backend_for("memory://local").unwrap(), BackendKind::Memory);
        assert_eq!(backend_for("mongodb://h:27017").unwrap(), BackendKind::Mongo);
        assert_eq!(backend_for("mongodb+srv://cluster").unwrap(), BackendKind::Mongo);
        assert_eq!(backend_for("  MongoDB://h ").unwrap(), BackendKind::Mongo);
    }

    #[test]
    fn missing_scheme_is_an_invalid_string() {
        for url in ["localhost:27017", "", "://host"] {
            let err = backend_for(url).unwrap_err();
            assert_eq!(err.code(), "INVALID_DB_CONNECTION_STRING", "url {url:?}");
        }
    }

    #[test]
    fn unknown_scheme_is_named() {
        match backend_for("postgres://h/db").unwrap_err() {
            DbError::InvalidConnectionStringScheme { scheme } => assert_eq!(scheme, "postgres"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn database_name_is_validated_for_every_backend() {
        for url in ["memory://x", "mongodb://localhost:27017"] {
            let err = open(url, DatabaseOptions::new("undefined")).err().expect("expected an error");
            assert_eq!(err.code(), "INVALID_DATABASE_NAME", "url {url}");
        }
    }

    #[tokio::test]
    async fn connect_returns_a_live_handle() {
        let db = connect("memory://local", DatabaseOptions::new("shop"))
            .await
            .unwrap();
        assert!(db.is_connected());
        assert_eq!(db.backend(), BackendKind::Memory);
    }
}

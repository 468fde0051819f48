//! Error taxonomy for DocBridge.
//!
//! Every backend re-wraps its native failures into [`DbError`] at the
//! translation boundary. Each variant carries structured context and a
//! stable string code (see [`DbError::code`]), so callers never have to
//! parse messages.

use crate::value::{Document, Value};
use std::fmt;
use thiserror::Error;

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// The kind of write that produced a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    /// `create_one` / `create`.
    Create,
    /// `update_one` / `update`.
    Update,
    /// `upsert_one`.
    Upsert,
}

impl WriteAction {
    /// Returns the lowercase action name.
    pub const fn as_str(self) -> &'static str {
        match self {
            WriteAction::Create => "create",
            WriteAction::Update => "update",
            WriteAction::Upsert => "upsert",
        }
    }
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in DocBridge operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// An operation was attempted before `connect` or after `close`.
    #[error("database not connected: cannot {operation}{}", fmt_collection(.collection))]
    NotConnected {
        /// The attempted operation.
        operation: String,
        /// The collection the operation targeted, if any.
        collection: Option<String>,
    },

    /// The connection string could not be parsed.
    #[error("invalid connection string {connection_string:?}: {reason}")]
    InvalidConnectionString {
        /// The offending connection string.
        connection_string: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The connection string uses a scheme no backend handles.
    #[error("invalid connection string scheme: {scheme:?}")]
    InvalidConnectionStringScheme {
        /// The unrecognized scheme.
        scheme: String,
    },

    /// The server could not be reached within the selection timeout.
    #[error("unable to connect to database: {reason}")]
    UnableToConnect {
        /// Driver-reported reason.
        reason: String,
    },

    /// A reserved or otherwise invalid database name was supplied.
    #[error("invalid database name: {supplied_name:?}")]
    InvalidDatabaseName {
        /// The rejected name.
        supplied_name: String,
    },

    /// A singular update matched nothing.
    #[error("record not found in {collection} for query {}", Value::Map(.query.clone()))]
    RecordNotFound {
        /// The collection searched.
        collection: String,
        /// The query that matched nothing.
        query: Document,
    },

    /// A write violated a unique index.
    #[error(
        "duplicate record in {collection} on {duplicate_fields:?} = {} during {action}",
        Value::Array(.duplicate_values.clone())
    )]
    DuplicateRecord {
        /// The collection written to.
        collection: String,
        /// Fields of the violated unique index.
        duplicate_fields: Vec<String>,
        /// Colliding values, aligned with `duplicate_fields`.
        duplicate_values: Vec<Value>,
        /// The write that collided.
        action: WriteAction,
    },

    /// An index with the same identity already exists.
    #[error("index on {fields:?} already exists in {collection}")]
    IndexExists {
        /// The collection.
        collection: String,
        /// Fields of the existing index.
        fields: Vec<String>,
    },

    /// No index with the given field list exists.
    #[error("index on {missing_index:?} not found in {collection}")]
    IndexNotFound {
        /// The collection.
        collection: String,
        /// The field list that matched no index.
        missing_index: Vec<String>,
    },

    /// Existing data violates a unique index being created.
    #[error("cannot create unique index on {fields:?} in {collection}: existing records collide")]
    DuplicateKey {
        /// The collection.
        collection: String,
        /// Fields of the rejected unique index.
        fields: Vec<String>,
    },

    /// An identifier inside a query could not be translated.
    #[error("identifier mapping failed for query {}: {reason}", Value::Map(.query.clone()))]
    IdMapping {
        /// The query being translated.
        query: Document,
        /// What could not be mapped.
        reason: String,
    },

    /// The query uses an unknown operator or a malformed operand.
    #[error("invalid query: {reason}")]
    InvalidQuery {
        /// Description of the problem.
        reason: String,
    },

    /// The update document is malformed.
    #[error("invalid update: {reason}")]
    InvalidUpdate {
        /// Description of the problem.
        reason: String,
    },

    /// Any other backend failure.
    #[error("backend error: {message}")]
    Backend {
        /// Backend-reported message.
        message: String,
    },
}

fn fmt_collection(collection: &Option<String>) -> String {
    collection
        .as_deref()
        .map(|c| format!(" on collection {c}"))
        .unwrap_or_default()
}

impl DbError {
    /// Returns the stable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            DbError::NotConnected { .. } => "DATABASE_NOT_CONNECTED",
            DbError::InvalidConnectionString { .. } => "INVALID_DB_CONNECTION_STRING",
            DbError::InvalidConnectionStringScheme { .. } => "INVALID_CONNECTION_STRING_SCHEME",
            DbError::UnableToConnect { .. } => "UNABLE_TO_CONNECT_TO_DB",
            DbError::InvalidDatabaseName { .. } => "INVALID_DATABASE_NAME",
            DbError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            DbError::DuplicateRecord { .. } => "DUPLICATE_RECORD",
            DbError::IndexExists { .. } => "INDEX_EXISTS",
            DbError::IndexNotFound { .. } => "INDEX_NOT_FOUND",
            DbError::DuplicateKey { .. } => "DUPLICATE_KEY",
            DbError::IdMapping { .. } => "MONGO_ID_MAPPING_ERROR",
            DbError::InvalidQuery { .. } => "INVALID_QUERY",
            DbError::InvalidUpdate { .. } => "INVALID_UPDATE",
            DbError::Backend { .. } => "BACKEND_ERROR",
        }
    }

    /// Creates a not-connected error.
    pub fn not_connected(operation: impl Into<String>, collection: Option<&str>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
            collection: collection.map(str::to_string),
        }
    }

    /// Creates an invalid connection string error.
    pub fn invalid_connection_string(
        connection_string: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConnectionString {
            connection_string: connection_string.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unable-to-connect error.
    pub fn unable_to_connect(reason: impl Into<String>) -> Self {
        Self::UnableToConnect {
            reason: reason.into(),
        }
    }

    /// Creates a record-not-found error.
    pub fn record_not_found(collection: impl Into<String>, query: Document) -> Self {
        Self::RecordNotFound {
            collection: collection.into(),
            query,
        }
    }

    /// Creates a duplicate record error.
    pub fn duplicate_record(
        collection: impl Into<String>,
        duplicate_fields: Vec<String>,
        duplicate_values: Vec<Value>,
        action: WriteAction,
    ) -> Self {
        Self::DuplicateRecord {
            collection: collection.into(),
            duplicate_fields,
            duplicate_values,
            action,
        }
    }

    /// Creates an identifier mapping error.
    pub fn id_mapping(query: &Document, reason: impl Into<String>) -> Self {
        Self::IdMapping {
            query: query.clone(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid query error.
    pub fn invalid_query(reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            reason: reason.into(),
        }
    }

    /// Creates an invalid update error.
    pub fn invalid_update(reason: impl Into<String>) -> Self {
        Self::InvalidUpdate {
            reason: reason.into(),
        }
    }

    /// Creates a generic backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Returns true for [`DbError::DuplicateRecord`].
    pub fn is_duplicate_record(&self) -> bool {
        matches!(self, DbError::DuplicateRecord { .. })
    }

    /// Returns true for [`DbError::RecordNotFound`].
    pub fn is_record_not_found(&self) -> bool {
        matches!(self, DbError::RecordNotFound { .. })
    }

    /// Returns true for [`DbError::NotConnected`].
    pub fn is_not_connected(&self) -> bool {
        matches!(self, DbError::NotConnected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn codes_are_stable() {
        assert_eq!(
            DbError::not_connected("find", Some("widgets")).code(),
            "DATABASE_NOT_CONNECTED"
        );
        assert_eq!(
            DbError::id_mapping(&record! { "id" => "x" }, "bad").code(),
            "MONGO_ID_MAPPING_ERROR"
        );
        assert_eq!(
            DbError::InvalidConnectionStringScheme { scheme: "ftp".into() }.code(),
            "INVALID_CONNECTION_STRING_SCHEME"
        );
    }

    #[test]
    fn duplicate_record_display_names_fields_values_and_action() {
        let err = DbError::duplicate_record(
            "widgets",
            vec!["sku".into()],
            vec![Value::from("A")],
            WriteAction::Create,
        );
        let message = err.to_string();
        assert!(message.contains("widgets"));
        assert!(message.contains("sku"));
        assert!(message.contains("\"A\""));
        assert!(message.ends_with("during create"));
        assert!(err.is_duplicate_record());
    }

    #[test]
    fn not_connected_display() {
        let err = DbError::not_connected("count", None);
        assert_eq!(err.to_string(), "database not connected: cannot count");

        let err = DbError::not_connected("count", Some("widgets"));
        assert_eq!(
            err.to_string(),
            "database not connected: cannot count on collection widgets"
        );
    }
}

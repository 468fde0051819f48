//! Connection options.

use crate::error::{DbError, DbResult};
use std::time::Duration;

/// Database names no backend accepts.
///
/// `"undefined"` and `"null"` typically leak in from unset configuration
/// values upstream.
pub const RESERVED_DATABASE_NAMES: &[&str] = &["undefined", "null"];

/// Characters the document store forbids in database names.
const FORBIDDEN_NAME_CHARS: &[char] = &['/', '\\', '.', ' ', '"', '$', '\0'];

/// Options passed alongside a connection string.
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    /// Name of the database to operate on.
    pub database_name: String,

    /// How long `connect` waits to select a server before failing.
    pub server_selection_timeout: Duration,

    /// Application name reported to the server.
    pub app_name: Option<String>,

    /// Whether the embedded backend assigns identifiers on create.
    pub auto_id: bool,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            database_name: "docbridge".to_string(),
            server_selection_timeout: Duration::from_secs(5),
            app_name: None,
            auto_id: true,
        }
    }
}

impl DatabaseOptions {
    /// Creates options for the given database name.
    #[must_use]
    pub fn new(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            ..Self::default()
        }
    }

    /// Sets the server selection timeout.
    #[must_use]
    pub fn server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = timeout;
        self
    }

    /// Sets the application name.
    #[must_use]
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    /// Sets whether identifiers are auto-assigned.
    #[must_use]
    pub fn auto_id(mut self, value: bool) -> Self {
        self.auto_id = value;
        self
    }

    /// Validates the database name.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidDatabaseName`] for empty names, reserved
    /// literals and names containing forbidden characters.
    pub fn validate(&self) -> DbResult<()> {
        let name = self.database_name.as_str();
        let invalid = name.is_empty()
            || RESERVED_DATABASE_NAMES.contains(&name)
            || name.contains(FORBIDDEN_NAME_CHARS);

        if invalid {
            return Err(DbError::InvalidDatabaseName {
                supplied_name: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = DatabaseOptions::default();
        assert_eq!(options.database_name, "docbridge");
        assert_eq!(options.server_selection_timeout, Duration::from_secs(5));
        assert!(options.auto_id);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn builder_pattern() {
        let options = DatabaseOptions::new("inventory")
            .server_selection_timeout(Duration::from_millis(250))
            .app_name("tests")
            .auto_id(false);

        assert_eq!(options.database_name, "inventory");
        assert_eq!(options.server_selection_timeout, Duration::from_millis(250));
        assert_eq!(options.app_name.as_deref(), Some("tests"));
        assert!(!options.auto_id);
    }

    #[test]
    fn rejects_reserved_and_malformed_names() {
        for name in ["undefined", "null", "", "a.b", "a/b", "has space", "$x"] {
            let err = DatabaseOptions::new(name).validate().unwrap_err();
            assert_eq!(err.code(), "INVALID_DATABASE_NAME", "name {name:?}");
        }
    }
}

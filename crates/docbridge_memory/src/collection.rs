//! Row storage for one collection.

use crate::dialect::{restore_nulls, MemoryDialect, NATIVE_ID_FIELD};
use crate::matcher::Filter;
use docbridge_core::{
    DbError, DbResult, Document, IndexDefinition, IndexInfo, Value, WriteAction, ID_FIELD,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Internal row number; rows iterate in insertion order.
pub type RowId = u64;

/// Key-to-rows table enforcing one unique index.
///
/// Keys are the canonical text of the indexed values, with missing
/// fields read as null.
#[derive(Debug, Default)]
pub struct UniqueKeys {
    entries: HashMap<String, HashSet<RowId>>,
}

impl UniqueKeys {
    /// Returns a row other than `except` already holding `key`.
    fn conflict(&self, key: &str, except: Option<RowId>) -> Option<RowId> {
        self.entries
            .get(key)?
            .iter()
            .copied()
            .find(|row| Some(*row) != except)
    }

    fn insert(&mut self, key: String, row: RowId) {
        self.entries.entry(key).or_default().insert(row);
    }

    fn remove(&mut self, key: &str, row: RowId) {
        if let Some(rows) = self.entries.get_mut(key) {
            rows.remove(&row);
            if rows.is_empty() {
                self.entries.remove(key);
            }
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no keys are held.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// An index attached to a collection.
#[derive(Debug)]
struct StoredIndex {
    info: IndexInfo,
    name: String,
    /// Stored-document paths of the declared fields.
    paths: Vec<String>,
    partial: Option<Filter>,
    keys: Option<UniqueKeys>,
}

impl StoredIndex {
    fn applies_to(&self, document: &Document) -> bool {
        self.partial.as_ref().map_or(true, |f| f.matches(document))
    }

    /// Indexed values of `document`, placeholders read as null.
    fn values(&self, document: &Document) -> Vec<Value> {
        self.paths
            .iter()
            .map(|path| {
                Value::lookup(document, path)
                    .cloned()
                    .map_or(Value::Null, restore_nulls)
            })
            .collect()
    }

    fn key(&self, document: &Document) -> Option<String> {
        self.applies_to(document)
            .then(|| Value::Array(self.values(document)).to_string())
    }
}

/// Rows, identifier table and indexes of one collection.
#[derive(Debug)]
pub struct Collection {
    name: String,
    rows: BTreeMap<RowId, Document>,
    next_row: RowId,
    ids: HashMap<String, RowId>,
    indexes: Vec<StoredIndex>,
}

/// Maps a contract field path onto the stored document layout.
fn native_path(field: &str) -> String {
    match field.strip_prefix(ID_FIELD) {
        Some("") => NATIVE_ID_FIELD.to_string(),
        Some(rest) if rest.starts_with('.') => format!("{NATIVE_ID_FIELD}{rest}"),
        _ => field.to_string(),
    }
}

fn id_key(document: &Document) -> Option<String> {
    document.get(NATIVE_ID_FIELD).map(ToString::to_string)
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: BTreeMap::new(),
            next_row: 0,
            ids: HashMap::new(),
            indexes: Vec::new(),
        }
    }

    /// Number of stored rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the collection holds no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the stored document of `row`.
    pub fn get(&self, row: RowId) -> Option<&Document> {
        self.rows.get(&row)
    }

    /// Rows matching `filter`, in insertion order.
    pub fn matching(&self, filter: &Filter) -> Vec<RowId> {
        self.rows
            .iter()
            .filter(|(_, doc)| filter.matches(doc))
            .map(|(row, _)| *row)
            .collect()
    }

    /// First row matching `filter`.
    pub fn first_matching(&self, filter: &Filter) -> Option<RowId> {
        self.rows
            .iter()
            .find(|(_, doc)| filter.matches(doc))
            .map(|(row, _)| *row)
    }

    /// Checks `document` against the identifier table and every unique
    /// index, ignoring `except`.
    fn check(&self, document: &Document, except: Option<RowId>, action: WriteAction) -> DbResult<()> {
        if let Some(key) = id_key(document) {
            if self.ids.get(&key).is_some_and(|row| Some(*row) != except) {
                let id = document
                    .get(NATIVE_ID_FIELD)
                    .cloned()
                    .unwrap_or(Value::Null);
                return Err(DbError::duplicate_record(
                    &self.name,
                    vec!["id".to_string()],
                    vec![id],
                    action,
                ));
            }
        }

        for index in &self.indexes {
            let (Some(keys), Some(key)) = (&index.keys, index.key(document)) else {
                continue;
            };
            if keys.conflict(&key, except).is_some() {
                return Err(DbError::duplicate_record(
                    &self.name,
                    index.info.definition.fields.clone(),
                    index.values(document),
                    action,
                ));
            }
        }
        Ok(())
    }

    fn register(&mut self, row: RowId, document: &Document) {
        if let Some(key) = id_key(document) {
            self.ids.insert(key, row);
        }
        for index in &mut self.indexes {
            if let Some(key) = index.key(document) {
                if let Some(keys) = index.keys.as_mut() {
                    keys.insert(key, row);
                }
            }
        }
    }

    fn unregister(&mut self, row: RowId, document: &Document) {
        if let Some(key) = id_key(document) {
            if self.ids.get(&key) == Some(&row) {
                self.ids.remove(&key);
            }
        }
        for index in &mut self.indexes {
            if let Some(key) = index.key(document) {
                if let Some(keys) = index.keys.as_mut() {
                    keys.remove(&key, row);
                }
            }
        }
    }

    /// Inserts a stored document.
    ///
    /// # Errors
    ///
    /// [`DbError::DuplicateRecord`] if the identifier or a unique key is
    /// taken.
    pub fn insert(&mut self, document: Document, action: WriteAction) -> DbResult<RowId> {
        self.check(&document, None, action)?;
        let row = self.next_row;
        self.next_row += 1;
        self.register(row, &document);
        self.rows.insert(row, document);
        Ok(row)
    }

    /// Replaces the document of `row`.
    ///
    /// # Errors
    ///
    /// [`DbError::DuplicateRecord`] if the new content collides with
    /// another row; the old content stays in place.
    pub fn replace(&mut self, row: RowId, document: Document, action: WriteAction) -> DbResult<()> {
        self.check(&document, Some(row), action)?;
        if let Some(old) = self.rows.remove(&row) {
            self.unregister(row, &old);
        }
        self.register(row, &document);
        self.rows.insert(row, document);
        Ok(())
    }

    /// Removes `row`, returning its document.
    pub fn remove(&mut self, row: RowId) -> Option<Document> {
        let document = self.rows.remove(&row)?;
        self.unregister(row, &document);
        Some(document)
    }

    /// Lists the attached indexes.
    pub fn indexes(&self) -> Vec<IndexInfo> {
        self.indexes.iter().map(|i| i.info.clone()).collect()
    }

    /// Attaches an index, building its key table when unique.
    ///
    /// # Errors
    ///
    /// [`DbError::DuplicateKey`] if existing rows already collide; nothing
    /// is attached. [`DbError::InvalidQuery`] for a malformed partial
    /// filter.
    pub fn add_index(&mut self, definition: &IndexDefinition, name: &str, unique: bool) -> DbResult<()> {
        let partial = definition
            .filter
            .as_ref()
            .map(|f| {
                let native = docbridge_core::translate::translate_query(&MemoryDialect, f)?;
                Filter::compile(&native)
            })
            .transpose()?;

        let mut index = StoredIndex {
            info: IndexInfo {
                definition: definition.clone().with_name(name),
                unique,
            },
            name: name.to_string(),
            paths: definition.fields.iter().map(|f| native_path(f)).collect(),
            partial,
            keys: None,
        };

        if unique {
            let mut keys = UniqueKeys::default();
            for (row, document) in &self.rows {
                if let Some(key) = index.key(document) {
                    if keys.conflict(&key, None).is_some() {
                        return Err(DbError::DuplicateKey {
                            collection: self.name.clone(),
                            fields: definition.fields.clone(),
                        });
                    }
                    keys.insert(key, *row);
                }
            }
            index.keys = Some(keys);
        }

        self.indexes.push(index);
        Ok(())
    }

    /// Detaches the named index; returns whether it existed.
    pub fn drop_index(&mut self, name: &str) -> bool {
        let before = self.indexes.len();
        self.indexes.retain(|i| i.name != name);
        self.indexes.len() != before
    }

    /// Distinct keys held by the named unique index.
    pub fn unique_key_count(&self, name: &str) -> Option<usize> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .and_then(|i| i.keys.as_ref())
            .map(UniqueKeys::len)
    }
}

//! Identifier and query translation.
//!
//! One query dialect is used at every call site. A [`Dialect`] describes
//! how a backend represents values, documents and identifiers natively;
//! the functions here rewrite queries, records and updates into that
//! representation and restore native results into contract records.
//!
//! # Identifier rules
//!
//! - The reserved field `id` maps to [`Dialect::id_field`], at any depth
//!   of `$and` / `$or` / `$nor`.
//! - A scalar `id` that the dialect cannot parse falls back to the raw
//!   value.
//! - An identifier inside `$in` / `$nin` or under `$ne`, `$gt`, `$gte`,
//!   `$lt`, `$lte` must translate; failure is
//!   [`DbError::IdMapping`](crate::DbError::IdMapping). Silently not
//!   matching would hide a data-integrity bug.

use crate::error::{DbError, DbResult};
use crate::value::{Document, Value};

/// The reserved identifier field at the contract boundary.
pub const ID_FIELD: &str = "id";

const LOGICAL_OPERATORS: &[&str] = &["$and", "$or", "$nor"];
const STRICT_ID_OPERATORS: &[&str] = &["$ne", "$gt", "$gte", "$lt", "$lte"];
const LIST_OPERATORS: &[&str] = &["$in", "$nin"];

/// A backend's native value representation.
pub trait Dialect {
    /// Native value type.
    type Value;
    /// Native document type.
    type Document;

    /// Field name the backend stores identifiers under.
    fn id_field(&self) -> &str;

    /// Converts an identifier to its native form.
    ///
    /// Returns `None` when the value is not a valid native identifier.
    fn encode_id(&self, id: &Value) -> Option<Self::Value>;

    /// Converts a native identifier back to a contract value.
    fn decode_id(&self, id: Self::Value) -> Value {
        self.decode_value(id)
    }

    /// Converts a value to its native form.
    fn encode_value(&self, value: &Value) -> Self::Value;

    /// Converts a native value back to a contract value.
    fn decode_value(&self, value: Self::Value) -> Value;

    /// Wraps a native document as a native value.
    fn nest(&self, document: Self::Document) -> Self::Value;

    /// Builds a native array.
    fn array(&self, items: Vec<Self::Value>) -> Self::Value;

    /// Builds a native document from entries.
    fn document(&self, entries: Vec<(String, Self::Value)>) -> Self::Document;

    /// Splits a native document into entries.
    fn entries(&self, document: Self::Document) -> Vec<(String, Self::Value)>;
}

/// Translates a query into the dialect's native filter.
///
/// # Errors
///
/// Returns [`DbError::InvalidQuery`] for malformed logical operators and
/// [`DbError::IdMapping`] for untranslatable identifiers inside
/// collection operators.
pub fn translate_query<D: Dialect>(dialect: &D, query: &Document) -> DbResult<D::Document> {
    translate_filter(dialect, query, query)
}

fn translate_filter<D: Dialect>(
    dialect: &D,
    filter: &Document,
    root: &Document,
) -> DbResult<D::Document> {
    let mut entries = Vec::with_capacity(filter.len());

    for (key, value) in filter {
        if LOGICAL_OPERATORS.contains(&key.as_str()) {
            let clauses = value.as_array().ok_or_else(|| {
                DbError::invalid_query(format!("{key} expects an array of filters"))
            })?;
            let mut translated = Vec::with_capacity(clauses.len());
            for clause in clauses {
                let clause = clause.as_map().ok_or_else(|| {
                    DbError::invalid_query(format!("{key} expects an array of filters"))
                })?;
                translated.push(dialect.nest(translate_filter(dialect, clause, root)?));
            }
            entries.push((key.clone(), dialect.array(translated)));
        } else if key.starts_with('$') {
            return Err(DbError::invalid_query(format!(
                "unsupported top-level operator {key}"
            )));
        } else if key == ID_FIELD {
            entries.push((
                dialect.id_field().to_string(),
                translate_id_condition(dialect, value, root)?,
            ));
        } else {
            entries.push((key.clone(), dialect.encode_value(value)));
        }
    }

    Ok(dialect.document(entries))
}

fn translate_id_condition<D: Dialect>(
    dialect: &D,
    condition: &Value,
    root: &Document,
) -> DbResult<D::Value> {
    let Value::Map(operators) = condition else {
        return Ok(encode_id_tolerant(dialect, condition));
    };
    if !condition.is_operator_map() {
        return Ok(encode_id_tolerant(dialect, condition));
    }

    let mut entries = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let translated = if LIST_OPERATORS.contains(&op.as_str()) {
            let items = operand.as_array().ok_or_else(|| {
                DbError::id_mapping(root, format!("{op} on {ID_FIELD} expects an array"))
            })?;
            let mut ids = Vec::with_capacity(items.len());
            for item in items {
                ids.push(encode_id_strict(dialect, item, op, root)?);
            }
            dialect.array(ids)
        } else if STRICT_ID_OPERATORS.contains(&op.as_str()) {
            encode_id_strict(dialect, operand, op, root)?
        } else if op == "$eq" {
            encode_id_tolerant(dialect, operand)
        } else {
            dialect.encode_value(operand)
        };
        entries.push((op.clone(), translated));
    }

    Ok(dialect.nest(dialect.document(entries)))
}

fn encode_id_tolerant<D: Dialect>(dialect: &D, id: &Value) -> D::Value {
    dialect
        .encode_id(id)
        .unwrap_or_else(|| dialect.encode_value(id))
}

fn encode_id_strict<D: Dialect>(
    dialect: &D,
    id: &Value,
    op: &str,
    root: &Document,
) -> DbResult<D::Value> {
    if id.is_null() {
        return Err(DbError::id_mapping(
            root,
            format!("missing identifier under {op}"),
        ));
    }
    dialect
        .encode_id(id)
        .ok_or_else(|| DbError::id_mapping(root, format!("cannot map identifier {id} under {op}")))
}

/// Translates a record for writing.
///
/// `id` moves to the native identifier field; an identifier the dialect
/// cannot parse is stored verbatim.
pub fn translate_record<D: Dialect>(dialect: &D, record: &Document) -> D::Document {
    let entries = record
        .iter()
        .map(|(key, value)| {
            if key == ID_FIELD {
                (dialect.id_field().to_string(), encode_id_tolerant(dialect, value))
            } else {
                (key.clone(), dialect.encode_value(value))
            }
        })
        .collect();
    dialect.document(entries)
}

/// Restores a native document into a contract record.
///
/// The native identifier field is renamed to `id` and never surfaces
/// under its native name.
pub fn restore_record<D: Dialect>(dialect: &D, native: D::Document) -> Document {
    let id_field = dialect.id_field().to_string();
    dialect
        .entries(native)
        .into_iter()
        .map(|(key, value)| {
            if key == id_field {
                (ID_FIELD.to_string(), dialect.decode_id(value))
            } else {
                (key, dialect.decode_value(value))
            }
        })
        .collect()
}

/// Normalises an update into operator form.
///
/// A plain document becomes `$set` of each field (full-value replace per
/// field); `id` is dropped from it since identifiers are immutable. An
/// operator document passes through, but may not target `id`.
///
/// # Errors
///
/// Returns [`DbError::InvalidUpdate`] for empty updates, mixed operator and
/// plain keys, non-document operator operands and operators touching `id`.
pub fn normalize_update(update: &Document) -> DbResult<Document> {
    if update.is_empty() {
        return Err(DbError::invalid_update("update document is empty"));
    }

    let operator_keys = update.keys().filter(|k| k.starts_with('$')).count();
    if operator_keys == 0 {
        let fields: Document = update
            .iter()
            .filter(|(key, _)| key.as_str() != ID_FIELD)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let mut normalized = Document::new();
        if !fields.is_empty() {
            normalized.insert("$set".to_string(), Value::Map(fields));
        }
        if normalized.is_empty() {
            return Err(DbError::invalid_update("update only names the identifier"));
        }
        return Ok(normalized);
    }

    if operator_keys != update.len() {
        return Err(DbError::invalid_update(
            "cannot mix update operators with plain fields",
        ));
    }

    for (op, operand) in update {
        let fields = operand
            .as_map()
            .ok_or_else(|| DbError::invalid_update(format!("{op} expects a document")))?;
        if fields.contains_key(ID_FIELD) {
            return Err(DbError::invalid_update(format!(
                "{op} cannot modify the immutable {ID_FIELD} field"
            )));
        }
    }

    Ok(update.clone())
}

/// Translates a normalised update into the dialect's native form.
///
/// # Errors
///
/// See [`normalize_update`].
pub fn translate_update<D: Dialect>(dialect: &D, update: &Document) -> DbResult<D::Document> {
    let normalized = normalize_update(update)?;
    let entries = normalized
        .iter()
        .map(|(op, operand)| (op.clone(), dialect.encode_value(operand)))
        .collect();
    Ok(dialect.document(entries))
}

/// Equality fields of a query, used to seed a record created by upsert.
///
/// Operator conditions and logical operators contribute nothing.
pub fn equality_fields(query: &Document) -> Document {
    query
        .iter()
        .filter(|(key, value)| !key.starts_with('$') && !value.is_operator_map())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    /// Only 24-char lowercase hex strings are identifiers.
    struct HexDialect;

    impl Dialect for HexDialect {
        type Value = Value;
        type Document = Document;

        fn id_field(&self) -> &str {
            "_id"
        }

        fn encode_id(&self, id: &Value) -> Option<Value> {
            let s = id.as_str()?;
            (s.len() == 24 && s.chars().all(|c| c.is_ascii_hexdigit()))
                .then(|| Value::from(format!("oid:{s}")))
        }

        fn decode_id(&self, id: Value) -> Value {
            match id {
                Value::Text(s) => Value::from(s.trim_start_matches("oid:").to_string()),
                other => other,
            }
        }

        fn encode_value(&self, value: &Value) -> Value {
            value.clone()
        }

        fn decode_value(&self, value: Value) -> Value {
            value
        }

        fn nest(&self, document: Document) -> Value {
            Value::Map(document)
        }

        fn array(&self, items: Vec<Value>) -> Value {
            Value::Array(items)
        }

        fn document(&self, entries: Vec<(String, Value)>) -> Document {
            entries.into_iter().collect()
        }

        fn entries(&self, document: Document) -> Vec<(String, Value)> {
            document.into_iter().collect()
        }
    }

    const HEX: &str = "64b7f0c2a1b2c3d4e5f60718";

    #[test]
    fn scalar_id_maps_to_native_field_and_type() {
        let native = translate_query(&HexDialect, &record! { "id" => HEX }).unwrap();
        assert_eq!(native, record! { "_id" => format!("oid:{HEX}") });
    }

    #[test]
    fn unparseable_scalar_id_falls_back_to_raw() {
        let native = translate_query(&HexDialect, &record! { "id" => "legacy-key" }).unwrap();
        assert_eq!(native, record! { "_id" => "legacy-key" });
    }

    #[test]
    fn logical_operators_rewrite_recursively() {
        let query = record! {
            "$or" => vec![
                Value::from(record! { "id" => HEX }),
                Value::from(record! { "$and" => vec![record! { "id" => HEX, "n" => 1 }] }),
            ],
        };
        let native = translate_query(&HexDialect, &query).unwrap();
        let expected = record! {
            "$or" => vec![
                Value::from(record! { "_id" => format!("oid:{HEX}") }),
                Value::from(record! {
                    "$and" => vec![record! { "_id" => format!("oid:{HEX}"), "n" => 1 }]
                }),
            ],
        };
        assert_eq!(native, expected);
    }

    #[test]
    fn unparseable_id_inside_in_is_hard_failure() {
        let query = record! { "id" => record! { "$in" => vec![HEX, "nope"] } };
        let err = translate_query(&HexDialect, &query).unwrap_err();
        assert_eq!(err.code(), "MONGO_ID_MAPPING_ERROR");
    }

    #[test]
    fn null_id_under_comparison_is_hard_failure() {
        for op in ["$gt", "$gte", "$lt", "$lte", "$ne"] {
            let query = record! { "id" => record! { op => Value::Null } };
            let err = translate_query(&HexDialect, &query).unwrap_err();
            assert_eq!(err.code(), "MONGO_ID_MAPPING_ERROR", "operator {op}");
        }
    }

    #[test]
    fn valid_ids_inside_in_are_translated() {
        let query = record! { "id" => record! { "$in" => vec![HEX] } };
        let native = translate_query(&HexDialect, &query).unwrap();
        assert_eq!(
            native,
            record! { "_id" => record! { "$in" => vec![format!("oid:{HEX}")] } }
        );
    }

    #[test]
    fn regex_passes_through_unchanged() {
        let query = record! { "name" => Value::regex("^wid.*t$", "i") };
        let native = translate_query(&HexDialect, &query).unwrap();
        assert_eq!(native, query);
    }

    #[test]
    fn unknown_top_level_operator_is_rejected() {
        let err = translate_query(&HexDialect, &record! { "$where" => "1" }).unwrap_err();
        assert_eq!(err.code(), "INVALID_QUERY");

        let err = translate_query(&HexDialect, &record! { "$or" => 1 }).unwrap_err();
        assert_eq!(err.code(), "INVALID_QUERY");
    }

    #[test]
    fn restore_renames_native_id() {
        let native = record! { "_id" => format!("oid:{HEX}"), "sku" => "A" };
        let restored = restore_record(&HexDialect, native);
        assert_eq!(restored, record! { "id" => HEX, "sku" => "A" });
    }

    #[test]
    fn record_translation_moves_id() {
        let native = translate_record(&HexDialect, &record! { "id" => HEX, "sku" => "A" });
        assert_eq!(native, record! { "_id" => format!("oid:{HEX}"), "sku" => "A" });
    }

    #[test]
    fn plain_update_is_normalized_to_set() {
        let normalized = normalize_update(&record! { "id" => "x", "name" => "y" }).unwrap();
        assert_eq!(normalized, record! { "$set" => record! { "name" => "y" } });
    }

    #[test]
    fn operator_update_passes_through() {
        let update = record! { "$inc" => record! { "n" => 1 } };
        assert_eq!(normalize_update(&update).unwrap(), update);
    }

    #[test]
    fn invalid_updates_are_rejected() {
        let cases = vec![
            record! {},
            record! { "id" => "x" },
            record! { "$set" => record! { "a" => 1 }, "b" => 2 },
            record! { "$set" => 1 },
            record! { "$set" => record! { "id" => "other" } },
        ];
        for update in cases {
            let err = normalize_update(&update).unwrap_err();
            assert_eq!(err.code(), "INVALID_UPDATE", "update {update:?}");
        }
    }

    #[test]
    fn equality_fields_skip_operators() {
        let query = record! {
            "sku" => "A",
            "n" => record! { "$gt" => 1 },
            "$or" => vec![record! { "x" => 1 }],
        };
        assert_eq!(equality_fields(&query), record! { "sku" => "A" });
    }
}

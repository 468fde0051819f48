//! Native representation for the embedded store.
//!
//! The store cannot tell a null apart from a missing value, so every
//! `Null` is stored as [`NULL_PLACEHOLDER`] and restored on read. The
//! substitution is a depth-first walk over arrays and maps.

use docbridge_core::translate::Dialect;
use docbridge_core::{Document, Value};

/// Reserved string standing in for `Null` inside stored documents.
pub const NULL_PLACEHOLDER: &str = "__docbridge_null__";

/// Field the embedded store keeps identifiers under.
pub const NATIVE_ID_FIELD: &str = "_id";

/// Dialect of the embedded store: plain string identifiers, placeholder
/// nulls.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryDialect;

impl MemoryDialect {
    /// Returns true if `value` is the stored form of `Null`.
    pub fn is_placeholder(value: &Value) -> bool {
        matches!(value, Value::Text(s) if s == NULL_PLACEHOLDER)
    }
}

/// Replaces every `Null` with the placeholder.
pub fn substitute_nulls(value: &Value) -> Value {
    match value {
        Value::Null => Value::Text(NULL_PLACEHOLDER.to_string()),
        Value::Array(items) => Value::Array(items.iter().map(substitute_nulls).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_nulls(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Replaces every placeholder with `Null`.
pub fn restore_nulls(value: Value) -> Value {
    match value {
        v if MemoryDialect::is_placeholder(&v) => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(restore_nulls).collect()),
        Value::Map(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| (k, restore_nulls(v)))
                .collect(),
        ),
        other => other,
    }
}

impl Dialect for MemoryDialect {
    type Value = Value;
    type Document = Document;

    fn id_field(&self) -> &str {
        NATIVE_ID_FIELD
    }

    fn encode_id(&self, id: &Value) -> Option<Value> {
        match id {
            Value::Text(s) if s != NULL_PLACEHOLDER => Some(id.clone()),
            Value::Int(_) => Some(id.clone()),
            _ => None,
        }
    }

    fn encode_value(&self, value: &Value) -> Value {
        substitute_nulls(value)
    }

    fn decode_value(&self, value: Value) -> Value {
        restore_nulls(value)
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

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::record;
    use docbridge_core::translate::{restore_record, translate_query, translate_record};
    use proptest::prelude::*;

    #[test]
    fn nested_nulls_are_substituted() {
        let record = record! {
            "a" => Value::Null,
            "b" => vec![Value::Null, Value::from(1)],
            "c" => record! { "d" => Value::Null },
        };
        let stored = translate_record(&MemoryDialect, &record);
        assert!(MemoryDialect::is_placeholder(&stored["a"]));
        assert!(MemoryDialect::is_placeholder(&stored["b"].as_array().unwrap()[0]));
        assert!(MemoryDialect::is_placeholder(
            &stored["c"].as_map().unwrap()["d"]
        ));
        assert_eq!(restore_record(&MemoryDialect, stored), record);
    }

    #[test]
    fn null_query_operand_uses_placeholder() {
        let native = translate_query(&MemoryDialect, &record! { "f" => Value::Null }).unwrap();
        assert!(MemoryDialect::is_placeholder(&native["f"]));
    }

    #[test]
    fn absent_value_reads_back_as_null() {
        let record = record! { "f" => Option::<i64>::None };
        let stored = translate_record(&MemoryDialect, &record);
        assert_eq!(restore_record(&MemoryDialect, stored)["f"], Value::Null);
    }

    #[test]
    fn id_moves_to_native_field() {
        let stored = translate_record(&MemoryDialect, &record! { "id" => "abc", "n" => 1 });
        assert_eq!(stored, record! { "_id" => "abc", "n" => 1 });
    }

    fn tree() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<i64>().prop_map(Value::Int),
            "[a-z]{0,4}".prop_map(Value::Text),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,3}", inner, 0..4).prop_map(Value::Map),
            ]
        })
    }

    proptest! {
        #[test]
        fn placeholder_round_trip(value in tree()) {
            prop_assert_eq!(restore_nulls(substitute_nulls(&value)), value);
        }
    }
}

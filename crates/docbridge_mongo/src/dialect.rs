//! BSON representation for the networked store.

use bson::oid::ObjectId;
use bson::{Bson, Document as BsonDocument};
use docbridge_core::translate::Dialect;
use docbridge_core::{Document, Value};

/// Field the document store keeps identifiers under.
pub const NATIVE_ID_FIELD: &str = "_id";

/// Dialect of the networked store: 24-char hex identifiers become
/// `ObjectId`s, everything else maps onto the nearest BSON type.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoDialect;

impl MongoDialect {
    /// Converts a contract record into a BSON document without any
    /// identifier handling.
    pub fn to_bson(&self, document: &Document) -> BsonDocument {
        document
            .iter()
            .map(|(k, v)| (k.clone(), self.encode_value(v)))
            .collect()
    }
}

/// Sorts regex flags; the server rejects unsorted option strings.
fn sorted_options(options: &str) -> String {
    let mut flags: Vec<char> = options.chars().collect();
    flags.sort_unstable();
    flags.dedup();
    flags.into_iter().collect()
}

impl Dialect for MongoDialect {
    type Value = Bson;
    type Document = BsonDocument;

    fn id_field(&self) -> &str {
        NATIVE_ID_FIELD
    }

    fn encode_id(&self, id: &Value) -> Option<Bson> {
        let hex = id.as_str()?;
        ObjectId::parse_str(hex).ok().map(Bson::ObjectId)
    }

    fn decode_id(&self, id: Bson) -> Value {
        match id {
            Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
            other => self.decode_value(other),
        }
    }

    fn encode_value(&self, value: &Value) -> Bson {
        match value {
            Value::Null => Bson::Null,
            Value::Bool(b) => Bson::Boolean(*b),
            Value::Int(n) => match i32::try_from(*n) {
                Ok(small) => Bson::Int32(small),
                Err(_) => Bson::Int64(*n),
            },
            Value::Float(x) => Bson::Double(*x),
            Value::Text(s) => Bson::String(s.clone()),
            Value::Regex { pattern, options } => Bson::RegularExpression(bson::Regex {
                pattern: pattern.clone(),
                options: sorted_options(options),
            }),
            Value::Array(items) => Bson::Array(items.iter().map(|v| self.encode_value(v)).collect()),
            Value::Map(map) => Bson::Document(self.to_bson(map)),
        }
    }

    fn decode_value(&self, value: Bson) -> Value {
        match value {
            Bson::Null | Bson::Undefined => Value::Null,
            Bson::Boolean(b) => Value::Bool(b),
            Bson::Int32(n) => Value::Int(i64::from(n)),
            Bson::Int64(n) => Value::Int(n),
            Bson::Double(x) => Value::Float(x),
            Bson::String(s) => Value::Text(s),
            Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
            Bson::RegularExpression(re) => Value::Regex {
                pattern: re.pattern,
                options: re.options,
            },
            Bson::Array(items) => {
                Value::Array(items.into_iter().map(|v| self.decode_value(v)).collect())
            }
            Bson::Document(doc) => Value::Map(
                doc.into_iter()
                    .map(|(k, v)| (k, self.decode_value(v)))
                    .collect(),
            ),
            Bson::DateTime(dt) => Value::Text(
                dt.try_to_rfc3339_string()
                    .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
            ),
            other => Value::Text(other.to_string()),
        }
    }

    fn nest(&self, document: BsonDocument) -> Bson {
        Bson::Document(document)
    }

    fn array(&self, items: Vec<Bson>) -> Bson {
        Bson::Array(items)
    }

    fn document(&self, entries: Vec<(String, Bson)>) -> BsonDocument {
        entries.into_iter().collect()
    }

    fn entries(&self, document: BsonDocument) -> Vec<(String, Bson)> {
        document.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docbridge_core::record;
    use docbridge_core::translate::{restore_record, translate_query, translate_record};

    const HEX: &str = "64b7f0c2a1b2c3d4e5f60718";

    #[test]
    fn hex_id_becomes_object_id() {
        let native = translate_query(&MongoDialect, &record! { "id" => HEX }).unwrap();
        let oid = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(native, doc! { "_id": oid });
    }

    #[test]
    fn non_hex_scalar_id_is_kept_verbatim() {
        let native = translate_query(&MongoDialect, &record! { "id" => "sku-1" }).unwrap();
        assert_eq!(native, doc! { "_id": "sku-1" });
    }

    #[test]
    fn non_hex_id_inside_in_fails() {
        let query = record! { "id" => record! { "$in" => vec![HEX, "nope"] } };
        let err = translate_query(&MongoDialect, &query).unwrap_err();
        assert_eq!(err.code(), "MONGO_ID_MAPPING_ERROR");
    }

    #[test]
    fn nested_logical_ids_are_rewritten() {
        let query = record! {
            "$or" => vec![record! { "id" => HEX }, record! { "sku" => "A" }],
        };
        let native = translate_query(&MongoDialect, &query).unwrap();
        let oid = ObjectId::parse_str(HEX).unwrap();
        assert_eq!(native, doc! { "$or": [ { "_id": oid }, { "sku": "A" } ] });
    }

    #[test]
    fn round_trip_restores_hex_and_scalars() {
        let record = record! {
            "id" => HEX,
            "n" => 1,
            "big" => i64::MAX,
            "x" => 1.5,
            "tags" => vec!["a"],
            "meta" => record! { "ok" => true, "none" => Value::Null },
        };
        let native = translate_record(&MongoDialect, &record);
        assert!(matches!(native.get("_id"), Some(Bson::ObjectId(_))));
        assert_eq!(restore_record(&MongoDialect, native), record);
    }

    #[test]
    fn regex_options_are_sorted() {
        let native = MongoDialect.encode_value(&Value::regex("^a", "mi"));
        match native {
            Bson::RegularExpression(re) => assert_eq!(re.options, "im"),
            other => panic!("unexpected bson: {other}"),
        }
    }
}

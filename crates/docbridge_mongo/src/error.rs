//! Driver error translation.
//!
//! No driver error type escapes this crate: everything is re-wrapped into
//! [`DbError`] here.

use docbridge_core::{DbError, Value, WriteAction, ID_FIELD};
use mongodb::error::{Error as DriverError, ErrorKind, WriteFailure};

/// Server codes for a duplicate key.
const DUPLICATE_KEY_CODES: &[i32] = &[11000, 11001];

/// Server code for a missing namespace.
pub(crate) const NAMESPACE_NOT_FOUND: i32 = 26;

/// Server codes for an index that already exists under other options.
const INDEX_CONFLICT_CODES: &[i32] = &[85, 86];

/// Server code and message, when the error came from the server.
pub(crate) fn server_error(err: &DriverError) -> Option<(i32, &str)> {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => Some((e.code, e.message.as_str())),
        ErrorKind::Command(e) => Some((e.code, e.message.as_str())),
        _ => None,
    }
}

/// Returns true if the server reported code `code`.
pub(crate) fn has_code(err: &DriverError, code: i32) -> bool {
    server_error(err).is_some_and(|(c, _)| c == code)
}

/// Re-wraps a failed write, turning duplicate keys into
/// [`DbError::DuplicateRecord`].
pub(crate) fn map_write_error(err: DriverError, collection: &str, action: WriteAction) -> DbError {
    if let Some((code, message)) = server_error(&err) {
        if DUPLICATE_KEY_CODES.contains(&code) {
            let (fields, values) = parse_duplicate_key(message);
            return DbError::duplicate_record(collection, fields, values, action);
        }
    }
    map_error(err)
}

/// Re-wraps a failed index creation.
pub(crate) fn map_index_error(err: DriverError, collection: &str, fields: &[String]) -> DbError {
    match server_error(&err) {
        Some((code, _)) if DUPLICATE_KEY_CODES.contains(&code) => DbError::DuplicateKey {
            collection: collection.to_string(),
            fields: fields.to_vec(),
        },
        Some((code, _)) if INDEX_CONFLICT_CODES.contains(&code) => DbError::IndexExists {
            collection: collection.to_string(),
            fields: fields.to_vec(),
        },
        _ => map_error(err),
    }
}

/// Re-wraps any other driver failure.
pub(crate) fn map_error(err: DriverError) -> DbError {
    DbError::backend(err.to_string())
}

/// Extracts field names and values from a duplicate-key message.
///
/// Handles `... index: sku_1_region_1 dup key: { sku: "A", region: 1 }`
/// and the older form with blank field names, where the names are taken
/// from the index name instead.
pub fn parse_duplicate_key(message: &str) -> (Vec<String>, Vec<Value>) {
    let Some(start) = message.find("dup key:") else {
        return (Vec::new(), Vec::new());
    };
    let body = message[start + "dup key:".len()..].trim();
    let body = body
        .strip_prefix('{')
        .and_then(|b| b.rfind('}').map(|end| &b[..end]))
        .unwrap_or(body);

    let mut fields = Vec::new();
    let mut values = Vec::new();
    for pair in split_top_level(body) {
        let (key, raw) = match pair.split_once(':') {
            Some((k, v)) => (k.trim().trim_matches('"'), v.trim()),
            None => continue,
        };
        let field = if key == "_id" { ID_FIELD } else { key };
        fields.push(field.to_string());
        values.push(parse_scalar(raw));
    }

    if fields.iter().any(String::is_empty) {
        if let Some(names) = index_fields(message) {
            if names.len() == values.len() {
                fields = names;
            }
        }
    }
    (fields, values)
}

/// Field names encoded in `index: a_1_b_-1`.
fn index_fields(message: &str) -> Option<Vec<String>> {
    let rest = &message[message.find("index: ")? + "index: ".len()..];
    let qualified = rest.split_whitespace().next()?;
    let name = qualified.rsplit('$').next()?;
    let parts: Vec<&str> = name.split('_').collect();
    let mut fields = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for part in parts {
        if part == "1" || part == "-1" {
            fields.push(current.join("_"));
            current.clear();
        } else {
            current.push(part);
        }
    }
    (!fields.is_empty() && current.is_empty()).then_some(fields)
}

/// Splits on commas outside quotes, braces and brackets.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' | '(' => depth += 1,
            '}' | ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(body[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = body[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    }
    parts
}

fn parse_scalar(raw: &str) -> Value {
    if let Some(inner) = raw.strip_prefix('"').and_then(|r| r.strip_suffix('"')) {
        return Value::Text(inner.replace("\\\"", "\""));
    }
    if let Some(hex) = raw
        .strip_prefix("ObjectId('")
        .and_then(|r| r.strip_suffix("')"))
    {
        return Value::Text(hex.to_string());
    }
    match raw {
        "null" | "undefined" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    if let Ok(x) = raw.parse::<f64>() {
        return Value::Float(x);
    }
    Value::Text(raw.to_string())
}

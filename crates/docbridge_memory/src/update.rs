//! Update operators over stored documents.

use crate::dialect::{MemoryDialect, NATIVE_ID_FIELD};
use docbridge_core::{DbError, DbResult, Document, Value};

/// Applies a normalised native update to `document` in place.
///
/// # Errors
///
/// [`DbError::InvalidUpdate`] for unknown operators, operands of the
/// wrong type, or paths that run through a scalar.
pub fn apply_update(document: &mut Document, update: &Document) -> DbResult<()> {
    for (op, operand) in update {
        let fields = operand
            .as_map()
            .ok_or_else(|| DbError::invalid_update(format!("{op} expects a document")))?;
        for (path, value) in fields {
            if path == NATIVE_ID_FIELD || path.starts_with("_id.") {
                return Err(DbError::invalid_update(format!(
                    "{op} cannot modify the identifier"
                )));
            }
            match op.as_str() {
                "$set" => set_path(document, path, value.clone())?,
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value, false)?,
                "$addToSet" => push(document, path, value, true)?,
                "$pull" => pull(document, path, value)?,
                other => {
                    return Err(DbError::invalid_update(format!(
                        "unsupported update operator {other}"
                    )))
                }
            }
        }
    }
    Ok(())
}

/// Sets `path`, creating intermediate documents as needed.
///
/// # Errors
///
/// [`DbError::InvalidUpdate`] if a segment runs through a non-document.
pub fn set_path(document: &mut Document, path: &str, value: Value) -> DbResult<()> {
    let (parent, leaf) = parent_mut(document, path, true)?;
    match parent {
        Some(map) => {
            map.insert(leaf.to_string(), value);
            Ok(())
        }
        None => Err(DbError::invalid_update(format!("cannot create field {path}"))),
    }
}

fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    match parent_mut(document, path, false) {
        Ok((Some(map), leaf)) => map.remove(leaf),
        _ => None,
    }
}

fn get_path_mut<'a>(document: &'a mut Document, path: &str) -> DbResult<Option<&'a mut Value>> {
    let (parent, leaf) = parent_mut(document, path, false)?;
    Ok(parent.and_then(|map| map.get_mut(leaf)))
}

/// Walks to the document holding the last segment of `path`.
fn parent_mut<'a, 'p>(
    document: &'a mut Document,
    path: &'p str,
    create: bool,
) -> DbResult<(Option<&'a mut Document>, &'p str)> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().unwrap_or(path);
    let mut current = document;
    for segment in segments {
        if create {
            let vacant = current
                .get(segment)
                .map_or(true, MemoryDialect::is_placeholder);
            if vacant {
                current.insert(segment.to_string(), Value::Map(Document::new()));
            }
        }
        current = match current.get_mut(segment) {
            Some(Value::Map(next)) => next,
            Some(_) if create => {
                return Err(DbError::invalid_update(format!(
                    "cannot traverse non-document at {segment} in {path}"
                )))
            }
            _ => return Ok((None, leaf)),
        };
    }
    Ok((Some(current), leaf))
}

fn increment(document: &mut Document, path: &str, by: &Value) -> DbResult<()> {
    if !by.is_number() {
        return Err(DbError::invalid_update(format!(
            "$inc on {path} expects a number"
        )));
    }
    let next = match get_path_mut(document, path)? {
        None => by.clone(),
        Some(Value::Int(current)) => match by {
            Value::Int(n) => Value::Int(current.checked_add(*n).ok_or_else(|| {
                DbError::invalid_update(format!("$inc on {path} overflows"))
            })?),
            _ => Value::Float(*current as f64 + by.as_f64().unwrap_or_default()),
        },
        Some(Value::Float(current)) => Value::Float(*current + by.as_f64().unwrap_or_default()),
        Some(_) => {
            return Err(DbError::invalid_update(format!(
                "$inc on non-numeric field {path}"
            )))
        }
    };
    set_path(document, path, next)
}

/// Items of a `$push` / `$addToSet` operand, honoring `$each`.
fn each_items(value: &Value) -> Vec<Value> {
    match value.as_map().and_then(|m| m.get("$each")) {
        Some(Value::Array(items)) => items.clone(),
        _ => vec![value.clone()],
    }
}

fn push(document: &mut Document, path: &str, value: &Value, unique: bool) -> DbResult<()> {
    let items = each_items(value);
    match get_path_mut(document, path)? {
        Some(Value::Array(existing)) => {
            for item in items {
                if !unique || !existing.iter().any(|e| e.loosely_equals(&item)) {
                    existing.push(item);
                }
            }
            Ok(())
        }
        Some(_) => Err(DbError::invalid_update(format!(
            "cannot append to non-array field {path}"
        ))),
        None => {
            let mut fresh: Vec<Value> = Vec::with_capacity(items.len());
            for item in items {
                if !unique || !fresh.iter().any(|e| e.loosely_equals(&item)) {
                    fresh.push(item);
                }
            }
            set_path(document, path, Value::Array(fresh))
        }
    }
}

fn pull(document: &mut Document, path: &str, value: &Value) -> DbResult<()> {
    match get_path_mut(document, path)? {
        Some(Value::Array(existing)) => {
            existing.retain(|e| !e.loosely_equals(value));
            Ok(())
        }
        Some(_) => Err(DbError::invalid_update(format!(
            "cannot pull from non-array field {path}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::record;

    fn applied(mut document: Document, update: Document) -> Document {
        apply_update(&mut document, &update).unwrap();
        document
    }

    #[test]
    fn set_creates_nested_paths() {
        let doc = applied(
            record! { "a" => 1 },
            record! { "$set" => record! { "b.c" => 2, "a" => 3 } },
        );
        assert_eq!(doc, record! { "a" => 3, "b" => record! { "c" => 2 } });
    }

    #[test]
    fn unset_removes_fields() {
        let doc = applied(
            record! { "a" => 1, "b" => record! { "c" => 2 } },
            record! { "$unset" => record! { "b.c" => "", "missing" => "" } },
        );
        assert_eq!(doc, record! { "a" => 1, "b" => record! {} });
    }

    #[test]
    fn inc_adds_or_initialises() {
        let doc = applied(
            record! { "n" => 1, "x" => 1.5 },
            record! { "$inc" => record! { "n" => 2, "x" => 1, "fresh" => 5 } },
        );
        assert_eq!(doc, record! { "n" => 3, "x" => 2.5, "fresh" => 5 });
    }

    #[test]
    fn inc_rejects_non_numeric() {
        let mut doc = record! { "s" => "text" };
        let err = apply_update(&mut doc, &record! { "$inc" => record! { "s" => 1 } }).unwrap_err();
        assert_eq!(err.code(), "INVALID_UPDATE");
    }

    #[test]
    fn array_operators() {
        let doc = applied(
            record! { "tags" => vec!["a"] },
            record! {
                "$push" => record! { "log" => 1 },
                "$addToSet" => record! { "tags" => record! { "$each" => vec!["a", "b"] } },
            },
        );
        assert_eq!(doc, record! { "tags" => vec!["a", "b"], "log" => vec![1] });

        let doc = applied(doc, record! { "$pull" => record! { "tags" => "a" } });
        assert_eq!(doc["tags"], Value::from(vec!["b"]));
    }

    #[test]
    fn identifier_is_immutable() {
        let mut doc = record! { "_id" => "x" };
        let err =
            apply_update(&mut doc, &record! { "$set" => record! { "_id" => "y" } }).unwrap_err();
        assert_eq!(err.code(), "INVALID_UPDATE");
    }

    #[test]
    fn unknown_operator_is_rejected() {
        let mut doc = record! {};
        let err = apply_update(&mut doc, &record! { "$rename" => record! { "a" => "b" } })
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_UPDATE");
    }
}

//! Query evaluation over stored documents.
//!
//! A native filter is compiled once into a [`Filter`] tree (regexes are
//! built at compile time, operators validated) and then evaluated per
//! document. Placeholder nulls compare as `Null`.

use crate::dialect::MemoryDialect;
use docbridge_core::{DbError, DbResult, Document, Value};
use regex::{Regex, RegexBuilder};
use std::cmp::Ordering;

static NULL: Value = Value::Null;

/// A compiled query.
#[derive(Debug)]
pub enum Filter {
    /// Every clause matches.
    And(Vec<Filter>),
    /// At least one clause matches.
    Or(Vec<Filter>),
    /// No clause matches.
    Nor(Vec<Filter>),
    /// Conditions on a single path, all of which must hold.
    Field {
        /// Dot-separated path.
        path: String,
        /// Conditions on the path.
        conditions: Vec<Condition>,
    },
}

/// One condition on a field.
#[derive(Debug)]
pub enum Condition {
    /// `$eq` or a bare value.
    Eq(Value),
    /// `$ne`.
    Ne(Value),
    /// `$gt`, `$gte`, `$lt`, `$lte`.
    Range(Ordering, bool, Value),
    /// `$in`.
    In(Vec<Value>),
    /// `$nin`.
    Nin(Vec<Value>),
    /// `$regex` (with `$options`) or a bare regex value.
    Regex(Regex),
    /// `$exists`.
    Exists(bool),
    /// `$type`.
    Type(Vec<String>),
}

impl Filter {
    /// Compiles a native filter document.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidQuery`] for unknown operators or bad operands.
    pub fn compile(filter: &Document) -> DbResult<Self> {
        let mut clauses = Vec::with_capacity(filter.len());
        for (key, value) in filter {
            match key.as_str() {
                "$and" => clauses.push(Filter::And(compile_clauses(key, value)?)),
                "$or" => clauses.push(Filter::Or(compile_clauses(key, value)?)),
                "$nor" => clauses.push(Filter::Nor(compile_clauses(key, value)?)),
                op if op.starts_with('$') => {
                    return Err(DbError::invalid_query(format!(
                        "unsupported top-level operator {op}"
                    )))
                }
                path => clauses.push(Filter::Field {
                    path: path.to_string(),
                    conditions: compile_conditions(value)?,
                }),
            }
        }
        Ok(Filter::And(clauses))
    }

    /// Returns true if `document` satisfies the filter.
    pub fn matches(&self, document: &Document) -> bool {
        match self {
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(document)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(document)),
            Filter::Nor(clauses) => !clauses.iter().any(|c| c.matches(document)),
            Filter::Field { path, conditions } => {
                let candidates = resolve(document, path);
                conditions.iter().all(|c| c.holds(&candidates))
            }
        }
    }
}

fn compile_clauses(op: &str, value: &Value) -> DbResult<Vec<Filter>> {
    let items = value
        .as_array()
        .ok_or_else(|| DbError::invalid_query(format!("{op} expects an array of filters")))?;
    items
        .iter()
        .map(|item| {
            item.as_map()
                .ok_or_else(|| DbError::invalid_query(format!("{op} expects an array of filters")))
                .and_then(Filter::compile)
        })
        .collect()
}

fn compile_conditions(value: &Value) -> DbResult<Vec<Condition>> {
    match value {
        Value::Regex { pattern, options } => Ok(vec![Condition::Regex(build_regex(pattern, options)?)]),
        Value::Map(ops) if value.is_operator_map() => {
            let mut conditions = Vec::with_capacity(ops.len());
            for (op, operand) in ops {
                let condition = match op.as_str() {
                    "$eq" => Condition::Eq(operand.clone()),
                    "$ne" => Condition::Ne(operand.clone()),
                    "$gt" => Condition::Range(Ordering::Greater, false, operand.clone()),
                    "$gte" => Condition::Range(Ordering::Greater, true, operand.clone()),
                    "$lt" => Condition::Range(Ordering::Less, false, operand.clone()),
                    "$lte" => Condition::Range(Ordering::Less, true, operand.clone()),
                    "$in" => Condition::In(list_operand(op, operand)?),
                    "$nin" => Condition::Nin(list_operand(op, operand)?),
                    "$regex" => {
                        let options = match ops.get("$options") {
                            Some(o) => o.as_str().ok_or_else(|| {
                                DbError::invalid_query("$options expects a string")
                            })?,
                            None => "",
                        };
                        match operand {
                            Value::Text(pattern) => Condition::Regex(build_regex(pattern, options)?),
                            Value::Regex {
                                pattern,
                                options: inline,
                            } => {
                                let merged = format!("{inline}{options}");
                                Condition::Regex(build_regex(pattern, &merged)?)
                            }
                            _ => return Err(DbError::invalid_query("$regex expects a pattern")),
                        }
                    }
                    "$options" => {
                        if !ops.contains_key("$regex") {
                            return Err(DbError::invalid_query("$options without $regex"));
                        }
                        continue;
                    }
                    "$exists" => Condition::Exists(truthy(operand)),
                    "$type" => Condition::Type(type_operand(operand)?),
                    other => {
                        return Err(DbError::invalid_query(format!(
                            "unsupported operator {other}"
                        )))
                    }
                };
                conditions.push(condition);
            }
            Ok(conditions)
        }
        other => Ok(vec![Condition::Eq(other.clone())]),
    }
}

fn list_operand(op: &str, operand: &Value) -> DbResult<Vec<Value>> {
    operand
        .as_array()
        .map(<[Value]>::to_vec)
        .ok_or_else(|| DbError::invalid_query(format!("{op} expects an array")))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(n) => *n != 0,
        Value::Float(x) => *x != 0.0,
        v => !v.is_null() && !MemoryDialect::is_placeholder(v),
    }
}

fn build_regex(pattern: &str, options: &str) -> DbResult<Regex> {
    let mut builder = RegexBuilder::new(pattern);
    for flag in options.chars() {
        match flag {
            'i' => builder.case_insensitive(true),
            'm' => builder.multi_line(true),
            's' => builder.dot_matches_new_line(true),
            'x' => builder.ignore_whitespace(true),
            other => {
                return Err(DbError::invalid_query(format!(
                    "unsupported regex option {other:?}"
                )))
            }
        };
    }
    builder
        .build()
        .map_err(|e| DbError::invalid_query(format!("invalid regex {pattern:?}: {e}")))
}

fn type_operand(operand: &Value) -> DbResult<Vec<String>> {
    let names = match operand {
        Value::Array(items) => items.iter().map(type_alias).collect::<DbResult<Vec<_>>>()?,
        single => vec![type_alias(single)?],
    };
    Ok(names)
}

/// Maps a `$type` operand (alias or numeric code) to a canonical name.
fn type_alias(operand: &Value) -> DbResult<String> {
    let name = match operand {
        Value::Text(alias) => match alias.as_str() {
            "double" | "int" | "long" | "decimal" | "number" => "number",
            "string" => "string",
            "object" => "object",
            "array" => "array",
            "bool" => "bool",
            "null" => "null",
            "regex" => "regex",
            other => {
                return Err(DbError::invalid_query(format!("unknown $type alias {other:?}")))
            }
        },
        Value::Int(code) => match code {
            1 | 16 | 18 | 19 => "number",
            2 => "string",
            3 => "object",
            4 => "array",
            8 => "bool",
            10 => "null",
            11 => "regex",
            other => return Err(DbError::invalid_query(format!("unknown $type code {other}"))),
        },
        _ => return Err(DbError::invalid_query("$type expects an alias or code")),
    };
    Ok(name.to_string())
}

fn type_name(value: &Value) -> &'static str {
    match normalized(value) {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) | Value::Float(_) => "number",
        Value::Text(_) => "string",
        Value::Regex { .. } => "regex",
        Value::Array(_) => "array",
        Value::Map(_) => "object",
    }
}

/// Reads placeholders as `Null`.
fn normalized(value: &Value) -> &Value {
    if MemoryDialect::is_placeholder(value) {
        &NULL
    } else {
        value
    }
}

/// Collects every value reachable by `path`.
///
/// Arrays along the way fan out over their map elements; a numeric
/// segment also indexes into the array.
fn resolve<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = document.get(segments[0]) {
        descend(first, &segments[1..], &mut out);
    }
    out
}

fn descend<'a>(value: &'a Value, rest: &[&str], out: &mut Vec<&'a Value>) {
    let Some((segment, tail)) = rest.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Value::Map(map) => {
            if let Some(next) = map.get(*segment) {
                descend(next, tail, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = segment.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    descend(next, tail, out);
                }
            }
            for item in items {
                if let Value::Map(map) = item {
                    if let Some(next) = map.get(*segment) {
                        descend(next, tail, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// A candidate together with its elements when it is an array.
fn flatten<'a>(candidates: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        out.push(*candidate);
        if let Value::Array(items) = candidate {
            out.extend(items.iter());
        }
    }
    out
}

fn values_equal(a: &Value, b: &Value) -> bool {
    let (a, b) = (normalized(a), normalized(b));
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (Value::Map(x), Value::Map(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y)
                    .all(|((lk, lv), (rk, rv))| lk == rk && values_equal(lv, rv))
        }
        _ => a.same_type_class(b) && a.loosely_equals(b),
    }
}

fn equals_any(candidates: &[&Value], target: &Value) -> bool {
    if normalized(target).is_null() && candidates.is_empty() {
        return true;
    }
    flatten(candidates)
        .into_iter()
        .any(|c| values_equal(c, target))
}

impl Condition {
    fn holds(&self, candidates: &[&Value]) -> bool {
        match self {
            Condition::Eq(target) => equals_any(candidates, target),
            Condition::Ne(target) => !equals_any(candidates, target),
            Condition::Range(direction, inclusive, bound) => {
                let bound = normalized(bound);
                if bound.is_null() && candidates.is_empty() {
                    return *inclusive;
                }
                flatten(candidates).into_iter().any(|c| {
                    let c = normalized(c);
                    if !c.same_type_class(bound) {
                        return false;
                    }
                    let ord = c.compare(bound);
                    ord == *direction || (*inclusive && ord == Ordering::Equal)
                })
            }
            Condition::In(targets) => targets.iter().any(|t| equals_any(candidates, t)),
            Condition::Nin(targets) => !targets.iter().any(|t| equals_any(candidates, t)),
            Condition::Regex(re) => flatten(candidates)
                .into_iter()
                .any(|c| match c {
                    Value::Text(s) if !MemoryDialect::is_placeholder(c) => re.is_match(s),
                    _ => false,
                }),
            Condition::Exists(expected) => !candidates.is_empty() == *expected,
            Condition::Type(names) => flatten(candidates)
                .into_iter()
                .any(|c| names.iter().any(|n| n == type_name(c))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::record;
    use docbridge_core::translate::{translate_query, translate_record};

    fn matches(query: Document, record: Document) -> bool {
        let filter = Filter::compile(&translate_query(&MemoryDialect, &query).unwrap()).unwrap();
        filter.matches(&translate_record(&MemoryDialect, &record))
    }

    #[test]
    fn bare_value_is_equality() {
        assert!(matches(record! { "sku" => "A" }, record! { "sku" => "A" }));
        assert!(!matches(record! { "sku" => "A" }, record! { "sku" => "B" }));
        assert!(matches(record! { "n" => 1 }, record! { "n" => 1.0 }));
    }

    #[test]
    fn null_matches_null_and_missing() {
        let query = record! { "f" => Value::Null };
        assert!(matches(query.clone(), record! { "f" => Value::Null }));
        assert!(matches(query.clone(), record! {}));
        assert!(!matches(query, record! { "f" => 0 }));
    }

    #[test]
    fn ranges_stay_within_type_bracket() {
        let query = record! { "n" => record! { "$gt" => 5 } };
        assert!(matches(query.clone(), record! { "n" => 6 }));
        assert!(!matches(query.clone(), record! { "n" => 5 }));
        assert!(!matches(query, record! { "n" => "zzz" }));

        let query = record! { "n" => record! { "$gte" => 5, "$lt" => 7 } };
        assert!(matches(query.clone(), record! { "n" => 5 }));
        assert!(!matches(query, record! { "n" => 7 }));
    }

    #[test]
    fn array_field_matches_any_element() {
        let record = record! { "tags" => vec!["a", "b"] };
        assert!(matches(record! { "tags" => "b" }, record.clone()));
        assert!(matches(
            record! { "tags" => record! { "$in" => vec!["x", "a"] } },
            record.clone()
        ));
        assert!(matches(record! { "tags" => vec!["a", "b"] }, record));
    }

    #[test]
    fn dot_paths_reach_nested_fields() {
        let record = record! {
            "meta" => record! { "owner" => record! { "name" => "ada" } },
            "items" => vec![record! { "sku" => "A" }, record! { "sku" => "B" }],
        };
        assert!(matches(record! { "meta.owner.name" => "ada" }, record.clone()));
        assert!(matches(record! { "items.sku" => "B" }, record.clone()));
        assert!(matches(record! { "items.0.sku" => "A" }, record.clone()));
        assert!(!matches(record! { "items.1.sku" => "A" }, record));
    }

    #[test]
    fn logical_operators() {
        let record = record! { "a" => 1, "b" => 2 };
        assert!(matches(
            record! { "$or" => vec![record! { "a" => 9 }, record! { "b" => 2 }] },
            record.clone()
        ));
        assert!(!matches(
            record! { "$and" => vec![record! { "a" => 1 }, record! { "b" => 3 }] },
            record.clone()
        ));
        assert!(matches(
            record! { "$nor" => vec![record! { "a" => 9 }] },
            record
        ));
    }

    #[test]
    fn regex_with_options() {
        let record = record! { "name" => "Widget" };
        assert!(matches(
            record! { "name" => Value::regex("^wid.*t$", "i") },
            record.clone()
        ));
        assert!(matches(
            record! { "name" => record! { "$regex" => "^wid", "$options" => "i" } },
            record.clone()
        ));
        assert!(!matches(
            record! { "name" => record! { "$regex" => "^wid" } },
            record
        ));
    }

    #[test]
    fn exists_and_type() {
        let record = record! { "a" => Value::Null, "b" => "x" };
        assert!(matches(record! { "a" => record! { "$exists" => true } }, record.clone()));
        assert!(matches(record! { "c" => record! { "$exists" => false } }, record.clone()));
        assert!(matches(record! { "a" => record! { "$type" => "null" } }, record.clone()));
        assert!(matches(record! { "b" => record! { "$type" => 2 } }, record.clone()));
        assert!(!matches(record! { "b" => record! { "$type" => "number" } }, record));
    }

    #[test]
    fn ne_and_nin_match_missing_fields() {
        assert!(matches(record! { "a" => record! { "$ne" => 1 } }, record! {}));
        assert!(matches(
            record! { "a" => record! { "$nin" => vec![1, 2] } },
            record! { "a" => 3 }
        ));
        assert!(!matches(
            record! { "a" => record! { "$nin" => vec![1, 2] } },
            record! { "a" => 2 }
        ));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let err = Filter::compile(&record! { "a" => record! { "$near" => 1 } }).unwrap_err();
        assert_eq!(err.code(), "INVALID_QUERY");
        let err = Filter::compile(&record! { "a" => record! { "$regex" => "(" } }).unwrap_err();
        assert_eq!(err.code(), "INVALID_QUERY");
    }
}

//! Find options: sorting and paging.

use crate::value::{Document, Value};
use std::cmp::Ordering;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

impl SortDirection {
    /// Returns `1` or `-1`, the document-store sort key encoding.
    pub const fn as_i32(self) -> i32 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// Field path to sort by (`id` allowed).
    pub field: String,
    /// Direction.
    pub direction: SortDirection,
}

impl Sort {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Options for `find` and `find_one`.
///
/// `find_one` honors `sort` and `skip` and ignores `limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Sort keys, most significant first.
    pub sort: Vec<Sort>,
    /// Maximum number of records returned.
    pub limit: Option<usize>,
    /// Number of matching records skipped before returning.
    pub skip: Option<usize>,
}

impl FindOptions {
    /// Creates empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a sort key.
    #[must_use]
    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort.push(sort);
        self
    }

    /// Sets the limit.
    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the skip count.
    #[must_use]
    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Compares two records by the sort keys.
    ///
    /// Missing fields sort as null.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for key in &self.sort {
            let left = Value::lookup(a, &key.field).unwrap_or(&Value::Null);
            let right = Value::lookup(b, &key.field).unwrap_or(&Value::Null);
            let ord = match key.direction {
                SortDirection::Asc => left.compare(right),
                SortDirection::Desc => right.compare(left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    /// Sorts, skips and limits a list of records in memory.
    pub fn apply(&self, mut records: Vec<Document>) -> Vec<Document> {
        if !self.sort.is_empty() {
            records.sort_by(|a, b| self.compare(a, b));
        }
        let skip = self.skip.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);
        records.into_iter().skip(skip).take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record;

    #[test]
    fn desc_sort_orders_counts() {
        let records = vec![
            record! { "count" => 1 },
            record! { "count" => 5 },
            record! { "count" => -1 },
        ];
        let sorted = FindOptions::new().sort(Sort::desc("count")).apply(records);
        let counts: Vec<_> = sorted.iter().map(|r| r["count"].clone()).collect();
        assert_eq!(counts, vec![Value::Int(5), Value::Int(1), Value::Int(-1)]);
    }

    #[test]
    fn secondary_key_breaks_ties() {
        let records = vec![
            record! { "group" => "b", "n" => 2 },
            record! { "group" => "a", "n" => 9 },
            record! { "group" => "b", "n" => 1 },
        ];
        let sorted = FindOptions::new()
            .sort(Sort::asc("group"))
            .sort(Sort::asc("n"))
            .apply(records);
        let ns: Vec<_> = sorted.iter().map(|r| r["n"].clone()).collect();
        assert_eq!(ns, vec![Value::Int(9), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn missing_fields_sort_first_ascending() {
        let records = vec![record! { "n" => 1 }, record! {}];
        let sorted = FindOptions::new().sort(Sort::asc("n")).apply(records);
        assert!(sorted[0].is_empty());
    }

    #[test]
    fn skip_and_limit() {
        let records = (0..10).map(|n| record! { "n" => n }).collect();
        let page = FindOptions::new()
            .sort(Sort::asc("n"))
            .skip(3)
            .limit(2)
            .apply(records);
        assert_eq!(page, vec![record! { "n" => 3 }, record! { "n" => 4 }]);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn scalar() -> impl Strategy<Value = Value> {
            prop_oneof![
                Just(Value::Null),
                any::<bool>().prop_map(Value::Bool),
                any::<i64>().prop_map(Value::Int),
                (-1.0e6f64..1.0e6).prop_map(Value::Float),
                "[a-z]{0,6}".prop_map(Value::Text),
            ]
        }

        proptest! {
            #[test]
            fn compare_is_antisymmetric(a in scalar(), b in scalar()) {
                prop_assert_eq!(a.compare(&b), b.compare(&a).reverse());
            }

            #[test]
            fn sorted_output_is_ordered(values in prop::collection::vec(scalar(), 0..32)) {
                let records = values.into_iter().map(|v| record! { "v" => v }).collect();
                let sorted = FindOptions::new().sort(Sort::asc("v")).apply(records);
                for pair in sorted.windows(2) {
                    prop_assert_ne!(pair[0]["v"].compare(&pair[1]["v"]), Ordering::Greater);
                }
            }
        }
    }
}

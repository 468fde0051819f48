//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records, queries and index sets that
//! every backend must accept.

use docbridge_core::{Document, IndexDefinition, Value};
use proptest::prelude::*;

/// Field names used by generated records; a small pool keeps collisions
/// (and therefore interesting index behavior) likely.
pub const FIELD_POOL: &[&str] = &["a", "b", "c", "count", "name", "tags"];

/// Strategy for generating valid collection names.
pub fn collection_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,23}").expect("Invalid regex")
}

/// Strategy for picking a field from [`FIELD_POOL`].
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::sample::select(FIELD_POOL).prop_map(str::to_string)
}

/// Strategy for scalar values both backends store losslessly.
pub fn scalar_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        1 => Just(Value::Null),
        1 => any::<bool>().prop_map(Value::Bool),
        3 => (-1000i64..1000).prop_map(Value::Int),
        3 => "[a-zA-Z0-9 ]{0,16}".prop_map(Value::Text),
    ]
}

/// Strategy for values with at most one level of nesting.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => scalar_value_strategy(),
        1 => prop::collection::vec(scalar_value_strategy(), 0..4).prop_map(Value::Array),
        1 => prop::collection::btree_map("[a-z]{1,6}", scalar_value_strategy(), 0..3)
            .prop_map(Value::Map),
    ]
}

/// Strategy for records without an identifier.
pub fn record_strategy() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 1..5)
}

/// Strategy for a non-empty, duplicate-free field list.
pub fn index_fields_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::sample::subsequence(FIELD_POOL, 1..=3)
        .prop_shuffle()
        .prop_map(|fields| fields.into_iter().map(str::to_string).collect())
}

/// Strategy for a desired index set with distinct identities.
pub fn index_set_strategy() -> impl Strategy<Value = Vec<IndexDefinition>> {
    prop::collection::vec(index_fields_strategy(), 0..4).prop_map(|sets| {
        let mut seen = Vec::new();
        let mut indexes = Vec::new();
        for fields in sets {
            let definition = IndexDefinition::new(fields);
            let identity = definition.identity();
            if !seen.contains(&identity) {
                seen.push(identity);
                indexes.push(definition);
            }
        }
        indexes
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docbridge_core::ID_FIELD;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn records_never_carry_an_id(record in record_strategy()) {
            prop_assert!(!record.is_empty());
            prop_assert!(!record.contains_key(ID_FIELD));
        }

        #[test]
        fn index_fields_are_distinct(fields in index_fields_strategy()) {
            let mut sorted = fields.clone();
            sorted.sort();
            sorted.dedup();
            prop_assert_eq!(sorted.len(), fields.len());
        }

        #[test]
        fn index_sets_have_distinct_identities(set in index_set_strategy()) {
            for (i, a) in set.iter().enumerate() {
                for b in &set[i + 1..] {
                    prop_assert_ne!(a.identity(), b.identity());
                }
            }
        }
    }
}

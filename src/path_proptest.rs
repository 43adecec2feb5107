//! Property-based tests for path normalization and value merging.
//!
//! These tests use proptest to generate random inputs and verify that
//! invariants hold for all possible inputs.

#[cfg(test)]
mod proptest_tests {
    use crate::merge::yaml::{merge_yaml_values, sort_keys};
        use crate::path::{normalize, resolve};
    use proptest::prelude::*;
    use serde_yaml::{Mapping, Value};
    use std::path::{Component, Path};

    fn segment() -> impl Strategy<Value = String> {
        prop_oneof![
            3 => "[a-z0-9_-]{1,8}",
            1 => Just("..".to_string()),
            1 => Just(".".to_string()),
        ]
    }

    // ============================================================================
    // normalize property tests
    // ============================================================================

    proptest! {
        /// Property: normalize is idempotent
        #[test]
        fn normalize_is_idempotent(segments in prop::collection::vec(segment(), 0..8)) {
            let path = segments.join("/");
            let once = normalize(Path::new(&path));
            let twice = normalize(&once);
            prop_assert_eq!(once, twice);
        }

        /// Property: normalized paths never contain `.` and only lead with `..`
        #[test]
        fn normalize_removes_inner_dots(segments in prop::collection::vec(segment(), 1..8)) {
            let path = segments.join("/");
            let normalized = normalize(Path::new(&path));
            let components: Vec<Component<'_>> = normalized.components().collect();

            if normalized != Path::new(".") {
                prop_assert!(!components.contains(&Component::CurDir));
            }
            let first_normal = components
                .iter()
                .position(|c| matches!(c, Component::Normal(_)))
                .unwrap_or(components.len());
            prop_assert!(components[first_normal..]
                .iter()
                .all(|c| !matches!(c, Component::ParentDir)));
        }

        /// Property: a sibling reference resolves next to its base
        #[test]
        fn resolve_sibling(base in "[a-z]{1,8}", sibling in "[a-z]{1,8}") {
            let resolved = resolve(Path::new(&base), &format!("../{}", sibling));
            prop_assert_eq!(resolved, Path::new(&sibling).to_path_buf());
        }
    }

    // ============================================================================
    // merge property tests
    // ============================================================================

    fn scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
            "[a-z]{0,6}".prop_map(Value::from),
        ]
    }

    fn values() -> impl Strategy<Value = Value> {
        scalar().prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Sequence),
                prop::collection::btree_map("[a-d]", inner, 0..4).prop_map(|entries| {
                    Value::Mapping(entries.into_iter().map(|(k, v)| (Value::from(k), v)).collect())
                }),
            ]
        })
    }

    proptest! {
        /// Property: merging a value into itself changes nothing
        #[test]
        fn merge_with_self_is_identity(value in values()) {
            let mut target = value.clone();
            merge_yaml_values(&mut target, &value, "");
            prop_assert_eq!(target, value);
        }

        /// Property: every top-level key of the source ends up with the source's value
        /// when the source value is a scalar
        #[test]
        fn merge_source_scalars_win(
            target in prop::collection::btree_map("[a-d]", scalar(), 0..4),
            source in prop::collection::btree_map("[a-d]", scalar(), 0..4),
        ) {
            let to_mapping = |m: std::collections::BTreeMap<String, Value>| -> Mapping {
                m.into_iter().map(|(k, v)| (Value::from(k), v)).collect()
            };
            let source = to_mapping(source);
            let mut merged = Value::Mapping(to_mapping(target));
            merge_yaml_values(&mut merged, &Value::Mapping(source.clone()), "");

            for (key, value) in &source {
                prop_assert_eq!(merged.get(key), Some(value));
            }
        }

        /// Property: sorting keys keeps the content and is idempotent
        #[test]
        fn sort_keys_preserves_content(value in values()) {
            let sorted = sort_keys(&value);
            prop_assert_eq!(&sorted, &value);
            prop_assert_eq!(sort_keys(&sorted), sorted.clone());
        }
    }
}

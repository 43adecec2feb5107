//! YAML merge operations
//!
//! This module provides the recursive deep merge used in three places:
//!
//! - layering chart values files (later files win, sequences replaced),
//! - strategic-merge patches,
//! - folding a later same-identity resource onto an earlier one.
//!
//! ## Rules
//!
//! - Mappings: keys are merged recursively; keys only in the target survive.
//! - Sequences: the source sequence replaces the target wholesale.
//! - Scalars and type mismatches: the source value replaces the target.

use log::debug;
use serde_yaml::{Mapping, Value as YamlValue};

/// Recursively merge source YAML value into target
///
/// # Arguments
///
/// * `target` - The target value to merge into (modified in place)
/// * `source` - The source value to merge from
/// * `path` - Current path for logging purposes
pub fn merge_yaml_values(target: &mut YamlValue, source: &YamlValue, path: &str) {
    match (target, source) {
        (YamlValue::Mapping(target_map), YamlValue::Mapping(source_map)) => {
            merge_yaml_mappings(target_map, source_map, path);
        }
        (YamlValue::Sequence(target_seq), YamlValue::Sequence(source_seq)) => {
            debug!(
                "Replacing sequence at '{}' (old size: {}, new size: {})",
                display_path(path),
                target_seq.len(),
                source_seq.len()
            );
            *target_seq = source_seq.clone();
        }
        (target, source) => {
            if !target.is_null() && get_yaml_type_name(target) != get_yaml_type_name(source) {
                debug!(
                    "Type mismatch at '{}': replacing {} with {}",
                    display_path(path),
                    get_yaml_type_name(target),
                    get_yaml_type_name(source)
                );
            }
            *target = source.clone();
        }
    }
}

/// Merge every key of `source` into `target`.
pub fn merge_yaml_mappings(target: &mut Mapping, source: &Mapping, path: &str) {
    for (key, value) in source {
        let key_str = match key {
            YamlValue::String(s) => s.clone(),
            _ => format!("{:?}", key),
        };
        let new_path = if path.is_empty() {
            key_str
        } else {
            format!("{}.{}", path, key_str)
        };

        match target.get_mut(key) {
            Some(existing) => merge_yaml_values(existing, value, &new_path),
            None => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Return a copy of `value` with every mapping's keys in sorted order.
///
/// Used to produce byte-stable output regardless of the order in which a
/// renderer or a patch inserted fields.
pub fn sort_keys(value: &YamlValue) -> YamlValue {
    match value {
        YamlValue::Mapping(map) => {
            let mut entries: Vec<(&YamlValue, &YamlValue)> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| key_order(a).cmp(&key_order(b)));
            let sorted: Mapping = entries
                .into_iter()
                .map(|(k, v)| (k.clone(), sort_keys(v)))
                .collect();
            YamlValue::Mapping(sorted)
        }
        YamlValue::Sequence(seq) => YamlValue::Sequence(seq.iter().map(sort_keys).collect()),
        YamlValue::Tagged(tagged) => {
            let mut tagged = tagged.as_ref().clone();
            tagged.value = sort_keys(&tagged.value);
            YamlValue::Tagged(Box::new(tagged))
        }
        other => other.clone(),
    }
}

fn key_order(key: &YamlValue) -> String {
    match key {
        YamlValue::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}

fn display_path(path: &str) -> &str {
    if path.is_empty() {
        "<root>"
    } else {
        path
    }
}

/// Get a human-readable type name for a YAML value
///
/// Used for logging and error messages to describe the type of a value.
pub fn get_yaml_type_name(value: &YamlValue) -> &'static str {
    match value {
        YamlValue::Null => "Null",
        YamlValue::Bool(_) => "Bool",
        YamlValue::Number(_) => "Number",
        YamlValue::String(_) => "String",
        YamlValue::Sequence(_) => "Sequence",
        YamlValue::Mapping(_) => "Mapping",
        YamlValue::Tagged(_) => "Tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> YamlValue {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_merge_nested_mappings_later_wins() {
        let mut target = yaml("image:\n  repository: app\n  tag: v1\nreplicas: 1\n");
        let source = yaml("image:\n  tag: v2\nservice:\n  port: 80\n");
        merge_yaml_values(&mut target, &source, "");

        assert_eq!(
            target,
            yaml("image:\n  repository: app\n  tag: v2\nreplicas: 1\nservice:\n  port: 80\n")
        );
    }

    #[test]
    fn test_merge_sequences_replaced_wholesale() {
        let mut target = yaml("args: [a, b, c]\n");
        let source = yaml("args: [z]\n");
        merge_yaml_values(&mut target, &source, "");
        assert_eq!(target, yaml("args: [z]\n"));
    }

    #[test]
    fn test_merge_type_mismatch_replaces() {
        let mut target = yaml("ports: [80]\n");
        merge_yaml_values(&mut target, &yaml("ports: none\n"), "");
        assert_eq!(target, yaml("ports: none\n"));
    }

    #[test]
    fn test_merge_null_source_overrides() {
        let mut target = yaml("a: 1\n");
        merge_yaml_values(&mut target, &yaml("a: null\n"), "");
        assert_eq!(target, yaml("a: null\n"));
    }

    #[test]
    fn test_merge_keeps_target_key_order() {
        let mut target = yaml("b: 1\na: 1\n");
        merge_yaml_values(&mut target, &yaml("c: 1\na: 2\n"), "");
        let keys: Vec<&str> = target
            .as_mapping()
            .unwrap()
            .keys()
            .filter_map(YamlValue::as_str)
            .collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_sort_keys_recursive() {
        let sorted = sort_keys(&yaml("kind: Service\napiVersion: v1\nmetadata:\n  name: x\n  labels: {b: 1, a: 2}\n"));
        let text = serde_yaml::to_string(&sorted).unwrap();
        assert_eq!(
            text,
            "apiVersion: v1\nkind: Service\nmetadata:\n  labels:\n    a: 2\n    b: 1\n  name: x\n"
        );
    }

    #[test]
    fn test_get_yaml_type_name_all_types() {
        assert_eq!(get_yaml_type_name(&YamlValue::Null), "Null");
        assert_eq!(get_yaml_type_name(&YamlValue::Bool(true)), "Bool");
        assert_eq!(get_yaml_type_name(&yaml("1")), "Number");
        assert_eq!(get_yaml_type_name(&yaml("x")), "String");
        assert_eq!(get_yaml_type_name(&yaml("[1]")), "Sequence");
        assert_eq!(get_yaml_type_name(&yaml("a: 1")), "Mapping");
    }
}

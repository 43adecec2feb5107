//! Patch algorithms invoked by the transformer stack.
//!
//! Two patch flavours are supported, chosen by the shape of the patch
//! document:
//!
//! - a **mapping** is a strategic merge patch: it is deep-merged into the
//!   target, with lists of named items (`containers`, `ports`, ...) merged by
//!   `name` and `$patch: replace` / `$patch: delete` directives honoured;
//! - a **sequence** is a path-addressed patch (RFC 6902 operations `add`,
//!   `remove`, `replace`, `move`, `copy`, `test` with JSON pointer paths).
//!
//! `$patch: delete` at the top of a strategic merge patch is the only way a
//! patch removes a whole resource.

use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::merge::parse_pointer;
use crate::resource::DocumentError;

const DIRECTIVE: &str = "$patch";

/// A parsed patch document.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchDocument {
    StrategicMerge(Mapping),
    Json6902(Vec<JsonPatchOp>),
}

/// One RFC 6902 operation.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JsonPatchOp {
    pub op: String,
    pub path: String,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub from: Option<String>,
}

/// What should happen to a resource after a patch was applied to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchOutcome {
    Keep,
    Delete,
}

impl PatchDocument {
    /// Parse a patch document, detecting its flavour from its shape.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let value: Value =
            serde_yaml::from_str(text).map_err(|e| DocumentError(format!("invalid patch: {}", e)))?;
        match value {
            Value::Mapping(map) => Ok(PatchDocument::StrategicMerge(map)),
            Value::Sequence(_) => {
                let ops: Vec<JsonPatchOp> = serde_yaml::from_value(value)
                    .map_err(|e| DocumentError(format!("invalid patch operation: {}", e)))?;
                Ok(PatchDocument::Json6902(ops))
            }
            _ => Err(DocumentError(
                "patch must be a mapping or a list of operations".to_string(),
            )),
        }
    }

    /// Kind and name the patch itself declares, used to locate its target
    /// when no explicit selector is given.
    pub fn self_target(&self) -> Option<(String, String)> {
        match self {
            PatchDocument::StrategicMerge(map) => {
                let kind = map.get("kind").and_then(Value::as_str)?;
                let name = map
                    .get("metadata")
                    .and_then(|m| m.get("name"))
                    .and_then(Value::as_str)?;
                Some((kind.to_string(), name.to_string()))
            }
            PatchDocument::Json6902(_) => None,
        }
    }

    /// Apply the patch to a resource body.
    pub fn apply(&self, body: &mut Mapping) -> Result<PatchOutcome, String> {
        match self {
            PatchDocument::StrategicMerge(patch) => {
                if is_directive(patch, "delete") {
                    return Ok(PatchOutcome::Delete);
                }
                strategic_merge(body, &without_identity(patch));
                Ok(PatchOutcome::Keep)
            }
            PatchDocument::Json6902(ops) => {
                let mut root = Value::Mapping(std::mem::take(body));
                let result = ops.iter().try_for_each(|op| apply_op(&mut root, op));
                match root {
                    Value::Mapping(map) => *body = map,
                    _ => return Err("patch replaced the document with a non-mapping".to_string()),
                }
                result.map(|_| PatchOutcome::Keep)
            }
        }
    }
}

fn is_directive(map: &Mapping, directive: &str) -> bool {
    map.get(DIRECTIVE).and_then(Value::as_str) == Some(directive)
}

/// Drop the fields that locate the target so they cannot rename it.
fn without_identity(patch: &Mapping) -> Mapping {
    let mut patch = patch.clone();
    patch.remove("apiVersion");
    patch.remove("kind");
    if let Some(Value::Mapping(metadata)) = patch.get_mut("metadata") {
        metadata.remove("name");
        metadata.remove("namespace");
    }
    patch
}

fn strip_directives(value: &Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.iter()
                .filter(|(k, _)| k.as_str() != Some(DIRECTIVE))
                .map(|(k, v)| (k.clone(), strip_directives(v)))
                .collect(),
        ),
        Value::Sequence(seq) => Value::Sequence(seq.iter().map(strip_directives).collect()),
        other => other.clone(),
    }
}

fn strategic_merge(target: &mut Mapping, patch: &Mapping) {
    if is_directive(patch, "replace") {
        if let Value::Mapping(replacement) = strip_directives(&Value::Mapping(patch.clone())) {
            *target = replacement;
        }
        return;
    }

    for (key, value) in patch {
        if key.as_str() == Some(DIRECTIVE) {
            continue;
        }
        let deletes = value.is_null()
            || matches!(value, Value::Mapping(m) if is_directive(m, "delete"));
        if deletes {
            target.remove(key);
            continue;
        }

        match (target.get_mut(key), value) {
            (Some(Value::Mapping(existing)), Value::Mapping(patch_map)) => {
                strategic_merge(existing, patch_map)
            }
            (Some(Value::Sequence(existing)), Value::Sequence(patch_seq)) => {
                merge_list(existing, patch_seq)
            }
            _ => {
                target.insert(key.clone(), strip_directives(value));
            }
        }
    }
}

fn item_name(item: &Value) -> Option<&Value> {
    item.as_mapping().and_then(|m| m.get("name"))
}

/// Lists whose items all carry a `name` are merged item by item; any other
/// list is replaced.
fn merge_list(target: &mut Vec<Value>, patch: &[Value]) {
    let keyed = patch.iter().all(|item| item_name(item).is_some())
        && target.iter().all(|item| item_name(item).is_some());
    if !keyed {
        *target = patch.iter().map(strip_directives).collect();
        return;
    }

    for item in patch {
        let Value::Mapping(item_map) = item else {
            continue;
        };
        let position = target
            .iter()
            .position(|existing| item_name(existing) == item_name(item));
        match position {
            Some(index) if is_directive(item_map, "delete") => {
                target.remove(index);
            }
            Some(index) => {
                if let Value::Mapping(existing) = &mut target[index] {
                    strategic_merge(existing, item_map);
                }
            }
            None if is_directive(item_map, "delete") => {}
            None => target.push(strip_directives(item)),
        }
    }
}

fn apply_op(root: &mut Value, op: &JsonPatchOp) -> Result<(), String> {
    let path = pointer(&op.path)?;
    match op.op.as_str() {
        "add" => add(root, &path, required_value(op)?),
        "remove" => remove(root, &path).map(|_| ()),
        "replace" => {
            let target = lookup_mut(root, &path)?;
            *target = required_value(op)?;
            Ok(())
        }
        "move" => {
            let from = pointer(op.from.as_deref().unwrap_or_default())?;
            let value = remove(root, &from)?;
            add(root, &path, value)
        }
        "copy" => {
            let from = pointer(op.from.as_deref().unwrap_or_default())?;
            let value = lookup_mut(root, &from)?.clone();
            add(root, &path, value)
        }
        "test" => {
            let expected = required_value(op)?;
            if *lookup_mut(root, &path)? == expected {
                Ok(())
            } else {
                Err(format!("test failed at '{}'", op.path))
            }
        }
        other => Err(format!("unsupported patch operation '{}'", other)),
    }
}

fn pointer(path: &str) -> Result<Vec<String>, String> {
    parse_pointer(path).ok_or_else(|| format!("invalid JSON pointer '{}'", path))
}

fn required_value(op: &JsonPatchOp) -> Result<Value, String> {
    op.value
        .clone()
        .ok_or_else(|| format!("'{}' operation at '{}' needs a value", op.op, op.path))
}

fn parse_index(token: &str, len: usize) -> Result<usize, String> {
    match token.parse::<usize>() {
        Ok(index) if index < len => Ok(index),
        _ => Err(format!("index '{}' out of bounds", token)),
    }
}

fn lookup_mut<'a>(root: &'a mut Value, tokens: &[String]) -> Result<&'a mut Value, String> {
    let mut current = root;
    for token in tokens {
        current = match current {
            Value::Mapping(map) => map
                .get_mut(token.as_str())
                .ok_or_else(|| format!("path segment '{}' not found", token))?,
            Value::Sequence(seq) => {
                let index = parse_index(token, seq.len())?;
                &mut seq[index]
            }
            _ => return Err(format!("cannot descend into scalar at '{}'", token)),
        };
    }
    Ok(current)
}

fn add(root: &mut Value, tokens: &[String], value: Value) -> Result<(), String> {
    let Some((last, parent)) = tokens.split_last() else {
        *root = value;
        return Ok(());
    };
    match lookup_mut(root, parent)? {
        Value::Mapping(map) => {
            map.insert(Value::from(last.as_str()), value);
            Ok(())
        }
        Value::Sequence(seq) => {
            if last == "-" {
                seq.push(value);
                return Ok(());
            }
            let index = parse_index(last, seq.len() + 1)?;
            seq.insert(index, value);
            Ok(())
        }
        _ => Err(format!("cannot add '{}' to a scalar", last)),
    }
}

fn remove(root: &mut Value, tokens: &[String]) -> Result<Value, String> {
    let (last, parent) = tokens
        .split_last()
        .ok_or_else(|| "cannot remove the whole document".to_string())?;
    match lookup_mut(root, parent)? {
        Value::Mapping(map) => map
            .remove(last.as_str())
            .ok_or_else(|| format!("path segment '{}' not found", last)),
        Value::Sequence(seq) => {
            let index = parse_index(last, seq.len())?;
            Ok(seq.remove(index))
        }
        _ => Err(format!("cannot remove '{}' from a scalar", last)),
    }
}

//! # Resources
//!
//! A `Resource` is one orchestration document: an opaque YAML mapping plus
//! accessors for the handful of fields the engine understands (`apiVersion`,
//! `kind`, `metadata.name`, `metadata.namespace`, labels and annotations).
//!
//! Every resource also records its [`Origin`], the source document that first
//! produced it. Identity reconciliation uses the origin to tell a resource that
//! reached the output twice through a shared base apart from two unrelated
//! resources that happen to collide.

use std::fmt;
use std::path::PathBuf;

use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::error::{Error, Result};

/// A document that could not be turned into a resource.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct DocumentError(pub String);

/// Identity of a resource for deduplication: `(group, kind, namespace, name)`.
///
/// The API version is deliberately not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResId {
    pub group: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl fmt::Display for ResId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}", self.kind)?;
        } else {
            write!(f, "{}.{}", self.kind, self.group)?;
        }
        match &self.namespace {
            Some(ns) => write!(f, "/{}/{}", ns, self.name),
            None => write!(f, "/{}", self.name),
        }
    }
}

/// Where a resource was first produced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Document `index` of a resource file.
    File { path: PathBuf, index: usize },
    /// Document `index` emitted by generator declaration `generator` of the
    /// layer at `layer`.
    Generator {
        layer: PathBuf,
        generator: usize,
        index: usize,
    },
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::File { path, index } => write!(f, "{}#{}", path.display(), index),
            Origin::Generator {
                layer,
                generator,
                index,
            } => write!(f, "{} generator {}#{}", layer.display(), generator, index),
        }
    }
}

/// One orchestration document.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    body: Mapping,
    origin: Origin,
}

impl Resource {
    /// Wrap a parsed document, checking that it carries a kind and a name.
    pub fn new(body: Mapping, origin: Origin) -> std::result::Result<Self, DocumentError> {
        let kind = body.get("kind").and_then(Value::as_str).unwrap_or_default();
        if kind.is_empty() {
            return Err(DocumentError("document has no 'kind'".to_string()));
        }
        let name = body
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        if name.is_empty() {
            return Err(DocumentError(format!(
                "{} document has no 'metadata.name'",
                kind
            )));
        }
        Ok(Self { body, origin })
    }

    pub fn body(&self) -> &Mapping {
        &self.body
    }

    pub fn body_mut(&mut self) -> &mut Mapping {
        &mut self.body
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    pub fn api_version(&self) -> &str {
        self.body
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// API group, empty for the core group (`apiVersion: v1`).
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    pub fn version(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((_, version)) => version,
            None => self.api_version(),
        }
    }

    pub fn kind(&self) -> &str {
        self.body
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata_field("name").unwrap_or_default()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.metadata_field("namespace").filter(|ns| !ns.is_empty())
    }

    pub fn labels(&self) -> Option<&Mapping> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_mapping)
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.body
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(key))
            .and_then(Value::as_str)
    }

    pub fn id(&self) -> ResId {
        ResId {
            group: self.group().to_string(),
            kind: self.kind().to_string(),
            namespace: self.namespace().map(str::to_string),
            name: self.name().to_string(),
        }
    }

    pub fn set_name(&mut self, name: &str) -> Result<()> {
        self.metadata_mut()?
            .insert(Value::from("name"), Value::from(name));
        Ok(())
    }

    pub fn set_namespace(&mut self, namespace: &str) -> Result<()> {
        self.metadata_mut()?
            .insert(Value::from("namespace"), Value::from(namespace));
        Ok(())
    }

    /// Add or overwrite one entry of `metadata.labels`.
    pub fn set_label(&mut self, key: &str, value: &str) -> Result<()> {
        self.metadata_map_mut("labels")?
            .insert(Value::from(key), Value::from(value));
        Ok(())
    }

    /// Add or overwrite one entry of `metadata.annotations`.
    pub fn set_annotation(&mut self, key: &str, value: &str) -> Result<()> {
        self.metadata_map_mut("annotations")?
            .insert(Value::from(key), Value::from(value));
        Ok(())
    }

    fn metadata_field(&self, field: &str) -> Option<&str> {
        self.body
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
    }

    fn metadata_mut(&mut self) -> Result<&mut Mapping> {
        let id = self.id();
        let slot = self
            .body
            .entry(Value::from("metadata"))
            .or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::Mapping(Mapping::new());
        }
        slot.as_mapping_mut().ok_or_else(|| Error::Transform {
            resource: id.to_string(),
            message: "'metadata' is not a mapping".to_string(),
        })
    }

    fn metadata_map_mut(&mut self, field: &str) -> Result<&mut Mapping> {
        let id = self.id();
        let slot = self
            .metadata_mut()?
            .entry(Value::from(field))
            .or_insert(Value::Null);
        if slot.is_null() {
            *slot = Value::Mapping(Mapping::new());
        }
        slot.as_mapping_mut().ok_or_else(|| Error::Transform {
            resource: id.to_string(),
            message: format!("'metadata.{}' is not a mapping", field),
        })
    }
}

/// Split a multi-document YAML stream into mapping documents.
///
/// Empty documents (including comment-only ones) are skipped and `List`
/// documents are expanded into their items, preserving order.
pub fn parse_documents(text: &str) -> std::result::Result<Vec<Mapping>, DocumentError> {
    let mut documents = Vec::new();
    for (position, document) in serde_yaml::Deserializer::from_str(text).enumerate() {
        let value = Value::deserialize(document)
            .map_err(|e| DocumentError(format!("document {}: {}", position, e)))?;
        match value {
            Value::Null => {}
            Value::Mapping(map) => expand_list(map, &mut documents)?,
            _ => {
                return Err(DocumentError(format!(
                    "document {} is not a mapping",
                    position
                )))
            }
        }
    }
    Ok(documents)
}

fn expand_list(map: Mapping, out: &mut Vec<Mapping>) -> std::result::Result<(), DocumentError> {
    let is_list = map
        .get("kind")
        .and_then(Value::as_str)
        .is_some_and(|kind| kind.ends_with("List"))
        && map.get("items").is_some_and(Value::is_sequence);
    if !is_list {
        out.push(map);
        return Ok(());
    }

    if let Some(Value::Sequence(items)) = map.get("items") {
        for item in items {
            match item {
                Value::Mapping(item) => out.push(item.clone()),
                _ => return Err(DocumentError("List item is not a mapping".to_string())),
            }
        }
    }
    Ok(())
}

/// Parse a resource file into resources, tagging each with its file origin.
pub fn parse_resources(
    text: &str,
    path: &std::path::Path,
) -> std::result::Result<Vec<Resource>, DocumentError> {
    parse_documents(text)?
        .into_iter()
        .enumerate()
        .map(|(index, body)| {
            Resource::new(
                body,
                Origin::File {
                    path: path.to_path_buf(),
                    index,
                },
            )
        })
        .collect()
}

//! # Transformer Stack
//!
//! Each layer owns one [`TransformerStack`] built from its declaration. The
//! stack rewrites the full list of resources the layer collected (its own and
//! everything inherited from sub-layers) in a fixed order:
//!
//! 1. name prefix / suffix,
//! 2. namespace assignment (namespaced kinds only),
//! 3. label and annotation injection,
//! 4. patches.
//!
//! The order is not configurable; a declaration only decides which steps are
//! present and with which arguments. Every step keeps the list's length and
//! order, except a strategic merge patch carrying `$patch: delete`.
//!
//! Patch selectors match the identity a resource had when it entered the
//! stack, so a patch written against `Deployment/web` still applies after the
//! same layer renamed it to `prod-web`.

use std::collections::BTreeMap;
use std::path::Path;

use log::{debug, trace};
use regex::Regex;
use serde_yaml::Value;

use crate::config::{LayerDecl, PatchDecl, PatchTarget};
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;
use crate::patch::{PatchDocument, PatchOutcome};
use crate::path::resolve;
use crate::resource::Resource;

/// Kinds whose names are structurally constrained and never prefixed.
const UNPREFIXED_KINDS: [&str; 2] = ["CustomResourceDefinition", "APIService"];

/// Kinds that exist outside any namespace.
const CLUSTER_SCOPED_KINDS: [&str; 22] = [
    "APIService",
    "CertificateSigningRequest",
    "ClusterIssuer",
    "ClusterRole",
    "ClusterRoleBinding",
    "ComponentStatus",
    "CSIDriver",
    "CSINode",
    "CustomResourceDefinition",
    "FlowSchema",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "PriorityLevelConfiguration",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
    "VolumeAttachment",
];

/// Returns true for kinds that carry a namespace.
pub fn is_namespaced(kind: &str) -> bool {
    !CLUSTER_SCOPED_KINDS.contains(&kind)
}

/// One label requirement of a `labelSelector`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LabelRequirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
}

/// Compiled form of a [`PatchTarget`].
#[derive(Debug, Clone)]
pub struct Selector {
    group: Option<String>,
    version: Option<String>,
    kind: Option<String>,
    name: Option<Regex>,
    namespace: Option<String>,
    labels: Vec<LabelRequirement>,
}

impl Selector {
    pub fn compile(target: &PatchTarget) -> Result<Self> {
        let name = target
            .name
            .as_deref()
            .map(|pattern| Regex::new(&format!("^(?:{})$", pattern)))
            .transpose()?;
        let labels = target
            .label_selector
            .as_deref()
            .map(parse_label_selector)
            .transpose()?
            .unwrap_or_default();
        Ok(Self {
            group: target.group.clone(),
            version: target.version.clone(),
            kind: target.kind.clone(),
            name,
            namespace: target.namespace.clone(),
            labels,
        })
    }

    /// Exact-match selector for a patch that names its own target.
    fn exact(kind: &str, name: &str) -> Self {
        Self {
            group: None,
            version: None,
            kind: Some(kind.to_string()),
            name: Regex::new(&format!("^{}$", regex::escape(name))).ok(),
            namespace: None,
            labels: Vec::new(),
        }
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        let field = |expected: &Option<String>, actual: &str| {
            expected.as_deref().map_or(true, |e| e == actual)
        };
        field(&self.group, resource.group())
            && field(&self.version, resource.version())
            && field(&self.kind, resource.kind())
            && field(&self.namespace, resource.namespace().unwrap_or_default())
            && self
                .name
                .as_ref()
                .map_or(true, |re| re.is_match(resource.name()))
            && self.labels.iter().all(|req| label_matches(req, resource))
    }
}

fn label_matches(requirement: &LabelRequirement, resource: &Resource) -> bool {
    let label = |key: &str| {
        resource
            .labels()
            .and_then(|labels| labels.get(key))
            .and_then(Value::as_str)
    };
    match requirement {
        LabelRequirement::Equals(key, value) => label(key) == Some(value.as_str()),
        LabelRequirement::NotEquals(key, value) => label(key) != Some(value.as_str()),
        LabelRequirement::Exists(key) => label(key).is_some(),
    }
}

fn parse_label_selector(selector: &str) -> Result<Vec<LabelRequirement>> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .map(|term| {
            let requirement = if let Some((key, value)) = term.split_once("!=") {
                LabelRequirement::NotEquals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = term.split_once("==") {
                LabelRequirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else if let Some((key, value)) = term.split_once('=') {
                LabelRequirement::Equals(key.trim().to_string(), value.trim().to_string())
            } else {
                LabelRequirement::Exists(term.to_string())
            };
            match &requirement {
                LabelRequirement::Equals(key, _)
                | LabelRequirement::NotEquals(key, _)
                | LabelRequirement::Exists(key)
                    if key.is_empty() || key.contains(char::is_whitespace) =>
                {
                    Err(Error::config(format!(
                        "Invalid label selector term '{}'",
                        term
                    )))
                }
                _ => Ok(requirement),
            }
        })
        .collect()
}

/// A patch ready to apply.
#[derive(Debug, Clone)]
pub struct Patch {
    /// Where the patch came from, for error messages.
    source: String,
    document: PatchDocument,
    selector: Selector,
}

impl Patch {
    /// Load a patch declaration of the layer in `layer_dir`.
    pub fn load(decl: &PatchDecl, layer_dir: &Path, fs: &dyn FileSystem) -> Result<Self> {
        let (source, text) = match (&decl.path, &decl.patch) {
            (Some(path), _) => {
                let file = resolve(layer_dir, path);
                (file.display().to_string(), fs.read_to_string(&file)?)
            }
            (None, Some(inline)) => (
                format!("inline patch in {}", layer_dir.display()),
                inline.clone(),
            ),
            (None, None) => return Err(Error::config("A patch needs either 'path' or 'patch'")),
        };

        let document = PatchDocument::parse(&text)
            .map_err(|e| Error::config(format!("{}: {}", source, e)))?;
        let selector = match (&decl.target, document.self_target()) {
            (Some(target), _) => Selector::compile(target)?,
            (None, Some((kind, name))) => Selector::exact(&kind, &name),
            (None, None) => {
                return Err(Error::config_with_hint(
                    format!("{}: patch has no target", source),
                    "Add a 'target' selector, or give the patch its own kind and metadata.name",
                ))
            }
        };

        Ok(Self {
            source,
            document,
            selector,
        })
    }
}

/// The rewrites one layer applies to everything it collected.
#[derive(Debug, Clone, Default)]
pub struct TransformerStack {
    name_prefix: String,
    name_suffix: String,
    namespace: Option<String>,
    labels: BTreeMap<String, String>,
    annotations: BTreeMap<String, String>,
    patches: Vec<Patch>,
}

impl TransformerStack {
    /// Build the stack declared by a layer, loading its patch files.
    pub fn from_layer(decl: &LayerDecl, layer_dir: &Path, fs: &dyn FileSystem) -> Result<Self> {
        let patches = decl
            .patches
            .iter()
            .map(|patch| Patch::load(patch, layer_dir, fs))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name_prefix: decl.name_prefix.clone().unwrap_or_default(),
            name_suffix: decl.name_suffix.clone().unwrap_or_default(),
            namespace: decl.namespace.clone(),
            labels: decl.common_labels.clone(),
            annotations: decl.common_annotations.clone(),
            patches,
        })
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = suffix.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// True when applying the stack would change nothing.
    pub fn is_empty(&self) -> bool {
        self.name_prefix.is_empty()
            && self.name_suffix.is_empty()
            && self.namespace.is_none()
            && self.labels.is_empty()
            && self.annotations.is_empty()
            && self.patches.is_empty()
    }

    /// Apply every step, in order, to `resources`.
    pub fn apply(&self, resources: Vec<Resource>) -> Result<Vec<Resource>> {
        if self.is_empty() {
            return Ok(resources);
        }
        // Patch selectors look at the resources as they entered the stack
        let entry = if self.patches.is_empty() {
            Vec::new()
        } else {
            resources.clone()
        };

        let mut resources = resources;
        self.rename(&mut resources)?;
        self.assign_namespace(&mut resources)?;
        self.inject_metadata(&mut resources)?;
        self.apply_patches(resources, &entry)
    }

    fn rename(&self, resources: &mut [Resource]) -> Result<()> {
        if self.name_prefix.is_empty() && self.name_suffix.is_empty() {
            return Ok(());
        }
        for resource in resources.iter_mut() {
            if UNPREFIXED_KINDS.contains(&resource.kind()) {
                continue;
            }
            let name = format!("{}{}{}", self.name_prefix, resource.name(), self.name_suffix);
            trace!("Renaming {} to {}", resource.id(), name);
            resource.set_name(&name)?;
        }
        Ok(())
    }

    fn assign_namespace(&self, resources: &mut [Resource]) -> Result<()> {
        let Some(namespace) = &self.namespace else {
            return Ok(());
        };
        for resource in resources.iter_mut() {
            if is_namespaced(resource.kind()) {
                resource.set_namespace(namespace)?;
            } else if resource.namespace().is_some() {
                debug!(
                    "Leaving cluster-scoped {} outside namespace '{}'",
                    resource.id(),
                    namespace
                );
            }
        }
        Ok(())
    }

    fn inject_metadata(&self, resources: &mut [Resource]) -> Result<()> {
        for resource in resources.iter_mut() {
            for (key, value) in &self.labels {
                resource.set_label(key, value)?;
            }
            for (key, value) in &self.annotations {
                resource.set_annotation(key, value)?;
            }
        }
        Ok(())
    }

    fn apply_patches(&self, mut resources: Vec<Resource>, entry: &[Resource]) -> Result<Vec<Resource>> {
        if self.patches.is_empty() {
            return Ok(resources);
        }
        let mut deleted = vec![false; resources.len()];

        for patch in &self.patches {
            let mut matched = 0;
            for (position, original) in entry.iter().enumerate() {
                if deleted[position] || !patch.selector.matches(original) {
                    continue;
                }
                matched += 1;
                let resource = &mut resources[position];
                let id = resource.id();
                match patch.document.apply(resource.body_mut()) {
                    Ok(PatchOutcome::Keep) => {
                        debug!("Patched {} with {}", id, patch.source);
                    }
                    Ok(PatchOutcome::Delete) => {
                        debug!("Deleted {} with {}", id, patch.source);
                        deleted[position] = true;
                    }
                    Err(message) => {
                        return Err(Error::Transform {
                            resource: id.to_string(),
                            message: format!("{}: {}", patch.source, message),
                        })
                    }
                }
            }
            if matched == 0 {
                return Err(Error::Transform {
                    resource: patch.source.clone(),
                    message: "patch target matches no resource".to_string(),
                });
            }
        }

        Ok(resources
            .into_iter()
            .zip(deleted)
            .filter_map(|(resource, deleted)| (!deleted).then_some(resource))
            .collect())
    }
}

//! # Layer Declaration Schema and Parsing
//!
//! This module defines the data structures that represent a layer
//! declaration (`kustomization.yaml`), as well as the logic for parsing it.
//!
//! ## Key Components
//!
//! - **`LayerDecl`**: one layer's declaration: its resource references, the
//!   arguments of its transformer stack and its generator blocks.
//! - **`ChartArgs`**: one chart inflation generator block (`helmCharts[]`).
//! - **`PatchDecl`** / **`PatchTarget`**: a patch and the selector choosing
//!   which resources it applies to.
//!
//! ## Parsing
//!
//! The `parse` function accepts two spellings for several features and
//! normalizes them into the current format:
//!
//! 1.  **Current Format**: `helmCharts`, `patches`.
//!
//! 2.  **Legacy Format**: `helmChartInflationGenerator` (with `chartName`,
//!     `chartRepoUrl`, `chartVersion`, ...), `patchesStrategicMerge` and
//!     `patchesJson6902`.
//!
//! Unknown fields are rejected so that typos do not silently change the
//! composition.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::defaults::LAYER_FILE_NAMES;
use crate::error::{Error, Result};
use crate::filesystem::FileSystem;

/// How `valuesInline` combines with the values loaded from files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValuesMerge {
    /// Inline values win over file values
    #[default]
    Override,
    /// File values win over inline values
    Merge,
    /// Inline values replace file values entirely
    Replace,
}

/// Chart inflation generator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChartArgs {
    /// Name of the chart bundle.
    pub name: String,
    /// Chart version to fetch; any locally available version is used when omitted.
    #[serde(default)]
    pub version: Option<String>,
    /// Repository URL the chart is fetched from (`https://...` or `oci://...`).
    #[serde(default)]
    pub repo: Option<String>,
    /// Release name passed to the renderer; defaults to the chart name.
    #[serde(default)]
    pub release_name: Option<String>,
    /// Namespace passed to the renderer as the release namespace.
    #[serde(default)]
    pub namespace: Option<String>,
    /// Overrides the release-derived name the renderer computes.
    #[serde(default)]
    pub name_template: Option<String>,
    /// Values files merged over the chart defaults, in order.
    #[serde(default)]
    pub additional_values_files: Vec<String>,
    /// Replaces the chart's own `values.yaml` as the base values.
    #[serde(default)]
    pub values_file: Option<String>,
    /// Values merged after every values file, according to `values_merge`.
    #[serde(default)]
    pub values_inline: Option<Mapping>,
    #[serde(default)]
    pub values_merge: ValuesMerge,
    #[serde(default, rename = "includeCRDs")]
    pub include_crds: bool,
    /// Drop resources carrying the test-hook annotation.
    #[serde(default)]
    pub skip_tests: bool,
    #[serde(default)]
    pub skip_hooks: bool,
    /// Capability strings passed to the renderer.
    #[serde(default)]
    pub api_versions: Vec<String>,
    #[serde(default)]
    pub kube_version: Option<String>,
}

impl ChartArgs {
    /// Release name handed to the renderer.
    pub fn release_name(&self) -> &str {
        self.release_name
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Settings shared by every chart block of a layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HelmGlobals {
    /// Directory (relative to the layer) holding local chart bundles.
    #[serde(default)]
    pub chart_home: Option<String>,
    /// Renderer configuration directory; a scratch directory when unset.
    #[serde(default)]
    pub config_home: Option<String>,
}

/// Selects the resources a patch applies to.
///
/// Every field that is set must match; `name` is a regular expression
/// anchored at both ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PatchTarget {
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Comma-separated `key=value` label requirements.
    #[serde(default)]
    pub label_selector: Option<String>,
}

/// Patch declaration: exactly one of `path` or `patch`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchDecl {
    /// File holding the patch, relative to the layer.
    #[serde(default)]
    pub path: Option<String>,
    /// Inline patch text.
    #[serde(default)]
    pub patch: Option<String>,
    #[serde(default)]
    pub target: Option<PatchTarget>,
}

/// A layer declaration, normalized to the current format.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDecl {
    /// Resource files and sub-layer directories, in order.
    pub resources: Vec<String>,
    pub namespace: Option<String>,
    pub name_prefix: Option<String>,
    pub name_suffix: Option<String>,
    pub common_labels: BTreeMap<String, String>,
    pub common_annotations: BTreeMap<String, String>,
    pub patches: Vec<PatchDecl>,
    pub helm_charts: Vec<ChartArgs>,
    pub helm_globals: HelmGlobals,
}

/// Legacy chart block (`helmChartInflationGenerator[]`).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct LegacyChartArgs {
    chart_name: String,
    #[serde(default)]
    chart_repo_url: Option<String>,
    #[serde(default)]
    chart_version: Option<String>,
    #[serde(default)]
    release_name: Option<String>,
    #[serde(default)]
    release_namespace: Option<String>,
    #[serde(default)]
    values: Option<String>,
}

impl From<LegacyChartArgs> for ChartArgs {
    fn from(legacy: LegacyChartArgs) -> Self {
        ChartArgs {
            name: legacy.chart_name,
            version: legacy.chart_version,
            repo: legacy.chart_repo_url,
            release_name: legacy.release_name,
            namespace: legacy.release_namespace,
            values_file: legacy.values,
            ..ChartArgs::default()
        }
    }
}

/// Legacy path-addressed patch (`patchesJson6902[]`).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct LegacyJsonPatch {
    target: PatchTarget,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    patch: Option<String>,
}

/// Everything a declaration may contain, before normalization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawLayerDecl {
    #[serde(default)]
    api_version: Option<String>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    resources: Vec<String>,
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    name_prefix: Option<String>,
    #[serde(default)]
    name_suffix: Option<String>,
    #[serde(default)]
    common_labels: BTreeMap<String, String>,
    #[serde(default)]
    common_annotations: BTreeMap<String, String>,
    #[serde(default)]
    patches: Vec<PatchDecl>,
    #[serde(default)]
    patches_strategic_merge: Vec<String>,
    #[serde(default)]
    patches_json6902: Vec<LegacyJsonPatch>,
    #[serde(default)]
    helm_charts: Vec<ChartArgs>,
    #[serde(default)]
    helm_chart_inflation_generator: Vec<LegacyChartArgs>,
    #[serde(default)]
    helm_globals: HelmGlobals,
}

impl RawLayerDecl {
    fn normalize(self) -> LayerDecl {
        if let Some(kind) = &self.kind {
            debug!("Declaration kind: {} ({:?})", kind, self.api_version);
        }

        let mut patches = self.patches;
        // A strategic merge entry is either a file path or an inline document
        patches.extend(self.patches_strategic_merge.into_iter().map(|entry| {
            if entry.contains('\n') {
                PatchDecl {
                    patch: Some(entry),
                    ..PatchDecl::default()
                }
            } else {
                PatchDecl {
                    path: Some(entry),
                    ..PatchDecl::default()
                }
            }
        }));
        patches.extend(self.patches_json6902.into_iter().map(|legacy| PatchDecl {
            path: legacy.path,
            patch: legacy.patch,
            target: Some(legacy.target),
        }));

        let mut helm_charts = self.helm_charts;
        helm_charts.extend(
            self.helm_chart_inflation_generator
                .into_iter()
                .map(ChartArgs::from),
        );

        LayerDecl {
            resources: self.resources,
            namespace: self.namespace,
            name_prefix: self.name_prefix,
            name_suffix: self.name_suffix,
            common_labels: self.common_labels,
            common_annotations: self.common_annotations,
            patches,
            helm_charts,
            helm_globals: self.helm_globals,
        }
    }
}

/// Parse a layer declaration from YAML text.
///
/// An empty document is a valid, empty layer.
pub fn parse(yaml_content: &str) -> Result<LayerDecl> {
    let value: Value = serde_yaml::from_str(yaml_content).map_err(|e| Error::config(e.to_string()))?;
    if value.is_null() {
        return Ok(LayerDecl::default());
    }
    if !value.is_mapping() {
        return Err(Error::config("Layer declaration must be a mapping"));
    }

    let raw: RawLayerDecl = serde_yaml::from_value(value).map_err(|e| {
        Error::config_with_hint(
            e.to_string(),
            "Check the field names of the layer declaration (they are camelCase)",
        )
    })?;
    let decl = raw.normalize();
    validate(&decl)?;
    Ok(decl)
}

/// Locate and parse the declaration file of the layer in `dir`.
///
/// Returns the path of the declaration file alongside the parsed declaration.
pub fn from_dir(fs: &dyn FileSystem, dir: &Path) -> Result<(PathBuf, LayerDecl)> {
    let file = find_declaration(fs, dir).ok_or_else(|| {
        Error::config_with_hint(
            format!("No layer declaration found in {}", dir.display()),
            format!("Create one of: {}", LAYER_FILE_NAMES.join(", ")),
        )
    })?;
    let content = fs.read_to_string(&file)?;
    let decl = parse(&content).map_err(|e| match e {
        Error::ConfigParse { message, hint } => Error::ConfigParse {
            message: format!("{}: {}", file.display(), message),
            hint,
        },
        other => other,
    })?;
    Ok((file, decl))
}

/// Returns the declaration file of the layer in `dir`, if there is one.
pub fn find_declaration(fs: &dyn FileSystem, dir: &Path) -> Option<PathBuf> {
    LAYER_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|candidate| fs.is_file(candidate))
}

fn validate(decl: &LayerDecl) -> Result<()> {
    if let Some(namespace) = &decl.namespace {
        if !is_dns_label(namespace) {
            return Err(Error::config_with_hint(
                format!("Invalid namespace '{}'", namespace),
                "Namespaces are lowercase alphanumerics and '-', at most 63 characters",
            ));
        }
    }

    for patch in &decl.patches {
        match (&patch.path, &patch.patch) {
            (Some(_), Some(_)) => {
                return Err(Error::config("A patch may set 'path' or 'patch', not both"))
            }
            (None, None) => return Err(Error::config("A patch needs either 'path' or 'patch'")),
            _ => {}
        }
    }

    for chart in &decl.helm_charts {
        if chart.name.trim().is_empty() {
            return Err(Error::config("Chart block is missing 'name'"));
        }
        if let Some(repo) = &chart.repo {
            url::Url::parse(repo).map_err(|e| {
                Error::config_with_hint(
                    format!("Invalid repo '{}' for chart '{}': {}", repo, chart.name, e),
                    "Use an absolute URL such as https://charts.example.com or oci://registry/charts",
                )
            })?;
        }
    }
    Ok(())
}

fn is_dns_label(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= 63
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !value.starts_with('-')
        && !value.ends_with('-')
}

//! Chart inflation generator.
//!
//! Renders a named, versioned chart bundle into resources by invoking an
//! external renderer (`helm`).
//!
//! ## Steps
//!
//! 1. **Bundle**: look for the chart under the layer's chart home
//!    (`<chartHome>/<name>-<version>`, then `<chartHome>/<name>`), copying it
//!    into a scratch workspace; otherwise `helm pull` it from `repo` into the
//!    workspace.
//! 2. **Values**: the chart's `values.yaml` (or `valuesFile`), then every
//!    `additionalValuesFiles` entry deep-merged on top in order, then
//!    `valuesInline` according to `valuesMerge`. Sequences are replaced, never
//!    concatenated.
//! 3. **Render**: `helm template` with the release name (or
//!    `--name-template`), the merged values file and the capability flags.
//! 4. **Parse**: the multi-document output becomes resources in emission
//!    order; test hooks are dropped when `skipTests` is set.
//!
//! The scratch workspace is private to one invocation and removed afterwards,
//! so concurrent invocations never see each other's bundles. The timeout
//! bounds the whole invocation: each renderer call gets what is left of it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde_yaml::{Mapping, Value};
use tempfile::TempDir;

use super::{Generator, GeneratorContext};
use crate::config::{ChartArgs, ValuesMerge};
use crate::defaults::{DEFAULT_CHART_HOME, HOOK_ANNOTATION, TEST_HOOK_VALUES};
use crate::error::{Error, GeneratorFailure, Result};
use crate::filesystem::FileSystem;
use crate::merge::yaml::{merge_yaml_mappings, sort_keys};
use crate::path::resolve;
use crate::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};
use crate::resource::{parse_documents, Origin, Resource};

/// Renders chart bundles through an external `helm` binary.
pub struct HelmChartInflationGenerator {
    runner: Arc<dyn CommandRunner>,
    command: String,
    timeout: Option<Duration>,
}

impl Generator for HelmChartInflationGenerator {
    type Config = ChartArgs;

    const KIND: &'static str = "helmChart";

    fn generate(&self, chart: &ChartArgs, ctx: &GeneratorContext<'_>) -> Result<Vec<Resource>> {
        let workspace = Workspace::new()?;
        let chart_dir = self.resolve_bundle(chart, ctx, &workspace)?;

        let values = merged_values(chart, ctx, &chart_dir).map_err(|message| {
            failure(chart, GeneratorFailure::InvalidValues { message })
        })?;
        let values_file = workspace.path().join("values.yaml");
        let values_text = serde_yaml::to_string(&sort_keys(&Value::Mapping(values)))
            .map_err(|e| Error::Serialization {
                message: format!("values for chart '{}': {}", chart.name, e),
            })?;
        std::fs::write(&values_file, values_text)?;

        let spec = self.template_command(chart, ctx, &workspace, &chart_dir, &values_file)?;
        let output = self.execute(chart, &spec)?;
        if !output.success {
            return Err(failure(
                chart,
                GeneratorFailure::RendererFailed {
                    status: output.status,
                    stderr: output.stderr.trim().to_string(),
                },
            ));
        }

        let resources = parse_rendered(chart, ctx, output.stdout)?;
        info!(
            "Chart '{}' rendered {} resource(s)",
            chart.name,
            resources.len()
        );
        Ok(resources)
    }
}

impl HelmChartInflationGenerator {
    pub fn new(runner: Arc<dyn CommandRunner>, command: String, timeout: Option<Duration>) -> Self {
        Self {
            runner,
            command,
            timeout,
        }
    }

    /// Make the chart available on disk inside the workspace.
    fn resolve_bundle(
        &self,
        chart: &ChartArgs,
        ctx: &GeneratorContext<'_>,
        workspace: &Workspace,
    ) -> Result<PathBuf> {
        let chart_home = resolve(
            ctx.layer_dir,
            ctx.helm_globals
                .chart_home
                .as_deref()
                .unwrap_or(DEFAULT_CHART_HOME),
        );

        if let Some(local) = find_local_chart(chart, ctx.fs, &chart_home)? {
            debug!("Using local chart {}", local.display());
            let staged = workspace.path().join("chart").join(&chart.name);
            stage_chart(ctx.fs, &local, &staged)?;
            return Ok(staged);
        }

        let Some(repo) = chart.repo.as_deref() else {
            let wanted = chart
                .version
                .as_deref()
                .map(|v| format!(" version {}", v))
                .unwrap_or_default();
            return Err(failure(
                chart,
                GeneratorFailure::BundleUnavailable {
                    message: format!(
                        "chart{} not found under {} and no repo is set",
                        wanted,
                        chart_home.display()
                    ),
                },
            ));
        };
        self.pull(chart, ctx, repo, workspace)
    }

    fn pull(
        &self,
        chart: &ChartArgs,
        ctx: &GeneratorContext<'_>,
        repo: &str,
        workspace: &Workspace,
    ) -> Result<PathBuf> {
        let untar_dir = workspace.path().join("pulled");
        std::fs::create_dir_all(&untar_dir)?;

        let mut spec = CommandSpec::new(&self.command).arg("pull");
        spec = if repo.starts_with("oci://") {
            spec.arg(format!("{}/{}", repo.trim_end_matches('/'), chart.name))
        } else {
            spec.arg(&chart.name).arg("--repo").arg(repo)
        };
        if let Some(version) = &chart.version {
            spec = spec.arg("--version").arg(version);
        }
        spec = spec
            .arg("--untar")
            .arg("--untardir")
            .arg(untar_dir.to_string_lossy())
            .current_dir(workspace.path())
            .timeout(self.time_left(chart, workspace)?);
        spec.env = workspace.helm_env(ctx);

        info!("Pulling chart '{}' from {}", chart.name, repo);
        let output = self.execute(chart, &spec)?;
        if !output.success {
            return Err(failure(
                chart,
                GeneratorFailure::BundleUnavailable {
                    message: output.stderr.trim().to_string(),
                },
            ));
        }

        let pulled = untar_dir.join(&chart.name);
        if !pulled.join("Chart.yaml").is_file() {
            return Err(failure(
                chart,
                GeneratorFailure::BundleUnavailable {
                    message: format!("pulled archive has no chart directory '{}'", chart.name),
                },
            ));
        }
        Ok(pulled)
    }

    fn template_command(
        &self,
        chart: &ChartArgs,
        ctx: &GeneratorContext<'_>,
        workspace: &Workspace,
        chart_dir: &Path,
        values_file: &Path,
    ) -> Result<CommandSpec> {
        let mut spec = CommandSpec::new(&self.command).arg("template");
        spec = match &chart.name_template {
            Some(template) => spec.arg("--name-template").arg(template),
            None => spec.arg(chart.release_name()),
        };
        spec = spec
            .arg(chart_dir.to_string_lossy())
            .arg("--values")
            .arg(values_file.to_string_lossy());

        if let Some(namespace) = &chart.namespace {
            spec = spec.arg("--namespace").arg(namespace);
        }
        if chart.include_crds {
            spec = spec.arg("--include-crds");
        }
        if chart.skip_tests {
            spec = spec.arg("--skip-tests");
        }
        if chart.skip_hooks {
            spec = spec.arg("--no-hooks");
        }
        if let Some(kube_version) = &chart.kube_version {
            spec = spec.arg("--kube-version").arg(kube_version);
        }
        for api_version in &chart.api_versions {
            spec = spec.arg("--api-versions").arg(api_version);
        }

        spec = spec
            .current_dir(workspace.path())
            .timeout(self.time_left(chart, workspace)?);
        spec.env = workspace.helm_env(ctx);
        Ok(spec)
    }

    /// What remains of the invocation's time bound.
    fn time_left(&self, chart: &ChartArgs, workspace: &Workspace) -> Result<Option<Duration>> {
        let Some(total) = self.timeout else {
            return Ok(None);
        };
        let left = total.saturating_sub(workspace.started.elapsed());
        if left.is_zero() {
            return Err(failure(chart, GeneratorFailure::Timeout { after: total }));
        }
        Ok(Some(left))
    }

    fn execute(&self, chart: &ChartArgs, spec: &CommandSpec) -> Result<CommandOutput> {
        debug!("Invoking renderer: {}", spec.display());
        self.runner.run(spec).map_err(|e| match e {
            ProcessError::NotFound { program } => {
                failure(chart, GeneratorFailure::RendererMissing { command: program })
            }
            ProcessError::TimedOut { after } => failure(
                chart,
                GeneratorFailure::Timeout {
                    after: self.timeout.unwrap_or(after),
                },
            ),
            ProcessError::Io(e) => Error::Io(e),
        })
    }
}

/// Private scratch directory of one invocation.
struct Workspace {
    dir: TempDir,
    started: Instant,
}

impl Workspace {
    fn new() -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("stratum-helm-").tempdir()?;
        Ok(Self {
            dir,
            started: Instant::now(),
        })
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Renderer home directories, pointed into the workspace unless the
    /// layer names a config home.
    fn helm_env(&self, ctx: &GeneratorContext<'_>) -> Vec<(String, String)> {
        let home = match &ctx.helm_globals.config_home {
            Some(config_home) => resolve(ctx.layer_dir, config_home),
            None => self.path().join("helm"),
        };
        let config = match &ctx.helm_globals.config_home {
            Some(_) => home.clone(),
            None => home.join("config"),
        };
        vec![
            ("HELM_CONFIG_HOME".to_string(), config.to_string_lossy().into_owned()),
            ("HELM_CACHE_HOME".to_string(), home.join("cache").to_string_lossy().into_owned()),
            ("HELM_DATA_HOME".to_string(), home.join("data").to_string_lossy().into_owned()),
        ]
    }
}

fn failure(chart: &ChartArgs, cause: GeneratorFailure) -> Error {
    Error::Generator {
        kind: HelmChartInflationGenerator::KIND.to_string(),
        name: chart.name.clone(),
        cause,
    }
}

fn find_local_chart(
    chart: &ChartArgs,
    fs: &dyn FileSystem,
    chart_home: &Path,
) -> Result<Option<PathBuf>> {
    let mut candidates = Vec::new();
    if let Some(version) = &chart.version {
        candidates.push(chart_home.join(format!("{}-{}", chart.name, version)));
    }
    candidates.push(chart_home.join(&chart.name));

    for dir in candidates {
        let manifest = dir.join("Chart.yaml");
        if !fs.is_file(&manifest) {
            continue;
        }
        if let Some(wanted) = &chart.version {
            let found = chart_version(fs, &manifest).map_err(|message| {
                failure(chart, GeneratorFailure::BundleUnavailable { message })
            })?;
            if found.as_deref() != Some(wanted.as_str()) {
                debug!(
                    "Skipping {}: version {:?} does not match {}",
                    dir.display(),
                    found,
                    wanted
                );
                continue;
            }
        }
        return Ok(Some(dir));
    }
    Ok(None)
}

fn chart_version(fs: &dyn FileSystem, manifest: &Path) -> std::result::Result<Option<String>, String> {
    let text = fs.read_to_string(manifest).map_err(|e| e.to_string())?;
    let value: Value = serde_yaml::from_str(&text)
        .map_err(|e| format!("invalid {}: {}", manifest.display(), e))?;
    Ok(match value.get("version") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// Copy a chart out of the layer filesystem into the workspace.
fn stage_chart(fs: &dyn FileSystem, source: &Path, dest: &Path) -> Result<()> {
    for relative in fs.files_under(source)? {
        let target = dest.join(&relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, fs.read(&source.join(&relative))?)?;
    }
    Ok(())
}

fn merged_values(
    chart: &ChartArgs,
    ctx: &GeneratorContext<'_>,
    chart_dir: &Path,
) -> std::result::Result<Mapping, String> {
    let mut values = match &chart.values_file {
        Some(file) => read_values_file(ctx.fs, &resolve(ctx.layer_dir, file))?,
        None => {
            let defaults = chart_dir.join("values.yaml");
            if defaults.is_file() {
                let text = std::fs::read_to_string(&defaults)
                    .map_err(|e| format!("{}: {}", defaults.display(), e))?;
                parse_values(&text, &defaults)?
            } else {
                Mapping::new()
            }
        }
    };

    for file in &chart.additional_values_files {
        let overlay = read_values_file(ctx.fs, &resolve(ctx.layer_dir, file))?;
        merge_yaml_mappings(&mut values, &overlay, "");
    }

    if let Some(inline) = &chart.values_inline {
        values = match chart.values_merge {
            ValuesMerge::Override => {
                merge_yaml_mappings(&mut values, inline, "");
                values
            }
            ValuesMerge::Merge => {
                let mut base = inline.clone();
                merge_yaml_mappings(&mut base, &values, "");
                base
            }
            ValuesMerge::Replace => inline.clone(),
        };
    }
    Ok(values)
}

fn read_values_file(fs: &dyn FileSystem, path: &Path) -> std::result::Result<Mapping, String> {
    let text = fs.read_to_string(path).map_err(|e| e.to_string())?;
    parse_values(&text, path)
}

fn parse_values(text: &str, path: &Path) -> std::result::Result<Mapping, String> {
    match serde_yaml::from_str::<Value>(text) {
        Ok(Value::Mapping(map)) => Ok(map),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(format!("{} is not a mapping", path.display())),
        Err(e) => Err(format!("{}: {}", path.display(), e)),
    }
}

fn parse_rendered(chart: &ChartArgs, ctx: &GeneratorContext<'_>, stdout: Vec<u8>) -> Result<Vec<Resource>> {
    let malformed = |message: String| failure(chart, GeneratorFailure::MalformedOutput { message });

    let text = String::from_utf8(stdout).map_err(|_| malformed("output is not UTF-8".to_string()))?;
    let documents = parse_documents(&text).map_err(|e| malformed(e.0))?;

    let mut resources = Vec::with_capacity(documents.len());
    for (index, body) in documents.into_iter().enumerate() {
        if chart.skip_tests && is_test_hook(&body) {
            debug!("Dropping test hook document {} of chart '{}'", index, chart.name);
            continue;
        }
        if chart.skip_hooks && hook_annotation(&body).is_some() {
            continue;
        }
        let origin = Origin::Generator {
            layer: ctx.layer_dir.to_path_buf(),
            generator: ctx.index,
            index,
        };
        resources.push(Resource::new(body, origin).map_err(|e| malformed(e.0))?);
    }
    Ok(resources)
}

fn hook_annotation(body: &Mapping) -> Option<&str> {
    body.get("metadata")
        .and_then(|m| m.get("annotations"))
        .and_then(|a| a.get(HOOK_ANNOTATION))
        .and_then(Value::as_str)
}

/// Returns true when the document is a renderer test hook.
pub fn is_test_hook(body: &Mapping) -> bool {
    hook_annotation(body).is_some_and(|hooks| {
        hooks
            .split(',')
            .map(str::trim)
            .any(|hook| TEST_HOOK_VALUES.contains(&hook))
    })
}

//! Shared test utilities for integration and E2E tests.
//!
//! This module provides layer fixtures, a renderer stand-in and helper
//! functions to reduce duplication across test files.
//!
//! ## Usage
//!
//! Add `mod common;` to your test file, then use the helpers:
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_minecraft_layers();
//!     fixture.command().arg("build").arg("both").assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use serde_yaml::{Mapping, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use stratum::process::{CommandOutput, CommandRunner, CommandSpec, ProcessError};

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    #[allow(unused_imports)]
    pub use assert_cmd::cargo::cargo_bin_cmd;
    #[allow(unused_imports)]
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    #[allow(unused_imports)]
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::layers;
    #[allow(unused_imports)]
    pub use super::{FakeRenderer, TestFixture};
}

/// Layer declarations and chart files used across tests.
#[allow(dead_code)]
pub mod layers {
    /// Chart metadata of the local `minecraft` chart.
    pub const MINECRAFT_CHART: &str = "apiVersion: v2\nname: minecraft\nversion: 3.1.3\n";

    /// Default values of the local `minecraft` chart.
    pub const MINECRAFT_VALUES: &str = r#"
minecraftServer:
  eula: "FALSE"
  difficulty: easy
  serviceType: ClusterIP
rcon:
  password: CHANGEME
"#;

    /// A template file, staged with the chart but never read by the fake renderer.
    pub const MINECRAFT_TEMPLATE: &str = "apiVersion: v1\nkind: Service\n";

    /// Base layer inflating the chart with release name `test`.
    pub const BASE: &str = r#"
helmCharts:
- name: minecraft
  version: 3.1.3
  releaseName: test
  valuesInline:
    minecraftServer:
      eula: "TRUE"
"#;

    pub const PROD: &str = r#"
namePrefix: myProd-
namespace: prod
resources:
- ../base
"#;

    pub const DEV: &str = r#"
namePrefix: myDev-
namespace: dev
resources:
- ../base
"#;

    pub const BOTH: &str = r#"
resources:
- ../dev
- ../prod
"#;
}

/// A stand-in for the chart renderer.
///
/// `template` renders a Secret and a Service named `<release>-<chart>` from
/// the values file it is handed, a ConfigMap whose name `minecraft-config` is
/// fixed in the chart, plus a test hook Pod unless `--skip-tests`
/// is given. Every call is recorded.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeRenderer {
    calls: Mutex<Vec<CommandSpec>>,
}

#[allow(dead_code)]
impl FakeRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    fn render(spec: &CommandSpec) -> Result<String, String> {
        let args = &spec.args;
        let (release, chart_dir) = if args[1] == "--name-template" {
            (args[2].clone(), PathBuf::from(&args[3]))
        } else {
            (args[1].clone(), PathBuf::from(&args[2]))
        };

        let chart: Value = read_yaml(&chart_dir.join("Chart.yaml"))?;
        let chart_name = chart["name"].as_str().unwrap_or("chart").to_string();
        let values_path = arg_after(spec, "--values").ok_or("missing --values")?;
        let values: Value = read_yaml(Path::new(values_path))?;

        let full_name = format!("{}-{}", release, chart_name);
        let mut rendered = format!(
            "---\n# Source: {chart}/templates/secrets.yaml\napiVersion: v1\nkind: Secret\nmetadata:\n  name: {name}\n  labels:\n    app: {name}\ntype: Opaque\nstringData:\n  eula: {eula:?}\n  rcon-password: {password:?}\n",
            chart = chart_name,
            name = full_name,
            eula = values["minecraftServer"]["eula"].as_str().unwrap_or(""),
            password = values["rcon"]["password"].as_str().unwrap_or(""),
        );
        rendered.push_str(&format!(
            "---\n# Source: {chart}/templates/service.yaml\napiVersion: v1\nkind: Service\nmetadata:\n  name: {name}\n  labels:\n    app: {name}\nspec:\n  type: {service_type}\n  ports:\n  - name: minecraft\n    port: 25565\n  selector:\n    app: {name}\n",
            chart = chart_name,
            name = full_name,
            service_type = values["minecraftServer"]["serviceType"]
                .as_str()
                .unwrap_or("ClusterIP"),
        ));
        rendered.push_str(&format!(
            "---\n# Source: {chart}/templates/configmap.yaml\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: minecraft-config\ndata:\n  difficulty: {difficulty}\n",
            chart = chart_name,
            difficulty = values["minecraftServer"]["difficulty"]
                .as_str()
                .unwrap_or("easy"),
        ));
        if !args.iter().any(|a| a == "--skip-tests") {
            rendered.push_str(&format!(
                "---\napiVersion: v1\nkind: Pod\nmetadata:\n  name: {name}-test\n  annotations:\n    helm.sh/hook: test\nspec:\n  restartPolicy: Never\n",
                name = full_name,
            ));
        }
        Ok(rendered)
    }
}

impl CommandRunner for FakeRenderer {
    fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, ProcessError> {
        self.calls.lock().unwrap().push(spec.clone());
        match spec.args.first().map(String::as_str) {
            Some("template") => Ok(match Self::render(spec) {
                Ok(stream) => CommandOutput::success(stream),
                Err(message) => CommandOutput::failure(1, message),
            }),
            _ => Ok(CommandOutput::failure(1, "Error: unsupported command")),
        }
    }
}

/// The value following `flag` in a command's arguments.
#[allow(dead_code)]
pub fn arg_after<'a>(spec: &'a CommandSpec, flag: &str) -> Option<&'a str> {
    spec.args
        .iter()
        .position(|a| a == flag)
        .and_then(|i| spec.args.get(i + 1))
        .map(String::as_str)
}

fn read_yaml(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_yaml::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))
}

/// Read a field of a resource by dotted path, e.g. `metadata.name`.
#[allow(dead_code)]
pub fn field<'a>(body: &'a Mapping, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = body.get(segments.next()?)?;
    for segment in segments {
        current = current.get(segment)?;
    }
    Some(current)
}

/// A shell script standing in for `helm` in CLI tests.
///
/// It understands `template` only and emits a single ConfigMap named after
/// the release, carrying the `greeting` value from the values file.
#[allow(dead_code)]
pub const FAKE_HELM_SCRIPT: &str = r#"#!/bin/sh
if [ "$1" != "template" ]; then
  echo "Error: unsupported command $1" >&2
  exit 1
fi
release="$2"
values=""
while [ $# -gt 0 ]; do
  if [ "$1" = "--values" ]; then values="$2"; fi
  shift
done
greeting=$(sed -n 's/^greeting: *//p' "$values")
cat <<DOC
apiVersion: v1
kind: ConfigMap
metadata:
  name: $release-greeter
data:
  greeting: $greeting
DOC
"#;

/// A test fixture that provides a temporary directory of layers.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_file("app/kustomization.yaml", "resources:\n- cm.yaml\n")
///     .with_file("app/cm.yaml", "kind: ConfigMap\nmetadata:\n  name: a\n");
///
/// fixture.command().arg("build").arg("app").assert().success();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Add the base/prod/dev/both layers over the local `minecraft` chart.
    pub fn with_minecraft_layers(self) -> Self {
        self.with_file("base/kustomization.yaml", layers::BASE)
            .with_file("base/charts/minecraft/Chart.yaml", layers::MINECRAFT_CHART)
            .with_file("base/charts/minecraft/values.yaml", layers::MINECRAFT_VALUES)
            .with_file(
                "base/charts/minecraft/templates/service.yaml",
                layers::MINECRAFT_TEMPLATE,
            )
            .with_file("prod/kustomization.yaml", layers::PROD)
            .with_file("dev/kustomization.yaml", layers::DEV)
            .with_file("both/kustomization.yaml", layers::BOTH)
    }

    /// Install [`FAKE_HELM_SCRIPT`] as an executable and return its path.
    #[cfg(unix)]
    pub fn install_fake_helm(&self) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = self.temp_dir.child("bin/helm");
        script
            .write_str(FAKE_HELM_SCRIPT)
            .expect("Failed to write fake helm");
        std::fs::set_permissions(script.path(), std::fs::Permissions::from_mode(0o755))
            .expect("Failed to mark fake helm executable");
        script.path().to_path_buf()
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Create a child path in the temp directory.
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// Create a command configured to run in this fixture's directory.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("stratum");
        cmd.current_dir(self.path())
            .env_remove("STRATUM_ENABLE_HELM")
            .env_remove("STRATUM_HELM_COMMAND")
            .env_remove("STRATUM_GENERATOR_TIMEOUT")
            .env_remove("RUST_LOG");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_with_file() {
        let fixture = TestFixture::new().with_file("a/b.txt", "hello");
        assert!(fixture.path().join("a/b.txt").exists());
    }

    #[test]
    fn test_layer_snippets_are_valid_yaml() {
        for text in [
            layers::BASE,
            layers::PROD,
            layers::DEV,
            layers::BOTH,
            layers::MINECRAFT_CHART,
            layers::MINECRAFT_VALUES,
        ] {
            serde_yaml::from_str::<Value>(text).expect("Snippet should be valid YAML");
        }
    }
}

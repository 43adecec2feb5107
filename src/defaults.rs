//! Default values for stratum configuration.
//!
//! This module provides centralized default values used by the library and
//! the command-line front end, ensuring consistency and avoiding duplication.

use std::time::Duration;

/// File names recognized as a layer declaration, in lookup order.
pub const LAYER_FILE_NAMES: [&str; 3] = ["kustomization.yaml", "kustomization.yml", "Kustomization"];

/// Directory (relative to the declaring layer) searched for local chart bundles.
pub const DEFAULT_CHART_HOME: &str = "charts";

/// Renderer executable used by the chart inflation generator.
pub const DEFAULT_HELM_COMMAND: &str = "helm";

/// Seconds a single generator invocation may run before it is abandoned.
pub const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 300;

/// Annotation a renderer places on hook resources.
pub const HOOK_ANNOTATION: &str = "helm.sh/hook";

/// Hook values that mark a resource as a post-install test.
pub const TEST_HOOK_VALUES: [&str; 3] = ["test", "test-success", "test-failure"];

/// Returns the default generator timeout.
///
/// This can be overridden by the `--timeout` CLI flag or the
/// `STRATUM_GENERATOR_TIMEOUT` environment variable.
pub fn default_generator_timeout() -> Duration {
    Duration::from_secs(DEFAULT_GENERATOR_TIMEOUT_SECS)
}

//! # Error Handling
//!
//! This module defines the centralized error type for `stratum`. It uses the
//! `thiserror` library to build a single `Error` enum covering every failure
//! mode of a build, with enough context (paths, identities, generator names)
//! to tell the user what went wrong.
//!
//! ## Error families
//!
//! - **Configuration** (`ConfigParse`, `CycleDetected`): a layer declaration is
//!   malformed or the layer graph is cyclic. Always fatal.
//! - **Generator** (`Generator`): a generator could not produce resources. The
//!   attached [`GeneratorFailure`] distinguishes "feature unavailable" (the
//!   renderer is missing or disabled) from "invalid input".
//! - **Transform** (`Transform`): a transformer could not be applied to a
//!   resource, e.g. a patch with no matching target.
//! - **Identity** (`IdentityConflict`): two unrelated sources produced the
//!   same resource identity, or a same-identity merge was impossible.
//!
//! No partial output is ever returned alongside an error: a build either
//! yields the complete resource list or exactly one `Error`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for stratum operations
#[derive(Error, Debug)]
pub enum Error {
    /// A layer declaration could not be parsed or references something invalid.
    ///
    /// Optionally carries a hint about how to fix the declaration.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A layer references itself, directly or through other layers.
    #[error("Cycle detected in layer references: {cycle}")]
    CycleDetected { cycle: String },

    /// A generator failed to produce resources.
    #[error("Generator {kind} '{name}' failed: {cause}")]
    Generator {
        /// Generator kind, e.g. `helmChart`
        kind: String,
        /// The generator instance, usually the bundle name
        name: String,
        cause: GeneratorFailure,
    },

    /// A transformer could not be applied to a resource.
    #[error("Transform error on {resource}: {message}")]
    Transform { resource: String, message: String },

    /// Two resources share an identity and could not be reconciled.
    #[error("Identity conflict for {id}: {message}")]
    IdentityConflict { id: String, message: String },

    /// An error occurred while reading layer inputs.
    #[error("Filesystem operation error: {message}")]
    Filesystem { message: String },

    /// An error occurred during serialization of the output stream.
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Why a generator invocation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeneratorFailure {
    /// The generator kind is known but was not enabled for this build.
    #[error("generator is disabled (enable it with --enable-helm)")]
    Disabled,

    /// The bundle could not be found locally or fetched from its source.
    #[error("bundle unavailable: {message}")]
    BundleUnavailable { message: String },

    /// The external renderer binary is not installed or not executable.
    #[error("renderer missing: '{command}' could not be executed")]
    RendererMissing { command: String },

    /// The renderer ran but exited unsuccessfully.
    #[error("renderer failed ({}): {stderr}", status.map(|s| format!("exit status {}", s)).unwrap_or_else(|| "terminated by signal".to_string()))]
    RendererFailed { status: Option<i32>, stderr: String },

    /// The renderer did not finish within the configured bound.
    #[error("timeout after {}s", after.as_secs())]
    Timeout { after: Duration },

    /// The renderer output could not be parsed into resources.
    #[error("malformed generator output: {message}")]
    MalformedOutput { message: String },

    /// Value overrides could not be read or merged.
    #[error("invalid values: {message}")]
    InvalidValues { message: String },
}

impl Error {
    /// Returns true when the failure means "this feature cannot run here"
    /// rather than "the configuration is wrong". Callers may skip instead of
    /// failing on these.
    pub fn is_feature_unavailable(&self) -> bool {
        matches!(
            self,
            Error::Generator {
                cause: GeneratorFailure::Disabled | GeneratorFailure::RendererMissing { .. },
                ..
            }
        )
    }

    /// Returns true for malformed declarations and cyclic layer graphs.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::ConfigParse { .. } | Error::CycleDetected { .. })
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            hint: None,
        }
    }

    pub(crate) fn config_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

//! # Stratum
//!
//! This library composes a deployable set of orchestration manifests from a
//! tree of reusable, overridable *layers*. It is used by the `stratum`
//! command-line tool but can be embedded anywhere a layer tree has to be
//! resolved.
//!
//! ## Quick Example
//!
//! ```
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use stratum::filesystem::MemoryFS;
//! use stratum::phases::orchestrator::{build, BuildOptions};
//! use stratum::process::SystemCommandRunner;
//!
//! let fs = MemoryFS::new()
//!     .with_file("base/kustomization.yaml", "resources:\n- svc.yaml\n")
//!     .unwrap()
//!     .with_file("base/svc.yaml", "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n")
//!     .unwrap()
//!     .with_file("prod/kustomization.yaml", "namespace: prod\nnamePrefix: prod-\nresources:\n- ../base\n")
//!     .unwrap();
//!
//! let output = build(
//!     Path::new("prod"),
//!     &fs,
//!     &BuildOptions::default(),
//!     Arc::new(SystemCommandRunner),
//! )
//! .unwrap();
//! assert_eq!(output.resources()[0].name(), "prod-web");
//! assert_eq!(output.resources()[0].namespace(), Some("prod"));
//! ```
//!
//! ## Core Concepts
//!
//! - **Layer declaration (`config`)**: the `kustomization.yaml` schema: resource
//!   references, transformer arguments and generator blocks.
//! - **Resources (`resource`)**: opaque YAML documents with an identity
//!   `(group, kind, namespace, name)` and a record of where they came from.
//! - **Transformer stack (`transform`, `patch`)**: the fixed sequence of
//!   rewrites one layer applies to everything it collected.
//! - **Generators (`generator`, `process`)**: plugins producing resources from
//!   configuration, such as rendering a chart through an external renderer.
//! - **Phases (`phases`)**: the pipeline from discovering layers to writing the
//!   final stream.
//!
//! ## Execution Flow
//!
//! The main entry point is `phases::orchestrator::build`:
//!
//! 1.  **Discovery**: load every layer reachable from the root.
//! 2.  **Ordering**: reject reference cycles, order layers children-first.
//! 3.  **Processing**: resolve each layer over its sub-layers' output.
//! 4.  **Composite**: reconcile resources that converged on one identity.
//! 5.  **Writing**: serialize as one deterministic multi-document stream.

pub mod config;
pub mod defaults;
pub mod error;
pub mod filesystem;
pub mod generator;
pub mod merge;
pub mod patch;
pub mod path;
pub mod phases;
pub mod process;
pub mod resource;
pub mod suggestions;
pub mod transform;

#[cfg(test)]
mod path_proptest;

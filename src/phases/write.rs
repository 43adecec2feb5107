//! Phase 5: Writing
//!
//! This is the final phase of a build. It serializes the resolved resources
//! into one multi-document YAML stream.
//!
//! ## Format
//!
//! - One document per resource, in output order, separated by `---`.
//! - Mapping keys are emitted in sorted order at every level, so the stream is
//!   byte-stable whatever order a renderer or a patch produced fields in.
//! - An empty resource list produces an empty stream.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde_yaml::Value;

use crate::error::{Error, Result};
use crate::merge::yaml::sort_keys;
use crate::resource::Resource;

const SEPARATOR: &str = "---\n";

/// Serialize resources into a multi-document stream.
pub fn to_yaml_stream(resources: &[Resource]) -> Result<String> {
    let mut documents = Vec::with_capacity(resources.len());
    for resource in resources {
        let body = sort_keys(&Value::Mapping(resource.body().clone()));
        let text = serde_yaml::to_string(&body).map_err(|e| Error::Serialization {
            message: format!("{}: {}", resource.id(), e),
        })?;
        documents.push(text);
    }
    Ok(documents.join(SEPARATOR))
}

/// Executes Phase 5: write the stream to `output`, or to stdout when `None`.
pub fn execute(resources: &[Resource], output: Option<&Path>) -> Result<()> {
    let stream = to_yaml_stream(resources)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).map_err(|e| Error::Filesystem {
                    message: format!("Failed to create directory '{}': {}", parent.display(), e),
                })?;
            }
            fs::write(path, stream).map_err(|e| Error::Filesystem {
                message: format!("Failed to write file '{}': {}", path.display(), e),
            })
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(stream.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

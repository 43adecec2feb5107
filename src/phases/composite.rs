//! Phase 4: Composite
//!
//! This phase enforces identity uniqueness over the root layer's output.
//!
//! ## Process
//!
//! 1.  **Scan**: resources are visited in emission order and indexed by
//!     identity `(group, kind, namespace, name)`.
//!
//! 2.  **Convergence**: when a resource repeats an identity already seen and
//!     both copies come from the same source document (the same base reached
//!     through two paths without diverging transforms), the later copy is
//!     merged on top of the earlier one, which keeps its position.
//!
//! 3.  **Conflict**: when the colliding resources come from different source
//!     documents, the collision is reported as an identity conflict.

use std::collections::HashMap;

use log::debug;

use crate::error::{Error, Result};
use crate::merge::yaml::merge_yaml_mappings;
use crate::resource::{ResId, Resource};

/// Executes Phase 4: reconcile identity collisions.
pub fn execute(resources: Vec<Resource>) -> Result<Vec<Resource>> {
    let mut positions: HashMap<ResId, usize> = HashMap::with_capacity(resources.len());
    let mut output: Vec<Resource> = Vec::with_capacity(resources.len());

    for resource in resources {
        let id = resource.id();
        match positions.get(&id) {
            Some(&position) => {
                let existing = &mut output[position];
                if existing.origin() != resource.origin() {
                    return Err(Error::IdentityConflict {
                        id: id.to_string(),
                        message: format!(
                            "produced by both {} and {}",
                            existing.origin(),
                            resource.origin()
                        ),
                    });
                }
                debug!("Merging repeated {} from {}", id, resource.origin());
                merge_yaml_mappings(existing.body_mut(), resource.body(), "");
            }
            None => {
                positions.insert(id, output.len());
                output.push(resource);
            }
        }
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Origin;
    use serde_yaml::Mapping;
    use std::path::PathBuf;

    fn resource(yaml: &str, file: &str) -> Resource {
        let body: Mapping = serde_yaml::from_str(yaml).unwrap();
        Resource::new(
            body,
            Origin::File {
                path: PathBuf::from(file),
                index: 0,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_distinct_identities_kept_in_order() {
        let out = execute(vec![
            resource("kind: Service\nmetadata:\n  name: a\n  namespace: dev\n", "svc.yaml"),
            resource("kind: Service\nmetadata:\n  name: a\n  namespace: prod\n", "svc.yaml"),
            resource("kind: Secret\nmetadata:\n  name: a\n  namespace: dev\n", "secret.yaml"),
        ])
        .unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].namespace(), Some("dev"));
        assert_eq!(out[1].namespace(), Some("prod"));
    }

    #[test]
    fn test_same_origin_converges_by_merge() {
        let out = execute(vec![
            resource("kind: Service\nmetadata:\n  name: a\nspec:\n  port: 80\n", "svc.yaml"),
            resource("kind: Secret\nmetadata:\n  name: s\n", "secret.yaml"),
            resource(
                "kind: Service\nmetadata:\n  name: a\n  labels:\n    x: y\nspec:\n  port: 81\n",
                "svc.yaml",
            ),
        ])
        .unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind(), "Service");
        assert_eq!(out[0].labels().and_then(|l| l.get("x")).and_then(|v| v.as_str()), Some("y"));
        let port = out[0].body().get("spec").and_then(|s| s.get("port"));
        assert_eq!(port, Some(&serde_yaml::Value::from(81)));
    }

    #[test]
    fn test_unrelated_origins_conflict() {
        let err = execute(vec![
            resource("kind: Service\nmetadata:\n  name: a\n", "one.yaml"),
            resource("kind: Service\nmetadata:\n  name: a\n", "two.yaml"),
        ])
        .unwrap_err();
        assert!(matches!(err, Error::IdentityConflict { .. }));
        assert!(err.to_string().contains("one.yaml"));
        assert!(err.to_string().contains("two.yaml"));
    }

    #[test]
    fn test_api_version_not_part_of_identity() {
        let out = execute(vec![
            resource("apiVersion: apps/v1beta1\nkind: Deployment\nmetadata:\n  name: a\n", "d.yaml"),
            resource("apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: a\n", "d.yaml"),
        ])
        .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].api_version(), "apps/v1");
    }
}

//! # Error Suggestions
//!
//! This module turns library errors into messages that tell the user what
//! went wrong AND how to fix it. The CLI reports every failure through
//! [`explain`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stratum::suggestions;
//!
//! let output = build(root, &fs, &options, runner).map_err(suggestions::explain)?;
//! ```

use crate::error::{Error, GeneratorFailure};

/// Field names accepted in a layer declaration.
const DECLARATION_FIELDS: [&str; 14] = [
    "apiVersion",
    "kind",
    "resources",
    "namespace",
    "namePrefix",
    "nameSuffix",
    "commonLabels",
    "commonAnnotations",
    "patches",
    "patchesStrategicMerge",
    "patchesJson6902",
    "helmCharts",
    "helmChartInflationGenerator",
    "helmGlobals",
];

/// Wrap a library error with hints for the user.
pub fn explain(error: Error) -> anyhow::Error {
    let hints = hints_for(&error);
    if hints.is_empty() {
        return anyhow::Error::new(error);
    }
    anyhow::anyhow!("{}\n\n{}", error, hints.join("\n"))
}

fn hints_for(error: &Error) -> Vec<String> {
    match error {
        Error::ConfigParse { message, .. } => unknown_field(message)
            .and_then(|field| find_similar(field, &DECLARATION_FIELDS))
            .map(|similar| vec![format!("hint: Did you mean '{}'?", similar)])
            .unwrap_or_default(),
        Error::CycleDetected { .. } => vec![
            "hint: Remove one of the 'resources' entries on the cycle to break it".to_string(),
            "hint: Move shared resources into a separate base layer".to_string(),
        ],
        Error::Generator { cause, .. } => match cause {
            GeneratorFailure::Disabled => {
                vec!["hint: Pass --enable-helm or set STRATUM_ENABLE_HELM=true".to_string()]
            }
            GeneratorFailure::RendererMissing { command } => vec![
                format!("hint: Install '{}' or put it on PATH", command),
                "hint: Use --helm-command to point at a different binary".to_string(),
            ],
            GeneratorFailure::Timeout { .. } => {
                vec!["hint: Raise the bound with --timeout <SECS> (0 disables it)".to_string()]
            }
            GeneratorFailure::BundleUnavailable { .. } => vec![
                "hint: Check the chart's name, repo and version".to_string(),
                "hint: Or place the chart under the layer's chart home (default 'charts/')"
                    .to_string(),
            ],
            _ => Vec::new(),
        },
        Error::Transform { .. } => {
            vec!["hint: Patch targets match resource names as they were before this layer's prefix, suffix and namespace".to_string()]
        }
        Error::IdentityConflict { .. } => {
            vec!["hint: Give one of the resources a different name, or a namePrefix/nameSuffix in its layer".to_string()]
        }
        _ => Vec::new(),
    }
}

/// The field name in a "unknown field `x`" parse message.
fn unknown_field(message: &str) -> Option<&str> {
    let rest = message.split("unknown field `").nth(1)?;
    rest.split('`').next()
}

/// Find a similar string from a list of candidates using edit distance.
///
/// Returns Some(candidate) if a close match is found (edit distance <= 2).
fn find_similar<'a>(input: &str, candidates: &[&'a str]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|&candidate| {
            let distance = edit_distance(&input.to_lowercase(), &candidate.to_lowercase());
            (distance <= 2 && distance < input.len()).then_some((candidate, distance))
        })
        .min_by_key(|(_, distance)| *distance)
        .map(|(candidate, _)| candidate)
}

/// Levenshtein distance, computed over a single rolling row.
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = diagonal + usize::from(ca != cb);
            diagonal = row[j + 1];
            row[j + 1] = substitution.min(row[j] + 1).min(diagonal + 1);
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use std::time::Duration;

    #[test]
    fn test_typo_in_declaration_suggests_field() {
        let err = config::parse("namePrefx: x-\n").unwrap_err();
        let message = explain(err).to_string();
        assert!(message.contains("Did you mean 'namePrefix'?"));
    }

    #[test]
    fn test_unrelated_field_gets_no_suggestion() {
        let err = config::parse("somethingElse: 1\n").unwrap_err();
        assert!(!explain(err).to_string().contains("Did you mean"));
    }

    #[test]
    fn test_disabled_generator_hint() {
        let err = Error::Generator {
            kind: "helmChart".to_string(),
            name: "app".to_string(),
            cause: GeneratorFailure::Disabled,
        };
        assert!(explain(err).to_string().contains("--enable-helm"));
    }

    #[test]
    fn test_timeout_hint() {
        let err = Error::Generator {
            kind: "helmChart".to_string(),
            name: "app".to_string(),
            cause: GeneratorFailure::Timeout {
                after: Duration::from_secs(5),
            },
        };
        let message = explain(err).to_string();
        assert!(message.contains("timeout after 5s"));
        assert!(message.contains("--timeout"));
    }

    #[test]
    fn test_cycle_hint() {
        let err = Error::CycleDetected {
            cycle: "a -> b -> a".to_string(),
        };
        let message = explain(err).to_string();
        assert!(message.contains("a -> b -> a"));
        assert!(message.contains("break it"));
    }

    #[test]
    fn test_unknown_field_extraction() {
        assert_eq!(
            unknown_field("unknown field `namePrefx`, expected one of `resources`"),
            Some("namePrefx")
        );
        assert_eq!(unknown_field("missing field `name`"), None);
    }

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("resources", "resources"), 0);
        assert_eq!(edit_distance("resource", "resources"), 1);
        assert_eq!(edit_distance("namspace", "namespace"), 1);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar() {
        assert_eq!(find_similar("helmchart", &DECLARATION_FIELDS), Some("helmCharts"));
        assert_eq!(find_similar("foobar", &DECLARATION_FIELDS), None);
    }
}

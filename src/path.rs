//! Path manipulation utilities for stratum

use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path, resolving `.` and `..` components without
/// touching the filesystem.
///
/// Layers are addressed by their normalized directory path, so `overlay/../base`
/// and `base` refer to the same layer. A `..` that would climb above the start
/// of a relative path is preserved.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Resolve `reference` relative to the directory `base`.
pub fn resolve(base: &Path, reference: &str) -> PathBuf {
    normalize(&base.join(reference))
}

/// Hosts whose scheme-less references (`github.com/org/repo//dir`) are remote.
const REMOTE_HOSTS: [&str; 3] = ["github.com", "gitlab.com", "bitbucket.org"];

/// Returns true if the reference looks like a remote location rather than a
/// local path.
///
/// Besides URLs and `git@` addresses this recognizes the scheme-less form
/// `host/org/repo//subdir?ref=...`: a known host, a `?ref=` query, or a
/// dotted first segment followed by a `//` subdirectory separator.
pub fn is_remote(reference: &str) -> bool {
    if reference.contains("://") || reference.starts_with("git@") || reference.contains("?ref=") {
        return true;
    }
    let Some((host, rest)) = reference.split_once('/') else {
        return false;
    };
    if REMOTE_HOSTS.contains(&host) {
        return true;
    }
    host.contains('.') && host != "." && host != ".." && rest.contains("//")
}

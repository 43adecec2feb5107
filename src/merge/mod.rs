//! Merge primitives shared by values handling, patches and identity
//! reconciliation.
//!
//! - `yaml` holds the recursive deep merge of YAML values. Sequences are
//!   always replaced wholesale, never concatenated.
//! - [`parse_pointer`] splits RFC 6901 JSON pointers used by path-addressed
//!   patches.

pub mod yaml;

/// Parse a JSON pointer (`/spec/template/0/name`) into unescaped tokens.
///
/// The empty pointer addresses the whole document and yields no tokens.
/// Returns `None` when the pointer is non-empty but does not start with `/`.
///
/// # Examples
///
/// ```
/// use stratum::merge::parse_pointer;
///
/// let tokens = parse_pointer("/metadata/annotations/example.com~1owner").unwrap();
/// assert_eq!(tokens, vec!["metadata", "annotations", "example.com/owner"]);
/// ```
pub fn parse_pointer(pointer: &str) -> Option<Vec<String>> {
    if pointer.is_empty() {
        return Some(Vec::new());
    }
    let rest = pointer.strip_prefix('/')?;
    Some(
        rest.split('/')
            .map(|token| token.replace("~1", "/").replace("~0", "~"))
            .collect(),
    )
}

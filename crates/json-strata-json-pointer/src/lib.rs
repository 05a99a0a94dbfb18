//! Fragment JSON Pointer utilities for configuration references.
//!
//! Configuration documents may contain reference objects whose `$ref` value
//! is a *fragment pointer*: a fixed `#/` prefix followed by `/`-separated
//! segments, with `~1` unescaping to `/` and `~0` to `~`. This crate parses,
//! formats, and walks such paths against `serde_json::Value` documents.
//!
//! Unlike a general-purpose RFC 6901 pointer, a reference path only ever
//! traverses objects: configuration lists are opaque leaf values, so a path
//! segment that lands on anything other than an object is an error rather
//! than an array-index lookup.
//!
//! # Example
//!
//! ```
//! use json_strata_json_pointer::{parse_ref_path, walk};
//!
//! let doc = serde_json::json!({"fonts": {"defaultSize": 14}});
//! let path = parse_ref_path("#/fonts/defaultSize").unwrap();
//! assert_eq!(path, vec!["fonts".to_string(), "defaultSize".to_string()]);
//! assert_eq!(walk(&doc, &path).unwrap(), &serde_json::json!(14));
//! ```

use serde_json::Value;
use thiserror::Error;

/// The prefix every reference path carries.
pub const REF_PREFIX: &str = "#/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefPathError {
    #[error("reference path must start with `#/`")]
    MissingPrefix,
    #[error("segment {0:?} not found")]
    MissingSegment(String),
    #[error("segment {0:?} is not an object")]
    NotAnObject(String),
}

/// Returns `true` when the string is shaped like a reference path.
pub fn is_ref_path(path: &str) -> bool {
    path.starts_with(REF_PREFIX)
}

/// Unescapes a reference-path segment.
///
/// `~1` becomes `/` and `~0` becomes `~`.
///
/// # Example
///
/// ```
/// use json_strata_json_pointer::unescape_segment;
///
/// assert_eq!(unescape_segment("a~0b"), "a~b");
/// assert_eq!(unescape_segment("c~1d"), "c/d");
/// assert_eq!(unescape_segment("plain"), "plain");
/// ```
pub fn unescape_segment(segment: &str) -> String {
    if !segment.contains('~') {
        return segment.to_string();
    }
    // ~1 must be handled before ~0, or "~01" would decode to "/"
    segment.replace("~1", "/").replace("~0", "~")
}

/// Escapes a key for use as a reference-path segment.
///
/// `~` becomes `~0` and `/` becomes `~1`.
///
/// # Example
///
/// ```
/// use json_strata_json_pointer::escape_segment;
///
/// assert_eq!(escape_segment("a~b"), "a~0b");
/// assert_eq!(escape_segment("c/d"), "c~1d");
/// ```
pub fn escape_segment(key: &str) -> String {
    if !key.contains('~') && !key.contains('/') {
        return key.to_string();
    }
    // ~ must be escaped before /, or "/" would double-escape to "~01"
    key.replace('~', "~0").replace('/', "~1")
}

/// Parse a reference path into unescaped segments.
///
/// The two-character `#/` prefix is stripped before splitting; its absence is
/// the only parse error. An empty remainder yields an empty segment list,
/// which addresses the document root.
///
/// # Example
///
/// ```
/// use json_strata_json_pointer::{parse_ref_path, RefPathError};
///
/// assert_eq!(parse_ref_path("#/a/b").unwrap(), vec!["a", "b"]);
/// assert_eq!(parse_ref_path("#/a~1b").unwrap(), vec!["a/b"]);
/// assert_eq!(parse_ref_path("#/").unwrap(), Vec::<String>::new());
/// assert_eq!(parse_ref_path("/a/b"), Err(RefPathError::MissingPrefix));
/// ```
pub fn parse_ref_path(path: &str) -> Result<Vec<String>, RefPathError> {
    let rest = path.strip_prefix(REF_PREFIX).ok_or(RefPathError::MissingPrefix)?;
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    Ok(rest.split('/').map(unescape_segment).collect())
}

/// Format segments back into a reference path.
///
/// # Example
///
/// ```
/// use json_strata_json_pointer::format_ref_path;
///
/// assert_eq!(format_ref_path(&[]), "#/");
/// assert_eq!(
///     format_ref_path(&["a".to_string(), "b/c".to_string()]),
///     "#/a/b~1c"
/// );
/// ```
pub fn format_ref_path(segments: &[String]) -> String {
    let mut out = String::from(REF_PREFIX);
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&escape_segment(segment));
    }
    out
}

/// Walk a document along parsed segments.
///
/// Every intermediate value must be an object; the terminal value may be
/// anything. The error names the segment that failed, so callers can report
/// exactly where a reference broke.
///
/// # Errors
///
/// - [`RefPathError::MissingSegment`] — a segment is absent from its object.
/// - [`RefPathError::NotAnObject`] — a segment landed on a non-object before
///   the path was exhausted.
///
/// # Example
///
/// ```
/// use json_strata_json_pointer::{walk, RefPathError};
/// use serde_json::json;
///
/// let doc = json!({"a": {"b": 5}});
/// assert_eq!(walk(&doc, &["a".into(), "b".into()]).unwrap(), &json!(5));
/// assert_eq!(
///     walk(&doc, &["a".into(), "b".into(), "c".into()]),
///     Err(RefPathError::NotAnObject("b".to_string()))
/// );
/// ```
pub fn walk<'a>(doc: &'a Value, segments: &[String]) -> Result<&'a Value, RefPathError> {
    let mut current = doc;
    let mut entered: Option<&str> = None;
    for segment in segments {
        let map = match current {
            Value::Object(map) => map,
            _ => {
                let at = entered.unwrap_or("");
                return Err(RefPathError::NotAnObject(at.to_string()));
            }
        };
        current = map
            .get(segment)
            .ok_or_else(|| RefPathError::MissingSegment(segment.clone()))?;
        entered = Some(segment);
    }
    Ok(current)
}

/// Parse and walk in one step.
///
/// # Example
///
/// ```
/// use json_strata_json_pointer::resolve_ref_path;
/// use serde_json::json;
///
/// let doc = json!({"a": {"b": 5}});
/// assert_eq!(resolve_ref_path(&doc, "#/a/b").unwrap(), &json!(5));
/// ```
pub fn resolve_ref_path<'a>(doc: &'a Value, path: &str) -> Result<&'a Value, RefPathError> {
    let segments = parse_ref_path(path)?;
    walk(doc, &segments)
}

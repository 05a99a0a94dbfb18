//! Reference resolution.
//!
//! A reference object is a JSON object carrying a `$ref` key whose value is
//! a `#/`-prefixed path (see the `json-strata-json-pointer` crate). It is
//! resolved against the raw document of the layer currently being applied,
//! never against the merged tree. When the target is itself a reference
//! object the chain is followed, bounded by the same depth guard the merge
//! engine uses, which also catches reference cycles.
//!
//! Resolution produces a value suitable for a property slot: scalars and
//! lists. A target that is missing, null, or a plain object leaves the slot
//! entry absent and the caller reports a broken-reference warning.

use serde_json::Value;
use thiserror::Error;

use json_strata_json_pointer::{resolve_ref_path, RefPathError};

use crate::MAX_DEPTH;

/// Why a reference failed to resolve. Only used to build warning text;
/// resolution failures are never caller-visible errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub(crate) enum ResolveError {
    #[error(transparent)]
    Path(#[from] RefPathError),
    #[error("reference chain exceeded the depth limit")]
    ChainTooDeep,
    #[error("reference target is {0}")]
    InvalidTarget(&'static str),
}

/// Extract the reference path if this value is a reference object.
pub(crate) fn as_reference(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.get("$ref").and_then(Value::as_str),
        _ => None,
    }
}

/// Resolve a reference, following chains, against one raw document.
pub(crate) fn resolve<'a>(doc: &'a Value, reference: &str) -> Result<&'a Value, ResolveError> {
    resolve_at(doc, reference, 1)
}

fn resolve_at<'a>(doc: &'a Value, reference: &str, depth: usize) -> Result<&'a Value, ResolveError> {
    if depth > MAX_DEPTH {
        return Err(ResolveError::ChainTooDeep);
    }
    let target = resolve_ref_path(doc, reference)?;
    if let Some(next) = as_reference(target) {
        return resolve_at(doc, next, depth + 1);
    }
    match target {
        Value::Null => Err(ResolveError::InvalidTarget("null")),
        Value::Object(_) => Err(ResolveError::InvalidTarget("an object")),
        _ => Ok(target),
    }
}

//! Layer records and engine state.

use serde_json::Value;

/// A registered configuration layer.
///
/// The registry keeps the last-*applied* document so that a later update can
/// be diffed against it instead of clearing and rebuilding. Direct property
/// writes through [`ConfigEngine::set`] deliberately do not write through to
/// `document`; they only raise `modified` until the layer is exported.
///
/// [`ConfigEngine::set`]: crate::ConfigEngine::set
#[derive(Debug, Clone)]
pub struct Layer {
    pub priority: i32,
    pub active: bool,
    /// The tree holds writes at this layer's priority that are not part of
    /// `document` yet.
    pub modified: bool,
    pub document: Value,
}

impl Layer {
    pub fn is_base(&self) -> bool {
        self.priority == 0
    }
}

/// Aggregate state of the engine, derived from the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigState {
    /// No layers registered, no schema.
    Empty,
    /// At least the base layer is registered.
    Loaded,
    /// Some layer carries unsaved property writes.
    Modified,
}

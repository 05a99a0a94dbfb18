//! Error and warning taxonomy.
//!
//! Only three conditions are caller-visible failures: a malformed document,
//! an unknown layer name, and a priority conflict (including base-layer
//! misuse). Everything else the merge engine encounters is a warning:
//! the offending key or subtree is skipped and the rest of the operation
//! proceeds. Warnings accumulate on the engine and are also emitted through
//! `tracing` as they happen.

use thiserror::Error;

/// Failures the caller must handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The document's top level is not a JSON object. The layer is not
    /// registered and the tree is untouched.
    #[error("config document must contain an object at the top level")]
    Document,
    /// An operation referenced a layer name that is not registered.
    #[error("layer {0:?} is not registered")]
    LayerNotFound(String),
    /// A layer with this name is already registered.
    #[error("layer {0:?} is already registered")]
    DuplicateLayer(String),
    /// No base layer is loaded yet; non-base layers need a schema to
    /// populate.
    #[error("a base layer (priority 0) must be registered first")]
    NoBaseLayer,
    /// Priority 0 is reserved for the base layer, or the requested priority
    /// is already held by another layer at registration time.
    #[error("priority {0} conflicts with layer {1:?}")]
    PriorityConflict(i32, String),
    /// The base layer cannot be removed while overriding layers are still
    /// registered; they would be left without a schema.
    #[error("the base layer cannot be removed while other layers are registered")]
    BaseLayerInUse,
}

/// Non-fatal diagnostics.
///
/// Each warning names the full dotted path of the property or subtree it
/// concerns. Collect them from [`ConfigEngine::take_warnings`].
///
/// [`ConfigEngine::take_warnings`]: crate::ConfigEngine::take_warnings
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// A layer tried to set a key that does not exist in the base config.
    #[error("property {path:?} does not exist in the base config")]
    UnknownKey { path: String },
    /// A key changed kind between scalar and object across layers.
    #[error("property {path:?} changed kind between scalar and object")]
    TypeMismatch { path: String },
    /// A `$ref` did not resolve; the slot entry stays absent.
    #[error("reference {reference:?} at {path:?} did not resolve: {detail}")]
    BrokenReference {
        path: String,
        reference: String,
        detail: String,
    },
    /// The nesting depth guard tripped; the subtree was abandoned.
    #[error("maximum nesting depth exceeded at {path:?}, subtree ignored")]
    RecursionLimit { path: String },
    /// JSON `null` has no slot representation; the key was skipped.
    #[error("null value for {path:?} ignored")]
    NullValue { path: String },
    /// A reprioritize move landed on an occupied priority and discarded the
    /// previous occupant's value.
    #[error("priority {priority} at {path:?} was already occupied, previous value discarded")]
    PriorityCollision { path: String, priority: i32 },
}

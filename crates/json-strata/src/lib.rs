//! Layered JSON configuration tree.
//!
//! A configuration is assembled from one or more JSON documents
//! ("layers"), each registered at a priority. Consumers read a single
//! merged view: for any key, the value from the highest-priority layer
//! that defines it wins. Layers can be updated in place, reprioritized,
//! deactivated, or removed at runtime, and every effective-value change is
//! reported to an [`ObjectBridge`].
//!
//! The base layer (priority 0) is registered first and fixes the schema:
//! the full set of keys and nested shapes. Other layers only populate
//! existing keys; unknown keys are skipped with a warning. Documents may
//! contain two directives: `$type` hints the object shape a node should
//! bind to, and `{"$ref": "#/path/to/key"}` stores an indirection resolved
//! against the raw document of the layer it appears in.
//!
//! # Example
//!
//! ```
//! use json_strata::ConfigEngine;
//! use serde_json::json;
//!
//! let mut engine = ConfigEngine::new();
//! engine.register("defaults", 0, json!({
//!     "editor": {"fontSize": 14, "fontFamily": "Helvetica"}
//! }))?;
//! engine.register("user", 1, json!({
//!     "editor": {"fontSize": 18}
//! }))?;
//!
//! assert_eq!(engine.get("editor.fontSize"), Some(json!(18)));
//! assert_eq!(engine.get("editor.fontFamily"), Some(json!("Helvetica")));
//!
//! engine.remove("user")?;
//! assert_eq!(engine.get("editor.fontSize"), Some(json!(14)));
//! # Ok::<(), json_strata::ConfigError>(())
//! ```

pub mod engine;
pub mod error;
pub mod layer;
pub mod node;
pub mod notify;
mod resolve;
pub mod tree;

pub use engine::ConfigEngine;
pub use error::{ConfigError, ConfigWarning};
pub use layer::{ConfigState, Layer};
pub use node::{Node, NodeId, PropertySlot};
pub use notify::{NullBridge, ObjectBridge, PropertyChange};
pub use tree::ConfigTree;

/// Maximum nesting depth for documents and reference chains. Deeper
/// subtrees are abandoned with a diagnostic instead of recursing further.
pub const MAX_DEPTH: usize = 10;

//! Change notification and the object-bridge seam.
//!
//! The merge core does not synthesize live objects itself; it reports
//! structural and value events to an [`ObjectBridge`] implementation.
//! Schema events fire bottom-up as nodes are finalized, so a parent is
//! never announced before its children exist. Value events fire either
//! synchronously (immediate mode) or once per dirty slot when a deferred
//! bracket ends.

use crate::node::NodeId;
use crate::tree::ConfigTree;

/// An effective-value change on one property slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyChange {
    /// Node owning the slot.
    pub node: NodeId,
    /// Index of the slot within the node's property list.
    pub property: usize,
    /// Full dotted path of the property, e.g. `"editor.fontSize"`.
    pub path: String,
}

/// Consumer of tree events. External embedders implement this to mirror the
/// tree as whatever live, observable surface their environment wants.
///
/// All methods have empty defaults, so an implementation only overrides
/// what it consumes.
pub trait ObjectBridge {
    /// A node's properties and children are finalized. Called bottom-up;
    /// children are always announced before their parent.
    fn on_schema_built(&mut self, node: NodeId, tree: &ConfigTree) {
        let _ = (node, tree);
    }

    /// A property's effective value changed. Fired per mutation in
    /// immediate mode, once per dirty slot on deferral flush. Sibling
    /// ordering is unspecified.
    fn on_property_changed(&mut self, change: &PropertyChange) {
        let _ = change;
    }

    /// A node is about to be discarded (tree clear or full reload).
    fn on_node_cleared(&mut self, node: NodeId) {
        let _ = node;
    }
}

/// Bridge that ignores every event. Installed by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBridge;

impl ObjectBridge for NullBridge {}

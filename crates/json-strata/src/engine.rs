//! The layer control surface.
//!
//! [`ConfigEngine`] owns the merge tree, the layer registry, and the object
//! bridge, and exposes the public operations: register, update (reload),
//! remove, reprioritize, activate/deactivate, rename, direct property
//! access, serialization, and the deferred-notification bracket.
//!
//! The base layer (priority 0) must be registered first; it defines the
//! schema every other layer populates. All operations run to completion on
//! the calling thread.

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{ConfigError, ConfigWarning};
use crate::layer::{ConfigState, Layer};
use crate::node::NodeId;
use crate::notify::{NullBridge, ObjectBridge, PropertyChange};
use crate::resolve::{as_reference, resolve};
use crate::tree::{ConfigTree, OpCtx};

pub struct ConfigEngine {
    tree: ConfigTree,
    layers: IndexMap<String, Layer>,
    bridge: Box<dyn ObjectBridge>,
    deferring: bool,
    warnings: Vec<ConfigWarning>,
}

impl Default for ConfigEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigEngine {
    pub fn new() -> Self {
        Self::with_bridge(Box::new(NullBridge))
    }

    /// Create an engine that reports schema and value events to `bridge`.
    pub fn with_bridge(bridge: Box<dyn ObjectBridge>) -> Self {
        Self {
            tree: ConfigTree::new(),
            layers: IndexMap::new(),
            bridge,
            deferring: false,
            warnings: Vec::new(),
        }
    }

    /// Replace the installed bridge. Events already dispatched are not
    /// replayed.
    pub fn set_bridge(&mut self, bridge: Box<dyn ObjectBridge>) {
        self.bridge = bridge;
    }

    /// Read access to the merge tree, e.g. for bridge implementations.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    // ---- layer lifecycle ---------------------------------------------------

    /// Register a layer and apply its document.
    ///
    /// Priority 0 registers the base layer, which must come first and
    /// defines the schema. Every other layer takes a unique non-zero
    /// priority and may only populate keys the schema already has.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        document: Value,
    ) -> Result<(), ConfigError> {
        let name = name.into();
        if !document.is_object() {
            return Err(ConfigError::Document);
        }
        if self.layers.contains_key(&name) {
            return Err(ConfigError::DuplicateLayer(name));
        }
        if let Some((existing, _)) = self.layers.iter().find(|(_, l)| l.priority == priority) {
            return Err(ConfigError::PriorityConflict(priority, existing.clone()));
        }
        if priority != 0 && !self.layers.values().any(Layer::is_base) {
            return Err(ConfigError::NoBaseLayer);
        }
        let mut changes = Vec::new();
        let mut built = Vec::new();
        {
            let mut ctx = OpCtx {
                deferring: self.deferring,
                changes: &mut changes,
                warnings: &mut self.warnings,
            };
            if priority == 0 {
                built = self.tree.build(&document, &mut ctx);
            } else {
                self.tree.update(&document, priority, &mut ctx);
            }
        }
        self.layers.insert(
            name,
            Layer {
                priority,
                active: true,
                modified: false,
                document,
            },
        );
        self.dispatch(built, changes);
        Ok(())
    }

    /// Replace a layer's entire content, e.g. after a reload from disk.
    ///
    /// For a non-base layer this is a diff against the previously applied
    /// document, so unchanged keys stay quiet. For the base layer the
    /// schema is rebuilt from scratch and every active layer's document is
    /// re-applied on top.
    pub fn update(&mut self, name: &str, document: Value) -> Result<(), ConfigError> {
        if !document.is_object() {
            return Err(ConfigError::Document);
        }
        let (priority, active, old_doc) = match self.layers.get(name) {
            Some(layer) => (layer.priority, layer.active, layer.document.clone()),
            None => return Err(ConfigError::LayerNotFound(name.to_string())),
        };
        if priority == 0 {
            return self.reload_base(name, document);
        }
        let mut changes = Vec::new();
        if active {
            let mut ctx = OpCtx {
                deferring: self.deferring,
                changes: &mut changes,
                warnings: &mut self.warnings,
            };
            self.tree.swap(&old_doc, &document, priority, &mut ctx);
        }
        if let Some(layer) = self.layers.get_mut(name) {
            layer.document = document;
            layer.modified = false;
        }
        self.dispatch(Vec::new(), changes);
        Ok(())
    }

    /// Unregister a layer, removing its contribution from the tree.
    ///
    /// The base layer can only be removed once it is the last layer left;
    /// removing it clears the schema.
    pub fn remove(&mut self, name: &str) -> Result<(), ConfigError> {
        let (priority, active) = match self.layers.get(name) {
            Some(layer) => (layer.priority, layer.active),
            None => return Err(ConfigError::LayerNotFound(name.to_string())),
        };
        if priority == 0 {
            if self.layers.len() > 1 {
                return Err(ConfigError::BaseLayerInUse);
            }
            self.clear_tree_nodes();
            self.layers.shift_remove(name);
            return Ok(());
        }
        let mut changes = Vec::new();
        if active {
            let mut ctx = OpCtx {
                deferring: self.deferring,
                changes: &mut changes,
                warnings: &mut self.warnings,
            };
            self.tree.unload(priority, &mut ctx);
        }
        self.layers.shift_remove(name);
        self.dispatch(Vec::new(), changes);
        Ok(())
    }

    /// Change a layer's priority.
    ///
    /// The base layer's priority is fixed, and no layer can move onto
    /// priority 0. Moving onto a priority another layer already holds is
    /// allowed but discards that layer's entries where they collide (last
    /// write wins); each collision is reported as a warning.
    pub fn set_priority(&mut self, name: &str, priority: i32) -> Result<(), ConfigError> {
        let (old, active) = match self.layers.get(name) {
            Some(layer) => (layer.priority, layer.active),
            None => return Err(ConfigError::LayerNotFound(name.to_string())),
        };
        if old == priority {
            return Ok(());
        }
        if old == 0 || priority == 0 {
            return Err(ConfigError::PriorityConflict(priority, name.to_string()));
        }
        if let Some((occupant, _)) = self
            .layers
            .iter()
            .find(|(n, l)| n.as_str() != name && l.priority == priority)
        {
            tracing::warn!(
                target: "json_strata",
                "layer {name:?} moving onto priority {priority} held by {occupant:?}"
            );
        }
        let mut changes = Vec::new();
        if active {
            let mut ctx = OpCtx {
                deferring: self.deferring,
                changes: &mut changes,
                warnings: &mut self.warnings,
            };
            self.tree.move_layer(old, priority, &mut ctx);
        }
        if let Some(layer) = self.layers.get_mut(name) {
            layer.priority = priority;
        }
        self.dispatch(Vec::new(), changes);
        Ok(())
    }

    /// Activate or deactivate a layer without unregistering it.
    ///
    /// Deactivating strips the layer's contribution; activating re-applies
    /// its stored document.
    pub fn set_active(&mut self, name: &str, active: bool) -> Result<(), ConfigError> {
        let (priority, current, document) = match self.layers.get(name) {
            Some(layer) => (layer.priority, layer.active, layer.document.clone()),
            None => return Err(ConfigError::LayerNotFound(name.to_string())),
        };
        if current == active {
            return Ok(());
        }
        let mut changes = Vec::new();
        {
            let mut ctx = OpCtx {
                deferring: self.deferring,
                changes: &mut changes,
                warnings: &mut self.warnings,
            };
            if active {
                self.tree.update(&document, priority, &mut ctx);
            } else {
                self.tree.unload(priority, &mut ctx);
            }
        }
        if let Some(layer) = self.layers.get_mut(name) {
            layer.active = active;
        }
        self.dispatch(Vec::new(), changes);
        Ok(())
    }

    /// Rename a registered layer.
    pub fn rename(&mut self, old: &str, new: impl Into<String>) -> Result<(), ConfigError> {
        let new = new.into();
        if !self.layers.contains_key(old) {
            return Err(ConfigError::LayerNotFound(old.to_string()));
        }
        if new == old {
            return Ok(());
        }
        if self.layers.contains_key(&new) {
            return Err(ConfigError::DuplicateLayer(new));
        }
        if let Some(layer) = self.layers.shift_remove(old) {
            self.layers.insert(new, layer);
        }
        Ok(())
    }

    /// Drop every layer and the schema.
    pub fn clear(&mut self) {
        self.clear_tree_nodes();
        self.layers.clear();
    }

    // ---- property access ---------------------------------------------------

    /// Merged effective value at a dot-separated path, or `None` when the
    /// property is absent.
    pub fn get(&self, path: &str) -> Option<Value> {
        self.tree.effective_value(path).cloned()
    }

    /// The value a specific layer holds for a path, independent of what is
    /// effective.
    pub fn get_at(&self, path: &str, layer: &str) -> Result<Option<Value>, ConfigError> {
        match self.layers.get(layer) {
            Some(l) => Ok(self.tree.value_at(path, l.priority).cloned()),
            None => Err(ConfigError::LayerNotFound(layer.to_string())),
        }
    }

    /// Write a property at a layer's priority.
    ///
    /// Schema checks apply as for any layer content: unknown paths and
    /// object values warn and are skipped. A reference object resolves
    /// against the layer's stored document. Successful writes raise the
    /// layer's `modified` flag; the stored document itself is untouched
    /// until the layer is exported.
    pub fn set(&mut self, path: &str, layer: &str, value: Value) -> Result<(), ConfigError> {
        let (priority, document) = match self.layers.get(layer) {
            Some(l) => (l.priority, l.document.clone()),
            None => return Err(ConfigError::LayerNotFound(layer.to_string())),
        };
        let mut changes = Vec::new();
        let mut wrote = false;
        {
            let mut ctx = OpCtx {
                deferring: self.deferring,
                changes: &mut changes,
                warnings: &mut self.warnings,
            };
            match &value {
                Value::Null => ctx.warn(ConfigWarning::NullValue {
                    path: path.to_string(),
                }),
                Value::Object(_) => match as_reference(&value) {
                    Some(reference) => match resolve(&document, reference) {
                        Ok(target) => {
                            let target = target.clone();
                            wrote = self.tree.write_property(
                                path,
                                priority,
                                target,
                                Some(reference.to_string()),
                                &mut ctx,
                            );
                            if !wrote {
                                ctx.warn(ConfigWarning::UnknownKey {
                                    path: path.to_string(),
                                });
                            }
                        }
                        Err(err) => ctx.warn(ConfigWarning::BrokenReference {
                            path: path.to_string(),
                            reference: reference.to_string(),
                            detail: err.to_string(),
                        }),
                    },
                    None => ctx.warn(ConfigWarning::TypeMismatch {
                        path: path.to_string(),
                    }),
                },
                _ => {
                    wrote = self
                        .tree
                        .write_property(path, priority, value.clone(), None, &mut ctx);
                    if !wrote {
                        ctx.warn(ConfigWarning::UnknownKey {
                            path: path.to_string(),
                        });
                    }
                }
            }
        }
        if wrote {
            if let Some(l) = self.layers.get_mut(layer) {
                l.modified = true;
            }
        }
        self.dispatch(Vec::new(), changes);
        Ok(())
    }

    // ---- serialization -----------------------------------------------------

    /// Export the merged effective view as a raw document.
    pub fn serialize(&self) -> Value {
        self.tree.serialize(None)
    }

    /// Export one layer's contribution as a raw document.
    pub fn serialize_layer(&self, name: &str) -> Result<Value, ConfigError> {
        match self.layers.get(name) {
            Some(layer) => Ok(self.tree.serialize(Some(layer.priority))),
            None => Err(ConfigError::LayerNotFound(name.to_string())),
        }
    }

    /// Mark a layer's unsaved writes as persisted, clearing `modified`.
    /// Callers do this after exporting with [`serialize_layer`] and writing
    /// the result wherever it lives.
    ///
    /// [`serialize_layer`]: ConfigEngine::serialize_layer
    pub fn mark_saved(&mut self, name: &str) -> Result<(), ConfigError> {
        match self.layers.get_mut(name) {
            Some(layer) => {
                layer.modified = false;
                Ok(())
            }
            None => Err(ConfigError::LayerNotFound(name.to_string())),
        }
    }

    // ---- notification bracket ----------------------------------------------

    /// Enter deferred-notification mode. Re-entering while already
    /// deferring is a no-op; the bracket is a flat flag, not a counter.
    pub fn begin_update(&mut self) {
        self.deferring = true;
    }

    /// Leave deferred mode and notify every dirty property exactly once.
    pub fn end_update(&mut self) {
        self.deferring = false;
        let changes = self.tree.collect_pending();
        self.dispatch(Vec::new(), changes);
    }

    pub fn is_deferring(&self) -> bool {
        self.deferring
    }

    // ---- introspection -----------------------------------------------------

    /// Registered layer names, in registration order.
    pub fn layers(&self) -> Vec<&str> {
        self.layers.keys().map(String::as_str).collect()
    }

    /// Names of layers currently contributing to the tree.
    pub fn active_layers(&self) -> Vec<&str> {
        self.layers
            .iter()
            .filter(|(_, l)| l.active)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    /// The registry record for a layer.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers.get(name)
    }

    /// Aggregate engine state, derived from the registry.
    pub fn state(&self) -> ConfigState {
        if self.layers.is_empty() {
            ConfigState::Empty
        } else if self.layers.values().any(|l| l.modified) {
            ConfigState::Modified
        } else {
            ConfigState::Loaded
        }
    }

    /// Drain the warnings accumulated since the last call.
    pub fn take_warnings(&mut self) -> Vec<ConfigWarning> {
        std::mem::take(&mut self.warnings)
    }

    // ---- internals ---------------------------------------------------------

    /// Rebuild the schema from a new base document and replay every other
    /// active layer on top, in ascending priority order. The replay runs
    /// under forced deferral so each affected slot notifies at most once.
    fn reload_base(&mut self, name: &str, document: Value) -> Result<(), ConfigError> {
        self.clear_tree_nodes();
        let built;
        {
            let mut discard = Vec::new();
            let mut ctx = OpCtx {
                deferring: true,
                changes: &mut discard,
                warnings: &mut self.warnings,
            };
            built = self.tree.build(&document, &mut ctx);
            let mut overlays: Vec<(i32, Value)> = self
                .layers
                .iter()
                .filter(|(n, l)| n.as_str() != name && l.active)
                .map(|(_, l)| (l.priority, l.document.clone()))
                .collect();
            overlays.sort_by_key(|(priority, _)| *priority);
            for (priority, doc) in &overlays {
                self.tree.update(doc, *priority, &mut ctx);
            }
            // A deactivated base keeps its schema but contributes no values
            let base_active = self.layers.get(name).map(|l| l.active).unwrap_or(true);
            if !base_active {
                self.tree.unload(0, &mut ctx);
            }
        }
        if let Some(layer) = self.layers.get_mut(name) {
            layer.document = document;
            layer.modified = false;
        }
        let changes = if self.deferring {
            Vec::new()
        } else {
            self.tree.collect_pending()
        };
        self.dispatch(built, changes);
        Ok(())
    }

    /// Announce and discard every node, leaving an empty root.
    fn clear_tree_nodes(&mut self) {
        if !self.tree.has_schema() {
            return;
        }
        let ids: Vec<NodeId> = self.tree.node_ids().collect();
        let mut bridge = std::mem::replace(&mut self.bridge, Box::new(NullBridge));
        for &id in ids.iter().rev() {
            bridge.on_node_cleared(id);
        }
        self.bridge = bridge;
        self.tree.reset();
    }

    fn dispatch(&mut self, built: Vec<NodeId>, changes: Vec<PropertyChange>) {
        if built.is_empty() && changes.is_empty() {
            return;
        }
        let mut bridge = std::mem::replace(&mut self.bridge, Box::new(NullBridge));
        for id in built {
            bridge.on_schema_built(id, &self.tree);
        }
        for change in &changes {
            bridge.on_property_changed(change);
        }
        self.bridge = bridge;
    }
}

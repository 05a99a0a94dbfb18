//! The layered merge tree and its algorithms.
//!
//! [`ConfigTree`] owns an arena of [`Node`]s; [`NodeId`] 0 is the root. The
//! base document *builds* the tree (fixing the schema), non-base layers
//! *update* it at their priority, reloads *swap* old content for new as a
//! diff, and unload/move strip or re-key one priority's contribution. All
//! input-driven recursion threads an explicit `depth` parameter checked
//! against [`MAX_DEPTH`], so malformed or adversarially nested documents
//! abandon one subtree instead of overflowing the stack.

use serde_json::{Map, Value};

use crate::error::ConfigWarning;
use crate::node::{Node, NodeId, PropertySlot};
use crate::notify::PropertyChange;
use crate::resolve::{as_reference, resolve};
use crate::MAX_DEPTH;

/// Per-operation plumbing: the deferral flag and the sinks for change
/// events and warnings.
pub(crate) struct OpCtx<'a> {
    pub deferring: bool,
    pub changes: &'a mut Vec<PropertyChange>,
    pub warnings: &'a mut Vec<ConfigWarning>,
}

impl OpCtx<'_> {
    pub(crate) fn warn(&mut self, warning: ConfigWarning) {
        tracing::warn!(target: "json_strata", "{warning}");
        self.warnings.push(warning);
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// An object value that is not a reference object.
fn as_plain_object(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(map) if as_reference(value).is_none() => Some(map),
        _ => None,
    }
}

/// Arena of configuration nodes.
#[derive(Debug)]
pub struct ConfigTree {
    nodes: Vec<Node>,
}

impl Default for ConfigTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new("", None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    fn alloc(&mut self, name: String, parent: NodeId) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::new(name, Some(parent)));
        id
    }

    /// Every node currently in the arena, root first.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    /// Whether a base document has built a schema.
    pub fn has_schema(&self) -> bool {
        self.nodes.len() > 1 || !self.nodes[0].properties.is_empty()
    }

    /// Drop every node and start over with an empty root.
    pub(crate) fn reset(&mut self) {
        self.nodes.clear();
        self.nodes.push(Node::new("", None));
    }

    /// Child of `id` with the given name.
    pub fn child_by_name(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.node(id)
            .children
            .iter()
            .copied()
            .find(|&child| self.node(child).name == name)
    }

    /// Resolve a dot-separated path to the node it names.
    pub fn find_node(&self, path: &str) -> Option<NodeId> {
        if path.is_empty() {
            return Some(self.root());
        }
        let mut current = self.root();
        for segment in path.split('.') {
            current = self.child_by_name(current, segment)?;
        }
        Some(current)
    }

    /// Resolve a dot-separated path to the slot it names: the last segment
    /// is the property key, everything before it names nested nodes.
    pub fn find_property(&self, path: &str) -> Option<(NodeId, usize)> {
        let (node_path, key) = match path.rsplit_once('.') {
            Some((node_path, key)) => (node_path, key),
            None => ("", path),
        };
        let id = self.find_node(node_path)?;
        let idx = self.node(id).index_of_property(key)?;
        Some((id, idx))
    }

    /// Merged effective value of the property at `path`.
    pub fn effective_value(&self, path: &str) -> Option<&Value> {
        let (id, idx) = self.find_property(path)?;
        self.node(id).properties[idx].effective()
    }

    /// Value the property at `path` holds at exactly this priority.
    pub fn value_at(&self, path: &str, priority: i32) -> Option<&Value> {
        let (id, idx) = self.find_property(path)?;
        self.node(id).properties[idx].value_at(priority)
    }

    /// Dotted path of a node, reconstructed through parent links.
    pub fn node_path(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if !node.name.is_empty() {
                parts.push(node.name.as_str());
            }
            current = node.parent;
        }
        parts.reverse();
        parts.join(".")
    }

    // ---- build (base layer) ------------------------------------------------

    /// Build the schema from the base document. Returns the built node ids
    /// bottom-up (children before parents) for schema announcements.
    pub(crate) fn build(&mut self, doc: &Value, ctx: &mut OpCtx<'_>) -> Vec<NodeId> {
        let mut built = Vec::new();
        if let Value::Object(obj) = doc {
            self.build_node(self.root(), obj, doc, "", 0, ctx, &mut built);
        }
        built
    }

    #[allow(clippy::too_many_arguments)]
    fn build_node(
        &mut self,
        id: NodeId,
        obj: &Map<String, Value>,
        doc_root: &Value,
        prefix: &str,
        depth: usize,
        ctx: &mut OpCtx<'_>,
        built: &mut Vec<NodeId>,
    ) {
        for (key, value) in obj {
            if key == "$type" {
                if let Some(hint) = value.as_str() {
                    self.node_mut(id).type_hint = Some(hint.to_string());
                } else {
                    tracing::warn!(target: "json_strata", "non-string $type at {prefix:?} ignored");
                }
                continue;
            }
            if key.starts_with('$') {
                tracing::debug!(target: "json_strata", "unknown directive {key:?} at {prefix:?} skipped");
                continue;
            }
            if let Some(reference) = as_reference(value) {
                let path = join_path(prefix, key);
                let mut slot = PropertySlot::new(key.clone());
                match resolve(doc_root, reference) {
                    Ok(target) => {
                        slot.write(0, target.clone(), Some(reference.to_string()));
                    }
                    Err(err) => ctx.warn(ConfigWarning::BrokenReference {
                        path,
                        reference: reference.to_string(),
                        detail: err.to_string(),
                    }),
                }
                self.node_mut(id).properties.push(slot);
                continue;
            }
            match value {
                Value::Null => ctx.warn(ConfigWarning::NullValue {
                    path: join_path(prefix, key),
                }),
                Value::Object(child_obj) => {
                    let path = join_path(prefix, key);
                    if depth >= MAX_DEPTH {
                        ctx.warn(ConfigWarning::RecursionLimit { path });
                        continue;
                    }
                    let child = self.alloc(key.clone(), id);
                    self.node_mut(id).children.push(child);
                    self.build_node(child, child_obj, doc_root, &path, depth + 1, ctx, built);
                }
                _ => {
                    let mut slot = PropertySlot::new(key.clone());
                    slot.write(0, value.clone(), None);
                    self.node_mut(id).properties.push(slot);
                }
            }
        }
        // Bottom-up: children were pushed during recursion above
        built.push(id);
    }

    // ---- update (non-base layer) -------------------------------------------

    /// Apply a partial document at a priority. The schema never grows:
    /// unknown keys warn and are skipped.
    pub(crate) fn update(&mut self, doc: &Value, priority: i32, ctx: &mut OpCtx<'_>) {
        if let Value::Object(obj) = doc {
            self.update_node(self.root(), obj, doc, priority, "", 0, ctx);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn update_node(
        &mut self,
        id: NodeId,
        obj: &Map<String, Value>,
        doc_root: &Value,
        priority: i32,
        prefix: &str,
        depth: usize,
        ctx: &mut OpCtx<'_>,
    ) {
        if depth > MAX_DEPTH {
            ctx.warn(ConfigWarning::RecursionLimit {
                path: prefix.to_string(),
            });
            return;
        }
        for (key, value) in obj {
            if key.starts_with('$') {
                continue;
            }
            let path = join_path(prefix, key);
            if let Some(reference) = as_reference(value) {
                match self.node(id).index_of_property(key) {
                    Some(idx) => {
                        self.write_reference(id, idx, priority, doc_root, reference, &path, ctx)
                    }
                    None => self.warn_unknown_or_mismatch(id, key, path, ctx),
                }
                continue;
            }
            match value {
                Value::Null => ctx.warn(ConfigWarning::NullValue { path }),
                Value::Object(child_obj) => match self.child_by_name(id, key) {
                    Some(child) => {
                        self.update_node(child, child_obj, doc_root, priority, &path, depth + 1, ctx)
                    }
                    None => {
                        if self.node(id).index_of_property(key).is_some() {
                            ctx.warn(ConfigWarning::TypeMismatch { path });
                        } else {
                            ctx.warn(ConfigWarning::UnknownKey { path });
                        }
                    }
                },
                _ => match self.node(id).index_of_property(key) {
                    Some(idx) => {
                        self.write_slot(id, idx, priority, value.clone(), None, &path, ctx)
                    }
                    None => self.warn_unknown_or_mismatch(id, key, path, ctx),
                },
            }
        }
    }

    fn warn_unknown_or_mismatch(&mut self, id: NodeId, key: &str, path: String, ctx: &mut OpCtx<'_>) {
        if self.child_by_name(id, key).is_some() {
            ctx.warn(ConfigWarning::TypeMismatch { path });
        } else {
            ctx.warn(ConfigWarning::UnknownKey { path });
        }
    }

    // ---- swap (layer reload) -----------------------------------------------

    /// Replace a layer's entire content at a priority by diffing the old
    /// document against the new one, so a reload fires only the
    /// notifications the content change warrants.
    pub(crate) fn swap(
        &mut self,
        old_doc: &Value,
        new_doc: &Value,
        priority: i32,
        ctx: &mut OpCtx<'_>,
    ) {
        let empty = Map::new();
        let old_obj = old_doc.as_object().unwrap_or(&empty);
        if let Value::Object(new_obj) = new_doc {
            self.swap_node(self.root(), old_obj, new_obj, new_doc, priority, "", 0, ctx);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn swap_node(
        &mut self,
        id: NodeId,
        old_obj: &Map<String, Value>,
        new_obj: &Map<String, Value>,
        new_root: &Value,
        priority: i32,
        prefix: &str,
        depth: usize,
        ctx: &mut OpCtx<'_>,
    ) {
        if depth > MAX_DEPTH {
            ctx.warn(ConfigWarning::RecursionLimit {
                path: prefix.to_string(),
            });
            return;
        }
        for idx in 0..self.node(id).properties.len() {
            let key = self.node(id).properties[idx].key.clone();
            let path = join_path(prefix, &key);
            match new_obj.get(&key) {
                None => {
                    if old_obj.contains_key(&key) {
                        self.remove_slot_entry(id, idx, priority, &path, ctx);
                    }
                }
                Some(Value::Null) => {
                    ctx.warn(ConfigWarning::NullValue { path: path.clone() });
                    self.remove_slot_entry(id, idx, priority, &path, ctx);
                }
                Some(value) => {
                    if let Some(reference) = as_reference(value) {
                        self.write_reference(id, idx, priority, new_root, reference, &path, ctx);
                    } else if value.is_object() {
                        // Scalar became an object in this layer: drop the
                        // override at this priority rather than convert
                        ctx.warn(ConfigWarning::TypeMismatch { path: path.clone() });
                        self.remove_slot_entry(id, idx, priority, &path, ctx);
                    } else {
                        self.write_slot(id, idx, priority, value.clone(), None, &path, ctx);
                    }
                }
            }
        }
        let empty = Map::new();
        for child in self.node(id).children.clone() {
            let name = self.node(child).name.clone();
            let path = join_path(prefix, &name);
            match new_obj.get(&name) {
                Some(value) => match as_plain_object(value) {
                    Some(new_child_obj) => {
                        let old_child_obj = old_obj
                            .get(&name)
                            .and_then(as_plain_object)
                            .unwrap_or(&empty);
                        self.swap_node(
                            child,
                            old_child_obj,
                            new_child_obj,
                            new_root,
                            priority,
                            &path,
                            depth + 1,
                            ctx,
                        );
                    }
                    None => {
                        ctx.warn(ConfigWarning::TypeMismatch { path: path.clone() });
                        self.unload_node(child, priority, &path, ctx);
                    }
                },
                None => {
                    if old_obj.contains_key(&name) {
                        self.unload_node(child, priority, &path, ctx);
                    }
                }
            }
        }
        for key in new_obj.keys() {
            if key.starts_with('$') {
                continue;
            }
            if self.node(id).index_of_property(key).is_none()
                && self.child_by_name(id, key).is_none()
            {
                ctx.warn(ConfigWarning::UnknownKey {
                    path: join_path(prefix, key),
                });
            }
        }
    }

    // ---- unload ------------------------------------------------------------

    /// Strip one priority's contribution from the whole tree.
    pub(crate) fn unload(&mut self, priority: i32, ctx: &mut OpCtx<'_>) {
        self.unload_node(self.root(), priority, "", ctx);
    }

    fn unload_node(&mut self, id: NodeId, priority: i32, prefix: &str, ctx: &mut OpCtx<'_>) {
        for idx in 0..self.node(id).properties.len() {
            let key = self.node(id).properties[idx].key.clone();
            let path = join_path(prefix, &key);
            self.remove_slot_entry(id, idx, priority, &path, ctx);
        }
        for child in self.node(id).children.clone() {
            let name = self.node(child).name.clone();
            let path = join_path(prefix, &name);
            self.unload_node(child, priority, &path, ctx);
        }
    }

    // ---- reprioritize ------------------------------------------------------

    /// Move one priority's entries to another priority across the tree.
    /// Collisions discard the occupant (last write wins) with a warning.
    pub(crate) fn move_layer(&mut self, from: i32, to: i32, ctx: &mut OpCtx<'_>) {
        if from == to {
            return;
        }
        self.move_node(self.root(), from, to, "", 0, ctx);
    }

    fn move_node(
        &mut self,
        id: NodeId,
        from: i32,
        to: i32,
        prefix: &str,
        depth: usize,
        ctx: &mut OpCtx<'_>,
    ) {
        if depth > MAX_DEPTH {
            ctx.warn(ConfigWarning::RecursionLimit {
                path: prefix.to_string(),
            });
            return;
        }
        for idx in 0..self.node(id).properties.len() {
            let key = self.node(id).properties[idx].key.clone();
            let path = join_path(prefix, &key);
            let outcome = self.nodes[id.index()].properties[idx].move_priority(from, to);
            if !outcome.moved {
                continue;
            }
            if outcome.collided {
                ctx.warn(ConfigWarning::PriorityCollision {
                    path: path.clone(),
                    priority: to,
                });
            }
            if outcome.notify {
                self.note_change(id, idx, &path, ctx);
            }
        }
        for child in self.node(id).children.clone() {
            let name = self.node(child).name.clone();
            let path = join_path(prefix, &name);
            self.move_node(child, from, to, &path, depth + 1, ctx);
        }
    }

    // ---- direct writes -----------------------------------------------------

    /// Write one property at a priority. Returns `false` when the path does
    /// not name a slot in the schema.
    pub(crate) fn write_property(
        &mut self,
        path: &str,
        priority: i32,
        value: Value,
        reference: Option<String>,
        ctx: &mut OpCtx<'_>,
    ) -> bool {
        match self.find_property(path) {
            Some((id, idx)) => {
                self.write_slot(id, idx, priority, value, reference, path, ctx);
                true
            }
            None => false,
        }
    }

    // ---- serialization -----------------------------------------------------

    /// Export the tree as a raw document: the merged effective view when
    /// `priority` is `None`, otherwise one priority's contribution
    /// (reference entries round-trip back to `$ref` objects). Nested objects
    /// appear only when non-empty.
    pub fn serialize(&self, priority: Option<i32>) -> Value {
        Value::Object(self.serialize_node(self.root(), priority))
    }

    fn serialize_node(&self, id: NodeId, priority: Option<i32>) -> Map<String, Value> {
        let mut out = Map::new();
        let node = self.node(id);
        if priority == Some(0) {
            if let Some(hint) = &node.type_hint {
                out.insert("$type".to_string(), Value::String(hint.clone()));
            }
        }
        for slot in &node.properties {
            match priority {
                None => {
                    if let Some(value) = slot.effective() {
                        out.insert(slot.key.clone(), value.clone());
                    }
                }
                Some(p) => {
                    if let Some(reference) = slot.ref_at(p) {
                        let mut ref_obj = Map::new();
                        ref_obj.insert("$ref".to_string(), Value::String(reference.to_string()));
                        out.insert(slot.key.clone(), Value::Object(ref_obj));
                    } else if let Some(value) = slot.value_at(p) {
                        out.insert(slot.key.clone(), value.clone());
                    }
                }
            }
        }
        for &child in &node.children {
            let child_obj = self.serialize_node(child, priority);
            if !child_obj.is_empty() {
                out.insert(self.node(child).name.clone(), Value::Object(child_obj));
            }
        }
        out
    }

    // ---- deferred notifications --------------------------------------------

    /// Walk the tree, clear every pending flag, and return one change per
    /// dirty slot.
    pub(crate) fn collect_pending(&mut self) -> Vec<PropertyChange> {
        let mut out = Vec::new();
        self.collect_pending_node(self.root(), "", &mut out);
        out
    }

    fn collect_pending_node(&mut self, id: NodeId, prefix: &str, out: &mut Vec<PropertyChange>) {
        for idx in 0..self.node(id).properties.len() {
            if self.nodes[id.index()].properties[idx].take_pending() {
                let key = self.node(id).properties[idx].key.clone();
                out.push(PropertyChange {
                    node: id,
                    property: idx,
                    path: join_path(prefix, &key),
                });
            }
        }
        for child in self.node(id).children.clone() {
            let name = self.node(child).name.clone();
            let path = join_path(prefix, &name);
            self.collect_pending_node(child, &path, out);
        }
    }

    // ---- slot plumbing -----------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn write_slot(
        &mut self,
        id: NodeId,
        idx: usize,
        priority: i32,
        value: Value,
        reference: Option<String>,
        path: &str,
        ctx: &mut OpCtx<'_>,
    ) {
        let changed = self.nodes[id.index()].properties[idx].write(priority, value, reference);
        if changed {
            self.note_change(id, idx, path, ctx);
        }
    }

    fn remove_slot_entry(
        &mut self,
        id: NodeId,
        idx: usize,
        priority: i32,
        path: &str,
        ctx: &mut OpCtx<'_>,
    ) {
        let changed = self.nodes[id.index()].properties[idx].remove(priority);
        if changed {
            self.note_change(id, idx, path, ctx);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_reference(
        &mut self,
        id: NodeId,
        idx: usize,
        priority: i32,
        doc_root: &Value,
        reference: &str,
        path: &str,
        ctx: &mut OpCtx<'_>,
    ) {
        match resolve(doc_root, reference) {
            Ok(target) => {
                let target = target.clone();
                self.write_slot(id, idx, priority, target, Some(reference.to_string()), path, ctx);
            }
            Err(err) => {
                ctx.warn(ConfigWarning::BrokenReference {
                    path: path.to_string(),
                    reference: reference.to_string(),
                    detail: err.to_string(),
                });
                self.remove_slot_entry(id, idx, priority, path, ctx);
            }
        }
    }

    fn note_change(&mut self, id: NodeId, idx: usize, path: &str, ctx: &mut OpCtx<'_>) {
        if ctx.deferring {
            self.nodes[id.index()].properties[idx].mark_pending();
        } else {
            ctx.changes.push(PropertyChange {
                node: id,
                property: idx,
                path: path.to_string(),
            });
        }
    }
}

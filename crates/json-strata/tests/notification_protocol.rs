//! Bridge event protocol: immediate vs deferred notification, schema
//! announcement order, and notification minimality.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use json_strata::{ConfigEngine, ConfigTree, NodeId, ObjectBridge, PropertyChange};
use serde_json::json;

/// Shared log of every bridge event, inspectable from the test while the
/// engine owns the bridge itself.
#[derive(Default, Clone)]
struct EventLog {
    changed: Rc<RefCell<Vec<String>>>,
    built: Rc<RefCell<Vec<String>>>,
    cleared: Rc<RefCell<usize>>,
}

impl EventLog {
    fn changed_paths(&self) -> Vec<String> {
        self.changed.borrow().clone()
    }

    fn changed_set(&self) -> BTreeSet<String> {
        self.changed.borrow().iter().cloned().collect()
    }

    fn drain_changed(&self) -> Vec<String> {
        std::mem::take(&mut *self.changed.borrow_mut())
    }
}

struct Recorder {
    log: EventLog,
}

impl ObjectBridge for Recorder {
    fn on_schema_built(&mut self, node: NodeId, tree: &ConfigTree) {
        self.log.built.borrow_mut().push(tree.node_path(node));
    }

    fn on_property_changed(&mut self, change: &PropertyChange) {
        self.log.changed.borrow_mut().push(change.path.clone());
    }

    fn on_node_cleared(&mut self, _node: NodeId) {
        *self.log.cleared.borrow_mut() += 1;
    }
}

fn recording_engine() -> (ConfigEngine, EventLog) {
    let log = EventLog::default();
    let engine = ConfigEngine::with_bridge(Box::new(Recorder { log: log.clone() }));
    (engine, log)
}

fn base_doc() -> serde_json::Value {
    json!({
        "title": "default",
        "editor": {"fontSize": 14, "colors": {"background": "#fff"}}
    })
}

#[test]
fn schema_is_announced_bottom_up() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();

    let built = log.built.borrow().clone();
    let pos = |p: &str| built.iter().position(|b| b == p).unwrap();
    assert!(pos("editor.colors") < pos("editor"));
    // The root (empty path) comes last
    assert_eq!(built.last().map(String::as_str), Some(""));
    // Building the schema does not fire per-property changes
    assert!(log.changed_paths().is_empty());
}

#[test]
fn immediate_mode_fires_synchronously_per_mutation() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();

    engine
        .register("user", 1, json!({"editor": {"fontSize": 18}}))
        .unwrap();
    assert_eq!(log.drain_changed(), vec!["editor.fontSize"]);

    engine.set("title", "user", json!("t")).unwrap();
    assert_eq!(log.drain_changed(), vec!["title"]);
}

#[test]
fn writes_below_the_effective_priority_are_silent() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    engine
        .register("high", 5, json!({"editor": {"fontSize": 30}}))
        .unwrap();
    log.drain_changed();

    engine
        .register("low", 1, json!({"editor": {"fontSize": 20}}))
        .unwrap();
    assert!(log.changed_paths().is_empty());
    assert_eq!(engine.get("editor.fontSize"), Some(json!(30)));
}

#[test]
fn reapplying_an_identical_document_notifies_nothing() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    let doc = json!({"title": "custom", "editor": {"fontSize": 20}});
    engine.register("user", 1, doc.clone()).unwrap();
    log.drain_changed();

    engine.update("user", doc).unwrap();
    assert!(log.changed_paths().is_empty());
}

#[test]
fn deferred_batch_matches_immediate_set_deduplicated() {
    let mutations = |engine: &mut ConfigEngine| {
        engine.set("title", "user", json!("a")).unwrap();
        engine.set("title", "user", json!("b")).unwrap();
        engine.set("editor.fontSize", "user", json!(33)).unwrap();
        engine
            .update("user", json!({"editor": {"fontSize": 35}}))
            .unwrap();
    };

    let (mut immediate, immediate_log) = recording_engine();
    immediate.register("base", 0, base_doc()).unwrap();
    immediate.register("user", 1, json!({})).unwrap();
    immediate_log.drain_changed();
    mutations(&mut immediate);

    let (mut deferred, deferred_log) = recording_engine();
    deferred.register("base", 0, base_doc()).unwrap();
    deferred.register("user", 1, json!({})).unwrap();
    deferred_log.drain_changed();
    deferred.begin_update();
    mutations(&mut deferred);
    assert!(deferred_log.changed_paths().is_empty());
    deferred.end_update();

    // Same affected properties; the deferred side fired exactly once each
    assert_eq!(deferred_log.changed_set(), immediate_log.changed_set());
    let deferred_paths = deferred_log.changed_paths();
    assert_eq!(
        deferred_paths.len(),
        deferred_paths.iter().collect::<BTreeSet<_>>().len()
    );
    // Both engines converged on the same values
    assert_eq!(immediate.serialize(), deferred.serialize());
}

#[test]
fn nested_begin_update_is_flat() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    engine.register("user", 1, json!({})).unwrap();

    engine.begin_update();
    engine.begin_update();
    engine.set("title", "user", json!("x")).unwrap();
    assert!(log.changed_paths().is_empty());
    // The first end flushes; the bracket is not a counter
    engine.end_update();
    assert_eq!(log.drain_changed(), vec!["title"]);
    engine.end_update();
    assert!(log.changed_paths().is_empty());
}

#[test]
fn reprioritize_round_trip_fires_symmetric_notifications() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, json!({"k": "base"})).unwrap();
    engine.register("a", 1, json!({"k": "from a"})).unwrap();
    engine.register("b", 2, json!({"k": "from b"})).unwrap();
    log.drain_changed();

    engine.set_priority("a", 3).unwrap();
    let forward = log.drain_changed();
    assert_eq!(forward, vec!["k"]);
    assert_eq!(engine.get("k"), Some(json!("from a")));

    engine.set_priority("a", 1).unwrap();
    let back = log.drain_changed();
    assert_eq!(back, forward);
    assert_eq!(engine.get("k"), Some(json!("from b")));
}

#[test]
fn moves_entirely_below_the_maximum_are_silent() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, json!({"k": "base"})).unwrap();
    engine.register("low", 1, json!({"k": "low"})).unwrap();
    engine.register("top", 5, json!({"k": "top"})).unwrap();
    log.drain_changed();

    // Neither the old nor the new priority touches the slot maximum
    engine.set_priority("low", 2).unwrap();
    engine.set_priority("low", 1).unwrap();
    assert!(log.changed_paths().is_empty());
    assert_eq!(engine.get("k"), Some(json!("top")));
}

#[test]
fn unload_notifies_only_properties_that_revert() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    engine
        .register("user", 1, json!({"title": "custom"}))
        .unwrap();
    engine
        .register("high", 2, json!({"title": "top"}))
        .unwrap();
    log.drain_changed();

    // The user layer is shadowed by "high": removing it changes nothing
    engine.remove("user").unwrap();
    assert!(log.changed_paths().is_empty());

    engine.remove("high").unwrap();
    assert_eq!(log.drain_changed(), vec!["title"]);
    assert_eq!(engine.get("title"), Some(json!("default")));
}

#[test]
fn deferred_deactivate_and_activate_cancel_out_per_slot() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    engine
        .register("user", 1, json!({"title": "custom"}))
        .unwrap();
    log.drain_changed();

    engine.begin_update();
    engine.set_active("user", false).unwrap();
    engine.set_active("user", true).unwrap();
    engine.end_update();

    // The slot was dirtied and flushed once, ending at its original value
    assert_eq!(log.drain_changed(), vec!["title"]);
    assert_eq!(engine.get("title"), Some(json!("custom")));
}

#[test]
fn clear_announces_discarded_nodes() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    let node_count = engine.tree().node_ids().count();

    engine.clear();
    assert_eq!(*log.cleared.borrow(), node_count);
}

#[test]
fn base_reload_reannounces_schema() {
    let (mut engine, log) = recording_engine();
    engine.register("base", 0, base_doc()).unwrap();
    let first_announcements = log.built.borrow().len();

    engine
        .update("base", json!({"title": "v2"}))
        .unwrap();
    assert!(*log.cleared.borrow() > 0);
    assert!(log.built.borrow().len() > first_announcements);
    assert_eq!(engine.get("title"), Some(json!("v2")));
}

//! Integration Tests for the Reactivity Engine
//!
//! These tests drive the public surface the rest of the framework uses:
//! `wrap`/`unwrap`/`is_wrapped` plus `watch_effect`, with writes flowing
//! through observing wrappers and reruns crossing the flush boundary.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use trellis_core::reactive::{
    is_wrapped, unwrap, NodeRef, ReactiveRuntime, Value,
};

/// Wrapping is idempotent and identity-stable; unwrap returns the raw node.
#[test]
fn wrap_identity_contract() {
    let rt = ReactiveRuntime::new();
    let raw = NodeRef::record();
    let value = Value::Node(raw.clone());

    let wrapped = rt.wrap(value.clone());
    let wrapped_again = rt.wrap(wrapped.clone());
    let independent = rt.wrap(value.clone());

    assert!(is_wrapped(&wrapped));
    assert!(!is_wrapped(&value));

    let w1 = wrapped.as_node().unwrap();
    let w2 = wrapped_again.as_node().unwrap();
    let w3 = independent.as_node().unwrap();
    assert!(NodeRef::ptr_eq(w1, w2), "wrap(wrap(x)) == wrap(x)");
    assert!(NodeRef::ptr_eq(w1, w3), "wrap(x) == wrap(x)");

    let back = unwrap(&wrapped);
    assert!(NodeRef::ptr_eq(back.as_node().unwrap(), &raw));

    // A wrapper and its raw node are the same value to change detection.
    assert_eq!(wrapped, value);
}

/// Writing a tracked field causes exactly one rerun, after the flush
/// boundary, observing the new value.
#[test]
fn write_causes_exactly_one_deferred_rerun() {
    let rt = ReactiveRuntime::new();
    let state = rt.wrap_node(&NodeRef::record());
    state.set("count", 0);

    let runs = Arc::new(AtomicI32::new(0));
    let seen = Arc::new(AtomicI64::new(-1));
    let (runs_in, seen_in) = (runs.clone(), seen.clone());
    let reader = state.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        seen_in.store(reader.get("count").as_int().unwrap_or(-1), Ordering::SeqCst);
    });

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    state.set("count", 1);
    // Nothing reruns before the boundary.
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    // An empty flush does nothing.
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Dependencies follow what the latest run actually read: once the effect
/// stops reading `a`, writes to `a` no longer reach it.
#[test]
fn conditional_dependencies_are_cleaned_up() {
    let rt = ReactiveRuntime::new();
    let state = rt.wrap_node(&NodeRef::record());
    state.set("flag", true);
    state.set("a", 0);

    let runs = Arc::new(AtomicI32::new(0));
    let runs_in = runs.clone();
    let reader = state.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        if reader.get("flag").as_bool() == Some(true) {
            let _ = reader.get("a");
        }
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("flag", false);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // The previous run did not read `a`; this write must not rerun it.
    state.set("a", 99);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    state.set("flag", true);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 3);

    // Reading `a` again resubscribed.
    state.set("a", 100);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 4);
}

/// A structural list edit decomposes into several raw writes, but the burst
/// coalesces into one rerun that observes final, consistent state.
#[test]
fn splice_burst_coalesces_into_one_rerun() {
    let rt = ReactiveRuntime::new();
    let list = rt.wrap_node(&NodeRef::list(vec![
        Value::from(0),
        Value::from(1),
        Value::from(2),
    ]));

    let runs = Arc::new(AtomicI32::new(0));
    let len_seen = Arc::new(AtomicUsize::new(0));
    let first_seen = Arc::new(AtomicI64::new(-1));
    let (runs_in, len_in, first_in) = (runs.clone(), len_seen.clone(), first_seen.clone());
    let reader = list.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        let items = reader.items();
        len_in.store(items.len(), Ordering::SeqCst);
        first_in.store(
            items.first().and_then(|v| v.as_int()).unwrap_or(-1),
            Ordering::SeqCst,
        );
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(len_seen.load(Ordering::SeqCst), 3);

    // Remove the first element: index shifts plus a length write.
    let removed = list.splice(0, 1, vec![]);
    assert_eq!(removed[0].as_int(), Some(0));

    rt.flush();
    assert_eq!(
        runs.load(Ordering::SeqCst),
        2,
        "the whole burst reruns the effect exactly once"
    );
    assert_eq!(len_seen.load(Ordering::SeqCst), 2);
    assert_eq!(first_seen.load(Ordering::SeqCst), 1);
}

/// Removing the tail of a list reaches effects that read the removed index:
/// truncation fires the dropped index facets, not just the length.
#[test]
fn splice_of_last_element_reaches_index_dependents() {
    let rt = ReactiveRuntime::new();
    let list = rt.wrap_node(&NodeRef::list(vec![
        Value::from(1),
        Value::from(2),
        Value::from(3),
    ]));

    let runs = Arc::new(AtomicI32::new(0));
    let seen = Arc::new(AtomicI64::new(-2));
    let (runs_in, seen_in) = (runs.clone(), seen.clone());
    let reader = list.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        seen_in.store(reader.get(2usize).as_int().unwrap_or(-1), Ordering::SeqCst);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(seen.load(Ordering::SeqCst), 3);

    // Deletes only trailing elements: no index shifts, just the truncation.
    let removed = list.splice(2, 1, vec![]);
    assert_eq!(removed[0].as_int(), Some(3));

    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(seen.load(Ordering::SeqCst), -1, "removed index now reads Null");
}

#[test]
fn pop_reaches_last_index_dependents() {
    let rt = ReactiveRuntime::new();
    let list = rt.wrap_node(&NodeRef::list(vec![Value::from(1), Value::from(2)]));

    let runs = Arc::new(AtomicI32::new(0));
    let runs_in = runs.clone();
    let reader = list.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        let _ = reader.get(1usize);
    });
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    assert_eq!(list.pop().as_int(), Some(2));
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(list.len(), 1);
}

/// Stopping an effect silences it, including a run already queued.
#[test]
fn stopped_effect_never_reruns() {
    let rt = ReactiveRuntime::new();
    let state = rt.wrap_node(&NodeRef::record());
    state.set("n", 0);

    let runs = Arc::new(AtomicI32::new(0));
    let runs_in = runs.clone();
    let reader = state.clone();
    let handle = rt.watch_effect(move || {
        let _ = reader.get("n");
        runs_in.fetch_add(1, Ordering::SeqCst);
    });

    // Queue a rerun, then stop before the boundary.
    state.set("n", 1);
    handle.stop();
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    state.set("n", 2);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // Double-dispose is a no-op.
    handle.stop();
}

/// Map built-ins called through a wrapped instance succeed (the receiver
/// mismatch is recovered internally) and trigger size/iteration dependents.
#[test]
fn wrapped_map_builtins_trigger_size_dependents() {
    let rt = ReactiveRuntime::new();
    let map = rt.wrap_node(&NodeRef::map());

    let sizes = Arc::new(AtomicUsize::new(usize::MAX));
    let runs = Arc::new(AtomicI32::new(0));
    let (sizes_in, runs_in) = (sizes.clone(), runs.clone());
    let reader = map.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        sizes_in.store(reader.len(), Ordering::SeqCst);
    });
    assert_eq!(sizes.load(Ordering::SeqCst), 0);

    map.insert_entry("a", 1).expect("insert through wrapper succeeds");
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(sizes.load(Ordering::SeqCst), 1);

    // Overwriting with the same value changes nothing.
    map.insert_entry("a", 1).unwrap();
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert!(map.remove_entry("a").unwrap());
    rt.flush();
    assert_eq!(sizes.load(Ordering::SeqCst), 0);
}

/// An effect reading one map entry reruns on that entry's change but not on
/// unrelated entries.
#[test]
fn map_entry_dependencies_are_per_key() {
    let rt = ReactiveRuntime::new();
    let map = rt.wrap_node(&NodeRef::map());
    map.insert_entry("a", 1).unwrap();
    map.insert_entry("b", 2).unwrap();

    let runs = Arc::new(AtomicI32::new(0));
    let runs_in = runs.clone();
    let reader = map.clone();
    let _handle = rt.watch_effect(move || {
        let _ = reader.get("a");
        runs_in.fetch_add(1, Ordering::SeqCst);
    });

    map.insert_entry("b", 3).unwrap();
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 1, "unrelated entry");

    map.insert_entry("a", 10).unwrap();
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

/// Set membership mutations rerun iterating effects on net change only.
#[test]
fn set_iteration_reruns_on_net_change() {
    let rt = ReactiveRuntime::new();
    let set = rt.wrap_node(&NodeRef::keyed_set());

    let runs = Arc::new(AtomicI32::new(0));
    let runs_in = runs.clone();
    let reader = set.clone();
    let _handle = rt.watch_effect(move || {
        let _ = reader.keys();
        runs_in.fetch_add(1, Ordering::SeqCst);
    });

    set.add_member("x").unwrap();
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Already present: no net change, no rerun.
    set.add_member("x").unwrap();
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    assert!(set.remove_member("x").unwrap());
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 3);
}

/// Nested structures wrap lazily on read, and the nested wrapper tracks
/// independently of its parent.
#[test]
fn nested_graphs_track_independently() {
    let rt = ReactiveRuntime::new();
    let inner = NodeRef::record();
    inner.set("b", 1);
    let raw = NodeRef::record();
    raw.set("a", Value::Node(inner));

    let state = rt.wrap_node(&raw);
    let a = state.get("a");
    let a_node = a.as_node().expect("nested read yields a node").clone();
    assert!(a_node.is_wrapper(), "nested reads come back wrapped");

    let seen = Arc::new(AtomicI64::new(-1));
    let runs = Arc::new(AtomicI32::new(0));
    let (seen_in, runs_in) = (seen.clone(), runs.clone());
    let reader = a_node.clone();
    let _handle = rt.watch_effect(move || {
        runs_in.fetch_add(1, Ordering::SeqCst);
        seen_in.store(reader.get("b").as_int().unwrap_or(-1), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    a_node.set("b", 2);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    // A write to the parent does not reach an effect that only reads the
    // nested node.
    state.set("c", 5);
    rt.flush();
    assert_eq!(runs.load(Ordering::SeqCst), 2);

    // Storing the wrapper back never leaks it into raw storage.
    state.set("a2", Value::Node(a_node));
    let stored = raw.get("a2");
    assert!(!stored.as_node().unwrap().is_wrapper());
}

/// An effect that writes derived state cascades into dependents within the
/// same flush.
#[test]
fn effect_writes_cascade_within_one_flush() {
    let rt = ReactiveRuntime::new();
    let state = rt.wrap_node(&NodeRef::record());
    state.set("n", 1);

    let writer_state = state.clone();
    let _double = rt.watch_effect(move || {
        let n = writer_state.get("n").as_int().unwrap_or(0);
        writer_state.set("double", n * 2);
    });

    let seen = Arc::new(AtomicI64::new(-1));
    let seen_in = seen.clone();
    let reader = state.clone();
    let _consumer = rt.watch_effect(move || {
        seen_in.store(reader.get("double").as_int().unwrap_or(-1), Ordering::SeqCst);
    });
    assert_eq!(seen.load(Ordering::SeqCst), 2);

    state.set("n", 3);
    rt.flush();
    assert_eq!(seen.load(Ordering::SeqCst), 6);
}

/// Component state built from JSON flows through the engine end to end.
#[test]
fn json_state_drives_a_render_effect() {
    let rt = ReactiveRuntime::new();
    let value = Value::from_json(serde_json::json!({
        "todos": [
            { "title": "write tests", "done": false },
            { "title": "ship", "done": false }
        ]
    }));
    let state = rt.wrap(value);
    let state = state.as_node().unwrap().clone();

    let open = Arc::new(AtomicUsize::new(usize::MAX));
    let open_in = open.clone();
    let reader = state.clone();
    let _render = rt.watch_effect(move || {
        let todos = reader.get("todos");
        let todos = todos.as_node().expect("todos is a list");
        let remaining = todos
            .items()
            .iter()
            .filter_map(|t| t.as_node().map(|n| n.get("done")))
            .filter(|done| done.as_bool() == Some(false))
            .count();
        open_in.store(remaining, Ordering::SeqCst);
    });
    assert_eq!(open.load(Ordering::SeqCst), 2);

    // Toggle one item through the nested wrapper.
    let todos = state.get("todos");
    let first = todos.as_node().unwrap().get(0usize);
    first.as_node().unwrap().set("done", true);

    rt.flush();
    assert_eq!(open.load(Ordering::SeqCst), 1);
}

//! Observing Wrapper Operations
//!
//! Every operation a wrapper supports forwards to its raw node while talking
//! to the runtime:
//!
//! - reads (`get`, `has`, `len`, iteration) record a dependency edge for the
//!   facet they touched, and structured results are wrapped on the way out,
//!   so observation spreads lazily through the object graph as it is
//!   traversed;
//! - writes (`set`, `remove`, `set_len`) unwrap the incoming value, compare
//!   against the previous one, and trigger only on actual change — including
//!   the synthetic length/size facets when a single write changes them as a
//!   side effect;
//! - collection built-ins go through `invoke`, which wraps arguments,
//!   retries on an incompatible receiver, and derives size/iteration
//!   triggers from the net size change.
//!
//! The same methods work on raw nodes, where they mutate storage directly
//! without tracking or triggering. Structural list edits (`push`, `pop`,
//! `splice`) are deliberately expressed in terms of the primitive index and
//! length writes: each low-level step triggers on its own, and the deferred
//! scheduler coalesces the burst into one rerun against final state.

use std::sync::Arc;

use tracing::{trace, warn};

use super::builtin::{self, Method};
use super::error::ReactiveError;
use super::graph::DepKey;
use super::runtime::ReactiveRuntime;
use super::value::{Key, NodeData, NodeKind, NodeRef, Payload, Value};

/// What a primitive write against raw storage changed.
#[derive(Default)]
struct WriteReport {
    /// The facet whose value changed, if any.
    changed: Option<DepKey>,
    /// A list's length changed as a side effect of the write.
    len_changed: bool,
    /// An entry was inserted or removed, changing the entry count.
    count_changed: bool,
    /// The key existed before the operation.
    existed: bool,
}

/// The dependency facet a keyed read touches.
fn read_dep(raw: &NodeRef, key: &Key) -> DepKey {
    if raw.kind() == NodeKind::List {
        if let Key::Int(i) = key {
            if *i >= 0 {
                return DepKey::Index(*i as usize);
            }
        }
    }
    DepKey::Entry(key.clone())
}

impl NodeRef {
    fn observer_rt(&self) -> Option<Arc<ReactiveRuntime>> {
        match &self.0.payload {
            Payload::Wrapper { rt, .. } => rt.upgrade(),
            Payload::Raw(_) => None,
        }
    }

    /// Keyed read. Missing keys read `Null`; set membership reads a bool.
    ///
    /// Through a wrapper this tracks the facet and wraps structured results.
    pub fn get(&self, key: impl Into<Key>) -> Value {
        let key = key.into();
        match &self.0.payload {
            Payload::Raw(_) => self.read_key(&key),
            Payload::Wrapper { raw, rt } => {
                let value = raw.read_key(&key);
                match rt.upgrade() {
                    Some(rt) => {
                        rt.track(raw.id(), read_dep(raw, &key));
                        rt.wrap(value)
                    }
                    None => value,
                }
            }
        }
    }

    /// Key-existence check. Tracks the same facet as a read of the key.
    pub fn has(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match &self.0.payload {
            Payload::Raw(_) => self.contains_key(&key),
            Payload::Wrapper { raw, rt } => {
                if let Some(rt) = rt.upgrade() {
                    rt.track(raw.id(), read_dep(raw, &key));
                }
                raw.contains_key(&key)
            }
        }
    }

    /// Keyed write. The value is unwrapped before it is stored, and nothing
    /// triggers unless the stored value actually changed. A list index write
    /// that extends the list additionally triggers the length facet.
    pub fn set(&self, key: impl Into<Key>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into().to_raw();
        match &self.0.payload {
            Payload::Raw(_) => {
                self.write_key(&key, value);
            }
            Payload::Wrapper { raw, rt } => {
                trace!(target_id = ?raw.id(), %key, "set");
                let report = raw.write_key(&key, value);
                if let Some(rt) = rt.upgrade() {
                    fire(&rt, raw, report);
                }
            }
        }
    }

    /// Keyed delete. Returns whether the key existed; triggers only if it
    /// did. Deleting a list index leaves a `Null` hole and does not change
    /// the length.
    pub fn remove(&self, key: impl Into<Key>) -> bool {
        let key = key.into();
        match &self.0.payload {
            Payload::Raw(_) => self.delete_key(&key).existed,
            Payload::Wrapper { raw, rt } => {
                trace!(target_id = ?raw.id(), %key, "delete");
                let report = raw.delete_key(&key);
                let existed = report.existed;
                if let Some(rt) = rt.upgrade() {
                    fire(&rt, raw, report);
                }
                existed
            }
        }
    }

    /// Element count. Tracks the list-length facet or the entry-count facet
    /// depending on the node kind.
    pub fn len(&self) -> usize {
        match &self.0.payload {
            Payload::Raw(_) => self.with_data(|d| d.len()),
            Payload::Wrapper { raw, rt } => {
                if let Some(rt) = rt.upgrade() {
                    let dep = if raw.kind() == NodeKind::List {
                        DepKey::Len
                    } else {
                        DepKey::Size
                    };
                    rt.track(raw.id(), dep);
                }
                raw.with_data(|d| d.len())
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resize a list, truncating or extending with `Null`. Triggers the
    /// length facet on net change only; truncation also triggers every
    /// dropped index, so effects reading the tail observe the removal.
    pub fn set_len(&self, new_len: usize) {
        match &self.0.payload {
            Payload::Raw(_) => {
                self.resize_raw(new_len);
            }
            Payload::Wrapper { raw, rt } => {
                let old_len = raw.with_data(|d| d.len());
                if raw.resize_raw(new_len) {
                    if let Some(rt) = rt.upgrade() {
                        for index in new_len..old_len {
                            rt.trigger(raw.id(), DepKey::Index(index));
                        }
                        rt.trigger(raw.id(), DepKey::Len);
                    }
                }
            }
        }
    }

    /// Append to a list. Decomposes into an index write past the end, which
    /// triggers the new index and the length.
    pub fn push(&self, value: impl Into<Value>) {
        let len = self.raw().with_data(|d| d.len());
        self.set(Key::Int(len as i64), value);
    }

    /// Remove and return the last element of a list, `Null` if empty.
    pub fn pop(&self) -> Value {
        let len = self.raw().with_data(|d| d.len());
        if len == 0 {
            return Value::Null;
        }
        let last = self.get(Key::Int((len - 1) as i64));
        self.set_len(len - 1);
        last
    }

    /// Replace `delete_count` elements at `start` with `items`, returning
    /// the removed elements.
    ///
    /// Decomposed into the low-level steps a structural edit produces: one
    /// index write per shifted element, then a single length write. Each
    /// step triggers its own facet; in deferred mode the whole burst
    /// coalesces into one rerun per affected effect.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Value>) -> Vec<Value> {
        let raw = self.raw();
        if raw.kind() != NodeKind::List {
            warn!(kind = ?raw.kind(), "splice on a non-list node");
            return Vec::new();
        }
        let len = raw.with_data(|d| d.len());
        let start = start.min(len);
        let delete_count = delete_count.min(len - start);

        let slice = |from: usize, to: usize| {
            raw.with_data(|data| match data {
                NodeData::List(v) => v[from..to].to_vec(),
                _ => Vec::new(),
            })
        };
        let removed = slice(start, start + delete_count);
        let removed = match self.observer_rt() {
            Some(rt) => removed.into_iter().map(|v| rt.wrap(v)).collect(),
            None => removed,
        };
        let tail = slice(start + delete_count, len);

        let mut cursor = start;
        for v in items.into_iter().chain(tail) {
            self.set(Key::Int(cursor as i64), v);
            cursor += 1;
        }
        self.set_len(cursor);

        removed
    }

    /// Snapshot of entries: `(field, value)` for records and maps,
    /// `(index, element)` for lists, `(member, member)` for sets.
    ///
    /// Through a wrapper this tracks iteration (plus each entry read) and
    /// wraps the values, so an iterating effect reruns on both structural
    /// and per-entry change.
    pub fn entries(&self) -> Vec<(Key, Value)> {
        match &self.0.payload {
            Payload::Raw(_) => self.raw_entries(),
            Payload::Wrapper { raw, rt } => {
                let entries = raw.raw_entries();
                match rt.upgrade() {
                    Some(rt) => {
                        track_iteration(&rt, raw, &entries);
                        entries.into_iter().map(|(k, v)| (k, rt.wrap(v))).collect()
                    }
                    None => entries,
                }
            }
        }
    }

    /// Snapshot of values in iteration order.
    pub fn items(&self) -> Vec<Value> {
        self.entries().into_iter().map(|(_, v)| v).collect()
    }

    /// Snapshot of keys in iteration order. Depends only on the structure,
    /// not the values: list length for lists, iteration for the rest.
    pub fn keys(&self) -> Vec<Key> {
        match &self.0.payload {
            Payload::Raw(_) => self.raw_keys(),
            Payload::Wrapper { raw, rt } => {
                if let Some(rt) = rt.upgrade() {
                    let dep = if raw.kind() == NodeKind::List {
                        DepKey::Len
                    } else {
                        DepKey::Iter
                    };
                    rt.track(raw.id(), dep);
                }
                raw.raw_keys()
            }
        }
    }

    /// Call a collection built-in through this node.
    ///
    /// Through a wrapper: arguments are wrapped, the call is attempted with
    /// the wrapped receiver, and an incompatible-receiver rejection is
    /// recovered by retrying against the raw node. Triggers the touched
    /// entries, plus size/iteration if the collection's size changed net.
    pub fn invoke(&self, method: Method, args: Vec<Value>) -> Result<Value, ReactiveError> {
        match &self.0.payload {
            Payload::Raw(_) => builtin::apply(method, self, &args).map(|a| a.ret),
            Payload::Wrapper { raw, rt } => {
                let rt = rt.upgrade();
                let args: Vec<Value> = match &rt {
                    Some(rt) => args.into_iter().map(|a| rt.wrap(a)).collect(),
                    None => args,
                };
                let before = raw.with_data(|d| d.len());
                let applied = match builtin::apply(method, self, &args) {
                    Err(ReactiveError::IncompatibleReceiver { method: name }) => {
                        trace!(method = name, "retrying built-in against raw receiver");
                        builtin::apply(method, raw, &args)?
                    }
                    other => other?,
                };
                let after = raw.with_data(|d| d.len());
                if let Some(rt) = rt {
                    for dep in applied.touched {
                        rt.trigger(raw.id(), dep);
                    }
                    if before != after {
                        rt.trigger(raw.id(), DepKey::Size);
                        rt.trigger(raw.id(), DepKey::Iter);
                    }
                }
                Ok(applied.ret)
            }
        }
    }

    /// `map.set(key, value)`.
    pub fn insert_entry(
        &self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<(), ReactiveError> {
        self.invoke(Method::MapSet, vec![Value::from(key.into()), value.into()])
            .map(|_| ())
    }

    /// `map.delete(key)`. Returns whether the entry existed.
    pub fn remove_entry(&self, key: impl Into<Key>) -> Result<bool, ReactiveError> {
        self.invoke(Method::MapDelete, vec![Value::from(key.into())])
            .map(|v| v.as_bool().unwrap_or(false))
    }

    /// `set.add(member)`.
    pub fn add_member(&self, key: impl Into<Key>) -> Result<(), ReactiveError> {
        self.invoke(Method::SetAdd, vec![Value::from(key.into())])
            .map(|_| ())
    }

    /// `set.delete(member)`. Returns whether the member existed.
    pub fn remove_member(&self, key: impl Into<Key>) -> Result<bool, ReactiveError> {
        self.invoke(Method::SetDelete, vec![Value::from(key.into())])
            .map(|v| v.as_bool().unwrap_or(false))
    }

    /// Empty a map or set.
    pub fn clear(&self) -> Result<(), ReactiveError> {
        self.invoke(Method::Clear, Vec::new()).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Raw-side primitives
    // ------------------------------------------------------------------

    fn read_key(&self, key: &Key) -> Value {
        self.with_data(|data| match data {
            NodeData::Record(m) | NodeData::Map(m) => m.get(key).cloned().unwrap_or(Value::Null),
            NodeData::List(items) => match key {
                Key::Int(i) if *i >= 0 => items.get(*i as usize).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            },
            NodeData::Set(members) => Value::Bool(members.contains(key)),
        })
    }

    fn contains_key(&self, key: &Key) -> bool {
        self.with_data(|data| match data {
            NodeData::Record(m) | NodeData::Map(m) => m.contains_key(key),
            NodeData::List(items) => {
                matches!(key, Key::Int(i) if *i >= 0 && (*i as usize) < items.len())
            }
            NodeData::Set(members) => members.contains(key),
        })
    }

    fn write_key(&self, key: &Key, value: Value) -> WriteReport {
        self.with_data_mut(|data| match data {
            NodeData::Record(m) | NodeData::Map(m) => {
                let existed = m.contains_key(key);
                let changed = match m.get(key) {
                    Some(old) => *old != value,
                    None => true,
                };
                if changed {
                    m.insert(key.clone(), value);
                }
                WriteReport {
                    changed: changed.then(|| DepKey::Entry(key.clone())),
                    len_changed: false,
                    count_changed: !existed,
                    existed,
                }
            }
            NodeData::List(items) => match key {
                Key::Int(i) if *i >= 0 => {
                    let index = *i as usize;
                    let old_len = items.len();
                    let mut report = WriteReport {
                        existed: index < old_len,
                        ..WriteReport::default()
                    };
                    if index < items.len() {
                        if items[index] != value {
                            items[index] = value;
                            report.changed = Some(DepKey::Index(index));
                        }
                    } else {
                        items.resize(index, Value::Null);
                        items.push(value);
                        report.changed = Some(DepKey::Index(index));
                    }
                    report.len_changed = items.len() != old_len;
                    report
                }
                _ => {
                    warn!(%key, "ignoring non-index write to a list");
                    WriteReport::default()
                }
            },
            NodeData::Set(_) => {
                warn!(%key, "ignoring keyed write to a set; use add/remove member");
                WriteReport::default()
            }
        })
    }

    fn delete_key(&self, key: &Key) -> WriteReport {
        self.with_data_mut(|data| match data {
            NodeData::Record(m) | NodeData::Map(m) => {
                let existed = m.shift_remove(key).is_some();
                WriteReport {
                    changed: existed.then(|| DepKey::Entry(key.clone())),
                    len_changed: false,
                    count_changed: existed,
                    existed,
                }
            }
            NodeData::List(items) => match key {
                // Deleting an index leaves a hole; the length is unchanged.
                Key::Int(i) if *i >= 0 && (*i as usize) < items.len() => {
                    let index = *i as usize;
                    items[index] = Value::Null;
                    WriteReport {
                        changed: Some(DepKey::Index(index)),
                        len_changed: false,
                        count_changed: false,
                        existed: true,
                    }
                }
                _ => WriteReport::default(),
            },
            NodeData::Set(members) => {
                let existed = members.shift_remove(key);
                WriteReport {
                    changed: existed.then(|| DepKey::Entry(key.clone())),
                    len_changed: false,
                    count_changed: existed,
                    existed,
                }
            }
        })
    }

    fn resize_raw(&self, new_len: usize) -> bool {
        self.with_data_mut(|data| match data {
            NodeData::List(items) => {
                let old_len = items.len();
                items.resize(new_len, Value::Null);
                old_len != new_len
            }
            _ => {
                warn!("set_len on a non-list node");
                false
            }
        })
    }

    fn raw_entries(&self) -> Vec<(Key, Value)> {
        self.with_data(|data| match data {
            NodeData::Record(m) | NodeData::Map(m) => {
                m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            NodeData::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Int(i as i64), v.clone()))
                .collect(),
            NodeData::Set(members) => members
                .iter()
                .map(|k| (k.clone(), Value::from(k.clone())))
                .collect(),
        })
    }

    fn raw_keys(&self) -> Vec<Key> {
        self.with_data(|data| match data {
            NodeData::Record(m) | NodeData::Map(m) => m.keys().cloned().collect(),
            NodeData::List(items) => (0..items.len()).map(|i| Key::Int(i as i64)).collect(),
            NodeData::Set(members) => members.iter().cloned().collect(),
        })
    }
}

fn fire(rt: &ReactiveRuntime, raw: &NodeRef, report: WriteReport) {
    if let Some(dep) = report.changed {
        rt.trigger(raw.id(), dep);
    }
    if report.len_changed {
        rt.trigger(raw.id(), DepKey::Len);
    }
    if report.count_changed {
        rt.trigger(raw.id(), DepKey::Size);
        rt.trigger(raw.id(), DepKey::Iter);
    }
}

fn track_iteration(rt: &ReactiveRuntime, raw: &NodeRef, entries: &[(Key, Value)]) {
    match raw.kind() {
        NodeKind::List => {
            rt.track(raw.id(), DepKey::Len);
            for i in 0..entries.len() {
                rt.track(raw.id(), DepKey::Index(i));
            }
        }
        NodeKind::Record | NodeKind::Map => {
            rt.track(raw.id(), DepKey::Iter);
            for (k, _) in entries {
                rt.track(raw.id(), DepKey::Entry(k.clone()));
            }
        }
        NodeKind::Set => {
            rt.track(raw.id(), DepKey::Iter);
        }
    }
}

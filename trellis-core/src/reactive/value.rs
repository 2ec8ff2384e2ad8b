//! Value Model
//!
//! Rust has no transparent property traps, so the observing layer is built
//! on an explicit dynamic value model. A [`Value`] is either an inline scalar
//! or a reference to a structured node (record, list, map, or set). Structured
//! nodes carry a stable identity, which is what the identity store and the
//! dependency graph key on.
//!
//! # Raw vs. wrapped
//!
//! A node is either *raw* (it owns its data) or a *wrapper* (it forwards every
//! operation to a raw node while tracking reads and triggering writes). Both
//! forms expose the same operation surface; see the `observe` module for the
//! tracked operations.
//!
//! # Identity
//!
//! Node identity is reference identity (`NodeRef::ptr_eq`), mirroring how the
//! renderer compares subtrees to skip re-renders. Value equality compares
//! scalars structurally and nodes by the identity of their raw form, so a
//! wrapper and its raw node compare equal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::{IndexMap, IndexSet};
use parking_lot::RwLock;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use super::runtime::ReactiveRuntime;

/// Counter for generating unique node IDs.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique identifier for a structured node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        Self(NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A hashable scalar key.
///
/// Record fields, map keys, and set members are all `Key`s. Floats are
/// deliberately excluded so keys stay `Eq + Hash`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Str(Arc<str>),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(s) => f.write_str(s),
            Key::Int(i) => write!(f, "{i}"),
            Key::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(Arc::from(s))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(Arc::from(s.as_str()))
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

/// A dynamic value: an inline scalar or a reference to a structured node.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Node(NodeRef),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&NodeRef> {
        match self {
            Value::Node(n) => Some(n),
            _ => None,
        }
    }

    /// The raw form of this value: wrappers are replaced by their raw node,
    /// everything else is returned unchanged. Never tracks, never triggers.
    pub fn to_raw(&self) -> Value {
        match self {
            Value::Node(n) => Value::Node(n.raw()),
            other => other.clone(),
        }
    }

    /// Build a raw value graph from JSON. Objects become records, arrays
    /// become lists.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    n.as_f64().map(Value::Float).unwrap_or(Value::Null)
                }
            }
            serde_json::Value::String(s) => Value::Str(Arc::from(s.as_str())),
            serde_json::Value::Array(items) => {
                Value::Node(NodeRef::list(items.into_iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(entries) => {
                let mut record = IndexMap::new();
                for (k, v) in entries {
                    record.insert(Key::from(k), Value::from_json(v));
                }
                Value::Node(NodeRef::from_data(NodeData::Record(record)))
            }
        }
    }

    /// Serialize the raw structure back to JSON.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl PartialEq for Value {
    /// Scalars compare structurally; nodes compare by the identity of their
    /// raw form. This is the comparison the write path uses for change
    /// detection, so a wrapper never compares unequal to its own raw node.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Node(a), Value::Node(b)) => NodeRef::ptr_eq(&a.raw(), &b.raw()),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Arc::from(s.as_str()))
    }
}

impl From<NodeRef> for Value {
    fn from(n: NodeRef) -> Self {
        Value::Node(n)
    }
}

impl From<Key> for Value {
    fn from(k: Key) -> Self {
        match k {
            Key::Str(s) => Value::Str(s),
            Key::Int(i) => Value::Int(i),
            Key::Bool(b) => Value::Bool(b),
        }
    }
}

impl TryFrom<&Value> for Key {
    type Error = ();

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::Str(s) => Ok(Key::Str(s.clone())),
            Value::Int(i) => Ok(Key::Int(*i)),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            _ => Err(()),
        }
    }
}

/// What shape of data a node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Record,
    List,
    Map,
    Set,
}

/// The storage behind a raw node.
///
/// Records and maps are insertion-ordered, matching how the framework's
/// templates iterate state.
#[derive(Debug)]
pub enum NodeData {
    Record(IndexMap<Key, Value>),
    List(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Record(_) => NodeKind::Record,
            NodeData::List(_) => NodeKind::List,
            NodeData::Map(_) => NodeKind::Map,
            NodeData::Set(_) => NodeKind::Set,
        }
    }

    /// Element count: entries for records/maps, elements for lists, members
    /// for sets.
    pub fn len(&self) -> usize {
        match self {
            NodeData::Record(m) | NodeData::Map(m) => m.len(),
            NodeData::List(v) => v.len(),
            NodeData::Set(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) enum Payload {
    /// A raw node owning its data.
    Raw(RwLock<NodeData>),
    /// An observing wrapper forwarding to a raw node. The runtime reference
    /// is weak so dropping the runtime tears tracking down without keeping
    /// state graphs alive.
    Wrapper {
        raw: NodeRef,
        rt: Weak<ReactiveRuntime>,
    },
}

pub struct Node {
    id: NodeId,
    pub(crate) payload: Payload,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// A shared reference to a structured node.
#[derive(Clone)]
pub struct NodeRef(pub(crate) Arc<Node>);

impl NodeRef {
    pub(crate) fn from_payload(payload: Payload) -> Self {
        Self(Arc::new(Node {
            id: NodeId::new(),
            payload,
        }))
    }

    /// Create a raw node from its storage.
    pub fn from_data(data: NodeData) -> Self {
        Self::from_payload(Payload::Raw(RwLock::new(data)))
    }

    /// Create an empty raw record.
    pub fn record() -> Self {
        Self::from_data(NodeData::Record(IndexMap::new()))
    }

    /// Create a raw list from the given elements.
    pub fn list(items: Vec<Value>) -> Self {
        Self::from_data(NodeData::List(items))
    }

    /// Create an empty raw keyed map.
    pub fn map() -> Self {
        Self::from_data(NodeData::Map(IndexMap::new()))
    }

    /// Create an empty raw keyed set. Named apart from the keyed write
    /// `set(key, value)`.
    pub fn keyed_set() -> Self {
        Self::from_data(NodeData::Set(IndexSet::new()))
    }

    /// Build a wrapper node around a raw node. Only the runtime's identity
    /// store calls this; it guarantees one wrapper per raw node.
    pub(crate) fn new_wrapper(raw: NodeRef, rt: Weak<ReactiveRuntime>) -> Self {
        debug_assert!(!raw.is_wrapper(), "wrappers never nest");
        Self::from_payload(Payload::Wrapper { raw, rt })
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn is_wrapper(&self) -> bool {
        matches!(self.0.payload, Payload::Wrapper { .. })
    }

    /// The raw node behind this reference: the wrapped node for a wrapper,
    /// the node itself otherwise. Side-effect-free.
    pub fn raw(&self) -> NodeRef {
        match &self.0.payload {
            Payload::Wrapper { raw, .. } => raw.clone(),
            Payload::Raw(_) => self.clone(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.with_data(|data| data.kind())
    }

    /// Reference identity.
    pub fn ptr_eq(a: &NodeRef, b: &NodeRef) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    /// Run `f` against the node's data, following a wrapper to its raw node.
    pub(crate) fn with_data<R>(&self, f: impl FnOnce(&NodeData) -> R) -> R {
        match &self.0.payload {
            Payload::Raw(lock) => f(&lock.read()),
            Payload::Wrapper { raw, .. } => raw.with_data(f),
        }
    }

    pub(crate) fn with_data_mut<R>(&self, f: impl FnOnce(&mut NodeData) -> R) -> R {
        match &self.0.payload {
            Payload::Raw(lock) => f(&mut lock.write()),
            Payload::Wrapper { raw, .. } => raw.with_data_mut(f),
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("kind", &self.kind())
            .field("wrapper", &self.is_wrapper())
            .finish()
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            Value::Node(n) => n.raw().with_data(|data| match data {
                NodeData::Record(m) | NodeData::Map(m) => {
                    let mut map = serializer.serialize_map(Some(m.len()))?;
                    for (k, v) in m {
                        map.serialize_entry(&k.to_string(), v)?;
                    }
                    map.end()
                }
                NodeData::List(items) => {
                    let mut seq = serializer.serialize_seq(Some(items.len()))?;
                    for v in items {
                        seq.serialize_element(v)?;
                    }
                    seq.end()
                }
                NodeData::Set(members) => {
                    let mut seq = serializer.serialize_seq(Some(members.len()))?;
                    for k in members {
                        seq.serialize_element(&Value::from(k.clone()))?;
                    }
                    seq.end()
                }
            }),
        }
    }
}

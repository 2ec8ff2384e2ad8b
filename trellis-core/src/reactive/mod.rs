//! Reactivity Engine
//!
//! This module implements the core reactive system: observing wrappers over
//! plain data, automatic dependency tracking, and batched effect scheduling.
//!
//! # Concepts
//!
//! ## Wrappers
//!
//! Application state is plain structured data (records, lists, maps, sets).
//! [`ReactiveRuntime::wrap`] returns an observing form of a value that
//! behaves like the raw value but intercepts every read, write, existence
//! check, delete, and collection method call. Wrapping is lazy and
//! recursive: nested structures are wrapped as they are traversed, not
//! eagerly at creation time.
//!
//! ## Effects
//!
//! An effect is a computation registered with
//! [`ReactiveRuntime::watch_effect`]. While it runs, every read through a
//! wrapper records a dependency edge. When any of those facets later
//! changes, the effect re-runs — after first discarding its stale edges, so
//! dependencies follow the data the latest run actually read.
//!
//! ## Batching
//!
//! A single logical mutation often decomposes into several low-level writes
//! (splicing a list shifts indices and adjusts the length one step at a
//! time). Re-running effects synchronously after the first step would
//! observe transiently-inconsistent state. The scheduler therefore defers
//! reruns to a flush boundary by default and drops superseded runs, so one
//! burst of writes becomes exactly one rerun per affected effect.
//!
//! # Implementation Notes
//!
//! The runtime is an explicit context object rather than a process-wide
//! singleton; tests create one each. The "currently active effect" is a
//! single slot on the runtime's scheduler, saved and restored around every
//! effect body by a drop guard, so it survives panicking effects. This
//! mirrors the transparent-reactivity design of Vue 3 and SolidJS, with the
//! property-trap layer replaced by an explicit operation surface on
//! [`NodeRef`].

mod builtin;
mod effect;
mod error;
mod graph;
mod observe;
mod runtime;
mod scheduler;
mod store;
mod value;

pub use builtin::Method;
pub use effect::{EffectHandle, EffectId};
pub use error::{EffectError, ReactiveError};
pub use graph::DepKey;
pub use runtime::ReactiveRuntime;
pub use scheduler::ScheduleMode;
pub use value::{Key, Node, NodeData, NodeId, NodeKind, NodeRef, Value};

/// The raw form of a value: a wrapper's underlying node, or the value
/// itself. Free-function form of [`ReactiveRuntime::unwrap`].
pub fn unwrap(value: &Value) -> Value {
    value.to_raw()
}

/// Whether a value is an observing wrapper.
pub fn is_wrapped(value: &Value) -> bool {
    matches!(value, Value::Node(n) if n.is_wrapper())
}

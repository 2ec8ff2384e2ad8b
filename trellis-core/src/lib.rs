//! Trellis Core
//!
//! This crate provides the reactivity engine for the Trellis UI framework:
//!
//! - A dynamic value model for component state (records, lists, maps, sets)
//! - Observing wrappers with automatic dependency tracking
//! - An effect scheduler with burst batching and cancellable deferred reruns
//!
//! The rendering pipeline, component base classes, and template layer are
//! separate crates that consume this engine through four operations:
//! `wrap`, `unwrap`, `is_wrapped`, and `watch_effect`.
//!
//! # Example
//!
//! ```rust
//! use trellis_core::reactive::{NodeRef, ReactiveRuntime};
//!
//! let rt = ReactiveRuntime::new();
//!
//! // Build raw state and obtain its observing form.
//! let state = rt.wrap_node(&NodeRef::record());
//! state.set("count", 0);
//!
//! // Register a render effect; it runs once immediately.
//! let reader = state.clone();
//! let handle = rt.watch_effect(move || {
//!     let _count = reader.get("count");
//! });
//!
//! // Writes trigger the effect; flush is the batching boundary.
//! state.set("count", 1);
//! rt.flush();
//!
//! handle.stop();
//! ```

pub mod reactive;

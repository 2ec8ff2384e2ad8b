//! Reactive Runtime
//!
//! The runtime is the context object that connects the identity store, the
//! dependency graph, and the effect scheduler. Nothing in the engine is
//! process-global: construct one runtime per application (or per test), share
//! it by `Arc`, and drop it to tear everything down.
//!
//! # How it works
//!
//! 1. `wrap` hands out the observing form of a value, memoized so there is
//!    exactly one wrapper per raw node.
//!
//! 2. `watch_effect` registers a computation and runs it once synchronously;
//!    reads through wrappers during the run record dependency edges against
//!    the active effect.
//!
//! 3. A write through a wrapper triggers the edges for the facet it changed.
//!    In deferred mode (the default) affected effects are queued and
//!    coalesced; `flush` is the task boundary that re-runs the survivors,
//!    each after clearing its stale edges.
//!
//! # Failure containment
//!
//! An effect body panic is caught at the scheduler boundary and handed to
//! the error hook (or logged). The active-effect slot is restored by a drop
//! guard on the same path, so a panicking effect corrupts neither tracking
//! state nor other effects' scheduled runs.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{error, trace};

use super::effect::{EffectHandle, EffectId, EffectInner};
use super::error::EffectError;
use super::graph::{DepGraph, DepKey};
use super::scheduler::{QueuedRun, ScheduleMode, Scheduler};
use super::store::WrapperStore;
use super::value::{NodeId, NodeRef, Value};

type ErrorHook = Box<dyn Fn(&EffectError) + Send + Sync>;

/// The reactivity engine's shared state.
pub struct ReactiveRuntime {
    /// Self-reference handed to wrappers and effect handles, so they can
    /// reach the runtime without keeping it alive.
    self_ref: Weak<ReactiveRuntime>,
    store: WrapperStore,
    graph: Mutex<DepGraph>,
    effects: Mutex<HashMap<EffectId, Arc<EffectInner>>>,
    scheduler: Scheduler,
    error_hook: RwLock<Option<ErrorHook>>,
}

impl ReactiveRuntime {
    /// Create a runtime with deferred scheduling.
    pub fn new() -> Arc<Self> {
        Self::with_mode(ScheduleMode::Deferred)
    }

    pub fn with_mode(mode: ScheduleMode) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            self_ref: me.clone(),
            store: WrapperStore::new(),
            graph: Mutex::new(DepGraph::new()),
            effects: Mutex::new(HashMap::new()),
            scheduler: Scheduler::new(mode),
            error_hook: RwLock::new(None),
        })
    }

    pub fn mode(&self) -> ScheduleMode {
        self.scheduler.mode()
    }

    pub fn set_mode(&self, mode: ScheduleMode) {
        self.scheduler.set_mode(mode);
    }

    /// Install the side channel for effect-body failures. Replaces the
    /// default `tracing::error!` report.
    pub fn set_error_hook<F>(&self, hook: F)
    where
        F: Fn(&EffectError) + Send + Sync + 'static,
    {
        *self.error_hook.write() = Some(Box::new(hook));
    }

    // ------------------------------------------------------------------
    // Identity
    // ------------------------------------------------------------------

    /// The observing form of a value.
    ///
    /// Scalars pass through unchanged; a wrapper is returned as-is; a raw
    /// node gets its memoized wrapper, created on first request.
    pub fn wrap(&self, value: Value) -> Value {
        match value {
            Value::Node(node) => Value::Node(self.wrap_node(&node)),
            scalar => scalar,
        }
    }

    /// Node-level `wrap`. Idempotent and identity-stable: as long as a
    /// wrapper is alive, every wrap request for its raw node returns that
    /// exact wrapper.
    pub fn wrap_node(&self, node: &NodeRef) -> NodeRef {
        if node.is_wrapper() {
            return node.clone();
        }
        if let Some(existing) = self.store.lookup(node.id()) {
            return existing;
        }
        let wrapper = NodeRef::new_wrapper(node.clone(), self.self_ref.clone());
        self.store.insert(node.id(), &wrapper);
        wrapper
    }

    /// The raw form of a value. Side-effect-free; never tracks.
    pub fn unwrap(&self, value: &Value) -> Value {
        value.to_raw()
    }

    pub fn is_wrapped(&self, value: &Value) -> bool {
        matches!(value, Value::Node(n) if n.is_wrapper())
    }

    // ------------------------------------------------------------------
    // Effects
    // ------------------------------------------------------------------

    /// Register an effect and run it once synchronously to establish its
    /// initial dependencies. The returned handle stops it.
    pub fn watch_effect<F>(&self, f: F) -> EffectHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let effect = EffectInner::new(f);
        let id = effect.id();
        self.effects.lock().insert(id, effect.clone());

        self.run_effect(&effect);

        EffectHandle::new(id, self.self_ref.clone())
    }

    /// Dispose an effect: edges removed, pending runs invalidated, never
    /// invoked again. Idempotent.
    pub(crate) fn stop_effect(&self, id: EffectId) {
        let Some(effect) = self.effects.lock().remove(&id) else {
            return;
        };
        effect.dispose();
        self.graph.lock().cleanup(id);
        trace!(effect = ?id, "stopped");
    }

    /// Drain the deferred-run queue: the task boundary.
    ///
    /// Only entries whose generation is still the effect's latest run;
    /// superseded and disposed entries are dropped silently. Effects that
    /// trigger further writes while running extend the same drain.
    pub fn flush(&self) {
        while let Some(QueuedRun { effect, generation }) = self.scheduler.pop() {
            let Some(effect) = self.effects.lock().get(&effect).cloned() else {
                continue;
            };
            if effect.is_disposed() || effect.current_generation() != generation {
                trace!(effect = ?effect.id(), generation, "skipping superseded run");
                continue;
            }
            self.run_effect(&effect);
        }
    }

    /// Number of queued deferred runs, superseded entries included.
    pub fn pending_runs(&self) -> usize {
        self.scheduler.pending_runs()
    }

    // ------------------------------------------------------------------
    // Graph plumbing, called from wrapper operations
    // ------------------------------------------------------------------

    /// Record that the active effect read `(target, key)`. No-op outside an
    /// effect.
    pub(crate) fn track(&self, target: NodeId, key: DepKey) {
        let Some(active) = self.scheduler.active() else {
            return;
        };
        self.graph.lock().track(target, key, active);
    }

    /// Reschedule every effect registered for `(target, key)`.
    pub(crate) fn trigger(&self, target: NodeId, key: DepKey) {
        // Snapshot before iterating: a rerun rewrites the very set being
        // iterated, and the graph lock must not be held while bodies run.
        let dependents = self.graph.lock().dependents(target, &key);
        if dependents.is_empty() {
            return;
        }
        trace!(?target, ?key, count = dependents.len(), "trigger");

        for id in dependents {
            let effect = self.effects.lock().get(&id).cloned();
            if let Some(effect) = effect {
                self.schedule(effect);
            }
        }
    }

    fn schedule(&self, effect: Arc<EffectInner>) {
        if effect.is_disposed() {
            return;
        }
        match self.scheduler.mode() {
            ScheduleMode::Immediate => self.run_effect(&effect),
            ScheduleMode::Deferred => {
                let generation = effect.next_generation();
                self.scheduler.enqueue(QueuedRun {
                    effect: effect.id(),
                    generation,
                });
            }
        }
    }

    fn run_effect(&self, effect: &EffectInner) {
        if effect.is_disposed() {
            return;
        }
        // Stale edges go first so the edges this run records survive.
        self.graph.lock().cleanup(effect.id());

        let _active = self.scheduler.activate(effect.id());
        let result = catch_unwind(AssertUnwindSafe(|| effect.call()));
        if let Err(payload) = result {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            self.report(&EffectError::Panicked(message));
        }
    }

    fn report(&self, err: &EffectError) {
        match &*self.error_hook.read() {
            Some(hook) => hook(err),
            None => error!(%err, "effect failed"),
        }
    }
}

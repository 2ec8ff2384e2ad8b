//! Effect Handles
//!
//! An effect is a zero-argument computation with identity. It is registered
//! with [`ReactiveRuntime::watch_effect`], which runs it once synchronously
//! to establish its initial dependencies and returns an [`EffectHandle`].
//! When any tracked dependency changes, the scheduler re-runs the effect:
//! old edges are cleaned up first, then the body re-executes and re-records.
//!
//! # Disposal
//!
//! `EffectHandle::stop` removes every dependency edge and invalidates any
//! pending deferred run; the effect never executes again. Stopping twice is
//! a no-op. Dropping the handle without calling `stop` leaves the effect
//! registered, matching the framework's component lifetime model where the
//! lifecycle layer owns disposal explicitly.
//!
//! [`ReactiveRuntime::watch_effect`]: super::runtime::ReactiveRuntime::watch_effect

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::runtime::ReactiveRuntime;

/// Unique identifier for an effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(u64);

impl EffectId {
    /// Generate a new unique effect ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EffectId {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry-side state of an effect.
pub(crate) struct EffectInner {
    id: EffectId,
    run: Box<dyn Fn() + Send + Sync>,
    disposed: AtomicBool,
    /// Latest deferred-run generation. A queued run whose captured generation
    /// no longer matches was superseded by a later trigger and is dropped.
    pending: AtomicU64,
}

impl EffectInner {
    pub fn new<F>(run: F) -> Arc<Self>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(Self {
            id: EffectId::new(),
            run: Box::new(run),
            disposed: AtomicBool::new(false),
            pending: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    pub fn call(&self) {
        (self.run)()
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Claim the next deferred-run generation, superseding any queued run.
    pub fn next_generation(&self) -> u64 {
        self.pending.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current_generation(&self) -> u64 {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Disposer returned by `watch_effect`.
pub struct EffectHandle {
    id: EffectId,
    rt: Weak<ReactiveRuntime>,
}

impl EffectHandle {
    pub(crate) fn new(id: EffectId, rt: Weak<ReactiveRuntime>) -> Self {
        Self { id, rt }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }

    /// Dispose the effect: remove all its dependency edges and invalidate
    /// any pending deferred run. Idempotent.
    pub fn stop(&self) {
        if let Some(rt) = self.rt.upgrade() {
            rt.stop_effect(self.id);
        }
    }
}

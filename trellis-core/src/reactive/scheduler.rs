//! Effect Scheduler
//!
//! Owns the two pieces of scheduling state:
//!
//! - The single active-effect slot. It is set immediately before an effect
//!   body runs and restored immediately after, through a drop guard so the
//!   restore happens even when the body panics. Effects do not nest in this
//!   design, but an immediate-mode trigger fired from inside a running
//!   effect re-enters the slot, so the guard saves and restores rather than
//!   blindly clearing.
//!
//! - The deferred-run queue. A trigger in deferred mode does not run the
//!   effect; it claims a fresh generation on the effect and enqueues the
//!   `(effect, generation)` pair. `ReactiveRuntime::flush` is the task
//!   boundary: it drains the queue and runs only entries whose generation is
//!   still the effect's latest. A burst of mutations in one synchronous
//!   stretch therefore collapses to exactly one rerun against final state,
//!   which is what makes multi-step structural operations (list splicing,
//!   map rebuilds) safe to observe.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::effect::EffectId;

/// When triggered effects re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    /// Run synchronously inside `trigger`. Reruns observe intermediate
    /// states of multi-step mutations.
    Immediate,
    /// Queue for the next `flush`, coalescing bursts. The default.
    Deferred,
}

/// A queued deferred run.
#[derive(Debug, Clone, Copy)]
pub(crate) struct QueuedRun {
    pub effect: EffectId,
    pub generation: u64,
}

pub(crate) struct Scheduler {
    mode: Mutex<ScheduleMode>,
    active: Mutex<Option<EffectId>>,
    queue: Mutex<VecDeque<QueuedRun>>,
}

impl Scheduler {
    pub fn new(mode: ScheduleMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            active: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn mode(&self) -> ScheduleMode {
        *self.mode.lock()
    }

    pub fn set_mode(&self, mode: ScheduleMode) {
        *self.mode.lock() = mode;
    }

    /// The effect currently executing, if any. Reads inside its body track
    /// against this slot.
    pub fn active(&self) -> Option<EffectId> {
        *self.active.lock()
    }

    /// Occupy the active slot, returning a guard that restores the previous
    /// occupant on drop.
    pub fn activate(&self, effect: EffectId) -> ActiveGuard<'_> {
        let prev = self.active.lock().replace(effect);
        ActiveGuard {
            scheduler: self,
            prev,
        }
    }

    pub fn enqueue(&self, run: QueuedRun) {
        self.queue.lock().push_back(run);
    }

    pub fn pop(&self) -> Option<QueuedRun> {
        self.queue.lock().pop_front()
    }

    pub fn pending_runs(&self) -> usize {
        self.queue.lock().len()
    }
}

/// Restores the previous active effect when dropped.
pub(crate) struct ActiveGuard<'a> {
    scheduler: &'a Scheduler,
    prev: Option<EffectId>,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        *self.scheduler.active.lock() = self.prev;
    }
}

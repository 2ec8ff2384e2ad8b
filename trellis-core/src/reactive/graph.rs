//! Dependency Graph
//!
//! The bidirectional index between `(node, key)` pairs and the effects that
//! depend on them:
//!
//! - `by_source`: node -> key -> set of effects, consulted at trigger time.
//! - `by_effect`: effect -> node -> set of keys, consulted at cleanup time.
//!
//! Both directions are maintained on every insert so that removing an effect
//! is O(its own edges) rather than a scan of the whole graph.
//!
//! # Snapshot-then-iterate
//!
//! `dependents` returns a snapshot of the effect set rather than borrowing
//! it: re-running an effect removes and re-adds the effect's edges as a side
//! effect of running, which would otherwise mutate the set mid-iteration.

use std::collections::{HashMap, HashSet};

use smallvec::SmallVec;
use tracing::trace;

use super::effect::EffectId;
use super::value::{Key, NodeId};

/// A dependency key: the observable facet of a node an effect read.
///
/// `Len`, `Size`, and `Iter` are synthetic keys. `Len` is a list's length,
/// `Size` a map/set/record entry count, and `Iter` iteration order; writes
/// that change these net trigger them alongside the concrete entry keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DepKey {
    /// A record field, map entry, or set member.
    Entry(Key),
    /// A list index.
    Index(usize),
    /// List length.
    Len,
    /// Entry count of a record, map, or set.
    Size,
    /// Iteration over entries or members.
    Iter,
}

/// The bidirectional dependency index.
#[derive(Default)]
pub(crate) struct DepGraph {
    by_source: HashMap<NodeId, HashMap<DepKey, HashSet<EffectId>>>,
    by_effect: HashMap<EffectId, HashMap<NodeId, HashSet<DepKey>>>,
}

impl DepGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the `(target, key) -> effect` edge in both directions.
    /// Idempotent.
    pub fn track(&mut self, target: NodeId, key: DepKey, effect: EffectId) {
        trace!(?target, ?key, ?effect, "track");

        self.by_source
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(effect);

        self.by_effect
            .entry(effect)
            .or_default()
            .entry(target)
            .or_default()
            .insert(key);
    }

    /// Snapshot the effects registered for `(target, key)`.
    pub fn dependents(&self, target: NodeId, key: &DepKey) -> SmallVec<[EffectId; 4]> {
        self.by_source
            .get(&target)
            .and_then(|keys| keys.get(key))
            .map(|effects| effects.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove every edge the effect is a party to, from both indexes.
    ///
    /// Runs immediately before an effect body re-runs, never after, so the
    /// dependencies the new run records are not erased.
    pub fn cleanup(&mut self, effect: EffectId) {
        let Some(sources) = self.by_effect.remove(&effect) else {
            return;
        };
        trace!(?effect, sources = sources.len(), "cleanup");

        for (target, keys) in sources {
            let Some(by_key) = self.by_source.get_mut(&target) else {
                continue;
            };
            for key in keys {
                if let Some(effects) = by_key.get_mut(&key) {
                    effects.remove(&effect);
                    if effects.is_empty() {
                        by_key.remove(&key);
                    }
                }
            }
            if by_key.is_empty() {
                self.by_source.remove(&target);
            }
        }
    }

    /// Number of edges recorded for an effect. Test hook.
    #[cfg(test)]
    pub fn edge_count(&self, effect: EffectId) -> usize {
        self.by_effect
            .get(&effect)
            .map(|sources| sources.values().map(|keys| keys.len()).sum())
            .unwrap_or(0)
    }
}

//! Identity Store
//!
//! Memoizes the raw-node -> wrapper association so that wrapping is
//! idempotent and identity-stable: `wrap(x)` returns the exact same wrapper
//! for as long as any consumer holds it. Downstream code relies on this for
//! equality checks and re-render skipping.
//!
//! The store holds only weak references. A wrapper lives while effects,
//! component state, or the caller keep it alive; once the last strong
//! reference drops, a later wrap request simply builds a fresh wrapper.

use std::sync::{Arc, Weak};

use dashmap::DashMap;

use super::value::{Node, NodeId, NodeRef};

pub(crate) struct WrapperStore {
    wrappers: DashMap<NodeId, Weak<Node>>,
}

impl WrapperStore {
    pub fn new() -> Self {
        Self {
            wrappers: DashMap::new(),
        }
    }

    /// Look up the live wrapper for a raw node, dropping a dead entry on the
    /// way out.
    pub fn lookup(&self, raw: NodeId) -> Option<NodeRef> {
        // The read guard must drop before remove_if touches the same shard.
        let upgraded = self.wrappers.get(&raw).and_then(|weak| weak.upgrade());
        match upgraded {
            Some(node) => Some(NodeRef(node)),
            None => {
                self.wrappers.remove_if(&raw, |_, weak| weak.strong_count() == 0);
                None
            }
        }
    }

    /// Register the wrapper for a raw node.
    pub fn insert(&self, raw: NodeId, wrapper: &NodeRef) {
        self.wrappers.insert(raw, Arc::downgrade(&wrapper.0));
    }

    /// Number of registered associations, live or not. Test hook.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.wrappers.len()
    }
}

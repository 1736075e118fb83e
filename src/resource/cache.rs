//! Node cache
//!
//! Id-keyed arena of resolved nodes. Insertion order is kept so listings and
//! rebuilds are deterministic.

use super::node::ResourceNode;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct NodeCache {
    nodes: HashMap<String, ResourceNode>,
    order: Vec<String>,
}

/// Ids compare case-insensitively
fn key(id: &str) -> String {
    id.to_ascii_lowercase()
}

impl NodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_cache(&self, id: &str) -> bool {
        self.nodes.contains_key(&key(id))
    }

    pub fn search(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.get(&key(id))
    }

    /// All nodes in insertion order
    pub fn show_all(&self) -> Vec<&ResourceNode> {
        self.order.iter().filter_map(|k| self.nodes.get(k)).collect()
    }

    /// Snapshot of the cached ids, in insertion order
    pub fn ids(&self) -> Vec<String> {
        self.show_all().into_iter().map(|n| n.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Store `node` unless a node with the same id is already present.
    /// Returns whether it was stored.
    pub fn insert_if_absent(&mut self, node: ResourceNode) -> bool {
        let k = key(&node.id);
        if self.nodes.contains_key(&k) {
            return false;
        }
        self.order.push(k.clone());
        self.nodes.insert(k, node);
        true
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut ResourceNode> {
        self.nodes.get_mut(&key(id))
    }

    pub fn remove(&mut self, id: &str) -> Option<ResourceNode> {
        let k = key(id);
        let removed = self.nodes.remove(&k);
        if removed.is_some() {
            self.order.retain(|o| o != &k);
        }
        removed
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }
}

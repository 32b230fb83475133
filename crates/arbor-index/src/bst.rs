//! Unbalanced binary search tree.
//!
//! The simplest engine: no balancing, so shape depends entirely on
//! insertion order. Deletion follows the classic three cases (leaf,
//! one child, two children with in-order successor promotion).

use crate::arena::{NodeArena, NodeId};
use crate::tree::{Key, OrderedIndex};
use arbor_common::{ArborError, IndexConfig, Phase, Probe, Result};
use std::cmp::Ordering;
use tracing::trace;

// ============================================================================
// Node
// ============================================================================

#[derive(Debug)]
struct BstNode<K> {
    key: K,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

impl<K> BstNode<K> {
    fn leaf(key: K) -> Self {
        Self {
            key,
            left: None,
            right: None,
        }
    }
}

// ============================================================================
// BstIndex
// ============================================================================

/// Binary search tree over unique keys.
#[derive(Debug)]
pub struct BstIndex<K> {
    arena: NodeArena<BstNode<K>>,
    root: Option<NodeId>,
    probe: Probe,
}

impl<K: Key> Default for BstIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> BstIndex<K> {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::with_probe(Probe::disabled())
    }

    /// Creates an empty tree reporting to `probe`.
    pub fn with_probe(probe: Probe) -> Self {
        Self {
            arena: NodeArena::with_capacity(64),
            root: None,
            probe,
        }
    }

    /// Creates an empty tree sized by `config`. The minimum degree is
    /// not used by this engine.
    pub fn with_config(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            arena: NodeArena::with_capacity(config.initial_nodes),
            root: None,
            probe: Probe::disabled(),
        })
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.arena.live_len()
    }

    /// True when no key is stored.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn node(&self, id: NodeId) -> Result<&BstNode<K>> {
        self.arena
            .get(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("bst node {} missing", id.index())))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut BstNode<K>> {
        self.arena
            .get_mut(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("bst node {} missing", id.index())))
    }

    /// Removes `target` from the subtree rooted at `id`, returning the new
    /// subtree root. Sets `removed` when the key was actually found.
    fn remove_at(&mut self, id: NodeId, target: K, removed: &mut bool) -> Result<Option<NodeId>> {
        self.probe
            .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
        let node = self.node(id)?;
        let key = node.key;
        match target.cmp(&key) {
            Ordering::Less => {
                if let Some(left) = node.left {
                    let new_left = self.remove_at(left, target, removed)?;
                    self.node_mut(id)?.left = new_left;
                }
                Ok(Some(id))
            }
            Ordering::Greater => {
                if let Some(right) = node.right {
                    let new_right = self.remove_at(right, target, removed)?;
                    self.node_mut(id)?.right = new_right;
                }
                Ok(Some(id))
            }
            Ordering::Equal => {
                *removed = true;
                let (left, right) = (node.left, node.right);
                match (left, right) {
                    (None, None) => {
                        self.arena.release(id);
                        Ok(None)
                    }
                    (Some(child), None) | (None, Some(child)) => {
                        // Splice the single child into the parent link.
                        self.arena.release(id);
                        Ok(Some(child))
                    }
                    (Some(_), Some(right)) => {
                        // Two children: promote the in-order successor, then
                        // delete it from the right subtree.
                        let successor = self.min_key(right)?;
                        self.probe.emit(id.as_u64(), None, Phase::Outcome, || {
                            format!("promote successor {successor:?}")
                        });
                        self.node_mut(id)?.key = successor;
                        let mut gone = false;
                        let new_right = self.remove_at(right, successor, &mut gone)?;
                        self.node_mut(id)?.right = new_right;
                        Ok(Some(id))
                    }
                }
            }
        }
    }

    fn min_key(&self, mut id: NodeId) -> Result<K> {
        loop {
            let node = self.node(id)?;
            match node.left {
                Some(left) => id = left,
                None => return Ok(node.key),
            }
        }
    }

    /// Pruned in-order walk of `[begin, end]`. Returns true if any key in
    /// the subtree falls inside the interval.
    fn range_at(&self, id: NodeId, begin: K, end: K) -> Result<bool> {
        self.probe
            .emit(id.as_u64(), None, Phase::Visit, || "range visit".to_string());
        let node = self.node(id)?;
        let mut found = false;
        if begin < node.key {
            if let Some(left) = node.left {
                found |= self.range_at(left, begin, end)?;
            }
        }
        if begin <= node.key && node.key <= end {
            found = true;
            self.probe.emit(id.as_u64(), Some(0), Phase::Outcome, || {
                format!("{:?} in range", node.key)
            });
        }
        if node.key < end {
            if let Some(right) = node.right {
                found |= self.range_at(right, begin, end)?;
            }
        }
        Ok(found)
    }
}

impl<K: Key> OrderedIndex<K> for BstIndex<K> {
    fn insert(&mut self, key: K) -> Result<bool> {
        trace!(key = ?key, "bst insert");
        let Some(root) = self.root else {
            let id = self.arena.alloc(BstNode::leaf(key));
            self.root = Some(id);
            self.probe
                .emit(id.as_u64(), None, Phase::Outcome, || "new root".to_string());
            return Ok(true);
        };

        let mut current = root;
        loop {
            self.probe
                .emit(current.as_u64(), None, Phase::Visit, || "descend".to_string());
            let node = self.node(current)?;
            let existing = node.key;
            match key.cmp(&existing) {
                Ordering::Equal => {
                    self.probe.emit(current.as_u64(), None, Phase::Outcome, || {
                        format!("duplicate {key:?}")
                    });
                    return Ok(false);
                }
                Ordering::Less => {
                    self.probe.emit(current.as_u64(), None, Phase::Compare, || {
                        format!("{key:?} < {existing:?}, go left")
                    });
                    match node.left {
                        Some(left) => current = left,
                        None => {
                            let id = self.arena.alloc(BstNode::leaf(key));
                            self.node_mut(current)?.left = Some(id);
                            return Ok(true);
                        }
                    }
                }
                Ordering::Greater => {
                    self.probe.emit(current.as_u64(), None, Phase::Compare, || {
                        format!("{key:?} > {existing:?}, go right")
                    });
                    match node.right {
                        Some(right) => current = right,
                        None => {
                            let id = self.arena.alloc(BstNode::leaf(key));
                            self.node_mut(current)?.right = Some(id);
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }

    fn search(&self, target: K) -> Result<bool> {
        let mut current = self.root;
        while let Some(id) = current {
            self.probe
                .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
            let node = self.node(id)?;
            match target.cmp(&node.key) {
                Ordering::Equal => {
                    self.probe.emit(id.as_u64(), None, Phase::Outcome, || {
                        format!("found {target:?}")
                    });
                    return Ok(true);
                }
                Ordering::Less => current = node.left,
                Ordering::Greater => current = node.right,
            }
        }
        Ok(false)
    }

    fn remove(&mut self, target: K) -> Result<bool> {
        trace!(key = ?target, "bst remove");
        let Some(root) = self.root else {
            return Ok(false);
        };
        let mut removed = false;
        self.root = self.remove_at(root, target, &mut removed)?;
        Ok(removed)
    }

    fn range_search(&self, begin: K, end: K) -> Result<bool> {
        if begin > end {
            return Ok(false);
        }
        match self.root {
            Some(root) => self.range_at(root, begin, end),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(keys: &[i32]) -> BstIndex<i32> {
        let mut tree = BstIndex::new();
        for &k in keys {
            assert_eq!(tree.insert(k).unwrap(), true);
        }
        tree
    }

    #[test]
    fn test_insert_and_search() {
        let tree = build(&[50, 30, 70, 20, 40, 60, 80]);
        for k in [50, 30, 70, 20, 40, 60, 80] {
            assert!(tree.search(k).unwrap());
        }
        assert!(!tree.search(55).unwrap());
        assert_eq!(tree.len(), 7);
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut tree = build(&[10, 5, 15]);
        assert_eq!(tree.insert(10).unwrap(), false);
        assert_eq!(tree.insert(5).unwrap(), false);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_empty_tree_operations() {
        let mut tree: BstIndex<i32> = BstIndex::new();
        assert!(tree.is_empty());
        assert!(!tree.search(1).unwrap());
        assert!(!tree.remove(1).unwrap());
        assert!(!tree.range_search(0, 100).unwrap());
    }

    #[test]
    fn test_remove_leaf() {
        let mut tree = build(&[50, 30, 70]);
        assert!(tree.remove(30).unwrap());
        assert!(!tree.search(30).unwrap());
        assert!(tree.search(50).unwrap());
        assert!(tree.search(70).unwrap());
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_remove_single_child() {
        let mut tree = build(&[50, 30, 20]);
        assert!(tree.remove(30).unwrap());
        assert!(tree.search(20).unwrap());
        assert!(tree.search(50).unwrap());
        assert!(!tree.search(30).unwrap());
    }

    #[test]
    fn test_remove_two_children_promotes_successor() {
        let mut tree = build(&[50, 30, 70, 60, 80, 65]);
        assert!(tree.remove(70).unwrap());
        assert!(!tree.search(70).unwrap());
        for k in [50, 30, 60, 65, 80] {
            assert!(tree.search(k).unwrap());
        }
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_remove_root_until_empty() {
        let mut tree = build(&[3, 1, 4, 2]);
        for k in [3, 1, 4, 2] {
            assert!(tree.remove(k).unwrap());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn test_remove_absent_reports_false() {
        let mut tree = build(&[10, 20]);
        assert_eq!(tree.remove(15).unwrap(), false);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_range_search() {
        let tree = build(&[50, 30, 70, 20, 40, 60, 80]);
        assert!(tree.range_search(35, 45).unwrap());
        assert!(tree.range_search(60, 60).unwrap());
        assert!(!tree.range_search(41, 49).unwrap());
        // Inverted interval matches nothing.
        assert!(!tree.range_search(45, 35).unwrap());
    }

    #[test]
    fn test_degenerate_chain() {
        // Sorted insertion degenerates into a linked list; operations
        // must still be correct.
        let mut tree = BstIndex::new();
        for k in 0..32 {
            assert!(tree.insert(k).unwrap());
        }
        for k in 0..32 {
            assert!(tree.search(k).unwrap());
        }
        for k in (0..32).step_by(2) {
            assert!(tree.remove(k).unwrap());
        }
        for k in 0..32 {
            assert_eq!(tree.search(k).unwrap(), k % 2 == 1);
        }
    }
}

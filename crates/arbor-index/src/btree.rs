//! B-Tree of minimum degree `t`.
//!
//! Every node holds between `t - 1` and `2t - 1` keys (the root may
//! hold fewer) and an internal node with `n` keys has `n + 1` children.
//! All leaves sit at the same depth. Insertion splits full nodes on the
//! way down, so a leaf always has room; removal borrows from or merges
//! with a sibling on the way down, so a child always has at least `t`
//! keys before descent.

use crate::arena::{NodeArena, NodeId};
use crate::tree::{Key, OrderedIndex};
use arbor_common::{ArborError, IndexConfig, Phase, Probe, Result};
use std::mem;
use tracing::{debug, trace};

// ============================================================================
// Node
// ============================================================================

#[derive(Debug)]
struct BTreeNode<K> {
    keys: Vec<K>,
    /// Empty for leaves, `keys.len() + 1` entries for internal nodes.
    children: Vec<NodeId>,
}

impl<K> BTreeNode<K> {
    fn leaf() -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

// ============================================================================
// BTreeIndex
// ============================================================================

/// B-Tree over unique keys.
#[derive(Debug)]
pub struct BTreeIndex<K> {
    t: usize,
    arena: NodeArena<BTreeNode<K>>,
    root: Option<NodeId>,
    key_count: usize,
    probe: Probe,
}

impl<K: Key> BTreeIndex<K> {
    /// Creates an empty tree of minimum degree `t`. Degrees below 2 are
    /// rejected; a `t` of 1 would allow zero-key nodes.
    pub fn new(t: usize) -> Result<Self> {
        Self::with_probe(t, Probe::disabled())
    }

    /// Creates an empty tree reporting to `probe`.
    pub fn with_probe(t: usize, probe: Probe) -> Result<Self> {
        if t < 2 {
            return Err(ArborError::InvalidDegree { t });
        }
        Ok(Self {
            t,
            arena: NodeArena::with_capacity(64),
            root: None,
            key_count: 0,
            probe,
        })
    }

    /// Creates an empty tree sized by `config`.
    pub fn with_config(config: &IndexConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            t: config.min_degree,
            arena: NodeArena::with_capacity(config.initial_nodes),
            root: None,
            key_count: 0,
            probe: Probe::disabled(),
        })
    }

    /// Minimum degree.
    pub fn min_degree(&self) -> usize {
        self.t
    }

    /// Number of keys stored.
    pub fn len(&self) -> usize {
        self.key_count
    }

    /// True when no key is stored.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    fn max_keys(&self) -> usize {
        2 * self.t - 1
    }

    fn node(&self, id: NodeId) -> Result<&BTreeNode<K>> {
        self.arena
            .get(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("btree node {} missing", id.index())))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut BTreeNode<K>> {
        self.arena
            .get_mut(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("btree node {} missing", id.index())))
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Splits the full child at `parent.children[i]`. The median key
    /// moves up into the parent; the upper `t - 1` keys move into a new
    /// right sibling.
    fn split_child(&mut self, parent_id: NodeId, i: usize) -> Result<()> {
        let t = self.t;
        let child_id = *self
            .node(parent_id)?
            .children
            .get(i)
            .ok_or_else(|| ArborError::TreeCorrupted("split child index out of range".into()))?;
        self.probe.emit(child_id.as_u64(), Some(i), Phase::SplitBegin, || {
            "full node".to_string()
        });

        let child = self.node_mut(child_id)?;
        let right_keys = child.keys.split_off(t);
        let median = child
            .keys
            .pop()
            .ok_or_else(|| ArborError::TreeCorrupted("split of underfull node".into()))?;
        let right_children = if child.is_leaf() {
            Vec::new()
        } else {
            child.children.split_off(t)
        };

        let right_id = self.arena.alloc(BTreeNode {
            keys: right_keys,
            children: right_children,
        });
        let parent = self.node_mut(parent_id)?;
        parent.keys.insert(i, median);
        parent.children.insert(i + 1, right_id);

        debug!(median = ?median, "btree split");
        self.probe.emit(right_id.as_u64(), Some(i), Phase::SplitEnd, || {
            format!("median {median:?} moved up")
        });
        Ok(())
    }

    fn insert_non_full(&mut self, id: NodeId, key: K) -> Result<bool> {
        self.probe
            .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
        let node = self.node(id)?;
        let mut idx = node.keys.partition_point(|&k| k < key);
        if node.keys.get(idx) == Some(&key) {
            self.probe.emit(id.as_u64(), Some(idx), Phase::Outcome, || {
                format!("duplicate {key:?}")
            });
            return Ok(false);
        }

        if node.is_leaf() {
            self.node_mut(id)?.keys.insert(idx, key);
            return Ok(true);
        }

        let child = node.children[idx];
        if self.node(child)?.keys.len() == self.max_keys() {
            self.split_child(id, idx)?;
            // The split lifted a median into this node at `idx`; re-aim.
            let node = self.node(id)?;
            if node.keys[idx] == key {
                return Ok(false);
            }
            if node.keys[idx] < key {
                idx += 1;
            }
        }
        let child = self.node(id)?.children[idx];
        self.insert_non_full(child, key)
    }

    // ------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------

    fn max_key(&self, mut id: NodeId) -> Result<K> {
        loop {
            let node = self.node(id)?;
            match node.children.last() {
                Some(&last) => id = last,
                None => {
                    return node.keys.last().copied().ok_or_else(|| {
                        ArborError::TreeCorrupted("empty leaf on predecessor walk".into())
                    });
                }
            }
        }
    }

    fn min_key(&self, mut id: NodeId) -> Result<K> {
        loop {
            let node = self.node(id)?;
            match node.children.first() {
                Some(&first) => id = first,
                None => {
                    return node.keys.first().copied().ok_or_else(|| {
                        ArborError::TreeCorrupted("empty leaf on successor walk".into())
                    });
                }
            }
        }
    }

    /// Moves the last key of the left sibling through the separator into
    /// `parent.children[idx]`.
    fn borrow_from_prev(&mut self, parent_id: NodeId, idx: usize) -> Result<()> {
        let (sib_id, child_id) = {
            let parent = self.node(parent_id)?;
            (parent.children[idx - 1], parent.children[idx])
        };
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowBegin, || {
            "from left sibling".to_string()
        });

        let sib = self.node_mut(sib_id)?;
        let stolen_key = sib
            .keys
            .pop()
            .ok_or_else(|| ArborError::TreeCorrupted("borrow from empty sibling".into()))?;
        let stolen_child = sib.children.pop();

        let sep = mem::replace(&mut self.node_mut(parent_id)?.keys[idx - 1], stolen_key);
        let child = self.node_mut(child_id)?;
        child.keys.insert(0, sep);
        if let Some(c) = stolen_child {
            child.children.insert(0, c);
        }

        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowEnd, || {
            format!("separator {sep:?} moved down")
        });
        Ok(())
    }

    /// Moves the first key of the right sibling through the separator into
    /// `parent.children[idx]`.
    fn borrow_from_next(&mut self, parent_id: NodeId, idx: usize) -> Result<()> {
        let (sib_id, child_id) = {
            let parent = self.node(parent_id)?;
            (parent.children[idx + 1], parent.children[idx])
        };
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowBegin, || {
            "from right sibling".to_string()
        });

        let sib = self.node_mut(sib_id)?;
        if sib.keys.is_empty() {
            return Err(ArborError::TreeCorrupted("borrow from empty sibling".into()));
        }
        let stolen_key = sib.keys.remove(0);
        let stolen_child = if sib.is_leaf() {
            None
        } else {
            Some(sib.children.remove(0))
        };

        let sep = mem::replace(&mut self.node_mut(parent_id)?.keys[idx], stolen_key);
        let child = self.node_mut(child_id)?;
        child.keys.push(sep);
        if let Some(c) = stolen_child {
            child.children.push(c);
        }

        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowEnd, || {
            format!("separator {sep:?} moved down")
        });
        Ok(())
    }

    /// Merges `parent.children[idx + 1]` into `parent.children[idx]`,
    /// folding the separator key between them down.
    fn merge(&mut self, parent_id: NodeId, idx: usize) -> Result<()> {
        let (child_id, sib_id) = {
            let parent = self.node(parent_id)?;
            (parent.children[idx], parent.children[idx + 1])
        };
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::MergeBegin, || {
            "with right sibling".to_string()
        });

        let parent = self.node_mut(parent_id)?;
        let sep = parent.keys.remove(idx);
        parent.children.remove(idx + 1);

        let sib = self
            .arena
            .release(sib_id)
            .ok_or_else(|| ArborError::TreeCorrupted("merge sibling missing".into()))?;
        let child = self.node_mut(child_id)?;
        child.keys.push(sep);
        child.keys.extend(sib.keys);
        child.children.extend(sib.children);

        debug!(separator = ?sep, "btree merge");
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::MergeEnd, || {
            format!("separator {sep:?} folded in")
        });
        Ok(())
    }

    /// Tops up `parent.children[idx]` to at least `t` keys before descent.
    fn fill(&mut self, parent_id: NodeId, idx: usize) -> Result<()> {
        let parent = self.node(parent_id)?;
        let child_count = parent.children.len();
        let left_rich =
            idx > 0 && self.node(parent.children[idx - 1])?.keys.len() >= self.t;
        let right_rich = idx + 1 < child_count
            && self.node(parent.children[idx + 1])?.keys.len() >= self.t;

        if left_rich {
            self.borrow_from_prev(parent_id, idx)
        } else if right_rich {
            self.borrow_from_next(parent_id, idx)
        } else if idx + 1 < child_count {
            self.merge(parent_id, idx)
        } else {
            self.merge(parent_id, idx - 1)
        }
    }

    fn remove_at(&mut self, id: NodeId, target: K) -> Result<bool> {
        self.probe
            .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
        let node = self.node(id)?;
        let idx = node.keys.partition_point(|&k| k < target);
        let found = node.keys.get(idx) == Some(&target);

        if found {
            if node.is_leaf() {
                self.node_mut(id)?.keys.remove(idx);
                return Ok(true);
            }

            let left = node.children[idx];
            let right = node.children[idx + 1];
            if self.node(left)?.keys.len() >= self.t {
                // Replace with the in-order predecessor and delete it below.
                let pred = self.max_key(left)?;
                self.node_mut(id)?.keys[idx] = pred;
                self.remove_at(left, pred)?;
            } else if self.node(right)?.keys.len() >= self.t {
                let succ = self.min_key(right)?;
                self.node_mut(id)?.keys[idx] = succ;
                self.remove_at(right, succ)?;
            } else {
                // Both neighbors are minimal: merge and retry in the
                // combined node.
                self.merge(id, idx)?;
                self.remove_at(left, target)?;
            }
            return Ok(true);
        }

        if node.is_leaf() {
            return Ok(false);
        }

        // The key, if present, lives under children[idx]. A fill may merge
        // the last child leftward, which shifts the descent index.
        let was_last = idx == node.keys.len();
        let child = node.children[idx];
        if self.node(child)?.keys.len() < self.t {
            self.fill(id, idx)?;
        }
        let node = self.node(id)?;
        let idx = if was_last && idx > node.keys.len() {
            idx - 1
        } else {
            idx
        };
        let child = node.children[idx];
        self.remove_at(child, target)
    }

    /// Drops an empty root after removal, shrinking the height by one.
    fn collapse_root(&mut self) -> Result<()> {
        if let Some(root_id) = self.root {
            let root = self.node(root_id)?;
            if root.keys.is_empty() {
                let survivor = root.children.first().copied();
                self.root = survivor;
                self.arena.release(root_id);
                debug!("btree height shrunk");
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Range
    // ------------------------------------------------------------------

    fn range_at(&self, id: NodeId, begin: K, end: K) -> Result<bool> {
        self.probe
            .emit(id.as_u64(), None, Phase::Visit, || "range visit".to_string());
        let node = self.node(id)?;
        let mut found = false;
        for (i, &key) in node.keys.iter().enumerate() {
            // Child i holds keys below keys[i]; skip it once begin rules
            // it out.
            if !node.is_leaf() && begin < key {
                found |= self.range_at(node.children[i], begin, end)?;
            }
            if begin <= key && key <= end {
                found = true;
                self.probe.emit(id.as_u64(), Some(i), Phase::Outcome, || {
                    format!("{key:?} in range")
                });
            }
            if key > end {
                return Ok(found);
            }
        }
        if !node.is_leaf() {
            if let Some(&last) = node.keys.last() {
                if last < end {
                    found |= self.range_at(node.children[node.keys.len()], begin, end)?;
                }
            }
        }
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Invariant audit
    // ------------------------------------------------------------------

    /// Verifies the B-Tree properties, for tests and debugging: key
    /// count bounds, strict ordering within and across nodes, child
    /// fan-out, and uniform leaf depth.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(root) = self.root {
            self.audit_at(root, None, None, true)?;
        }
        Ok(())
    }

    /// Returns the leaf depth of the subtree at `id`.
    fn audit_at(
        &self,
        id: NodeId,
        min: Option<K>,
        max: Option<K>,
        is_root: bool,
    ) -> Result<usize> {
        let node = self.node(id)?;
        let min_keys = if is_root { 1 } else { self.t - 1 };
        if node.keys.len() < min_keys || node.keys.len() > self.max_keys() {
            return Err(ArborError::TreeCorrupted(format!(
                "node {} holds {} keys",
                id.index(),
                node.keys.len()
            )));
        }
        for window in node.keys.windows(2) {
            if window[0] >= window[1] {
                return Err(ArborError::TreeCorrupted(format!(
                    "unsorted keys in node {}",
                    id.index()
                )));
            }
        }
        if let (Some(min), Some(&first)) = (min, node.keys.first()) {
            if first <= min {
                return Err(ArborError::TreeCorrupted("separator order violation".into()));
            }
        }
        if let (Some(max), Some(&last)) = (max, node.keys.last()) {
            if last >= max {
                return Err(ArborError::TreeCorrupted("separator order violation".into()));
            }
        }
        if node.is_leaf() {
            return Ok(0);
        }
        if node.children.len() != node.keys.len() + 1 {
            return Err(ArborError::TreeCorrupted(format!(
                "node {} has {} keys but {} children",
                id.index(),
                node.keys.len(),
                node.children.len()
            )));
        }
        let mut depth = None;
        for (i, &child) in node.children.iter().enumerate() {
            let lo = if i == 0 { min } else { Some(node.keys[i - 1]) };
            let hi = node.keys.get(i).copied().or(max);
            let child_depth = self.audit_at(child, lo, hi, false)?;
            if *depth.get_or_insert(child_depth) != child_depth {
                return Err(ArborError::TreeCorrupted("ragged leaf depth".into()));
            }
        }
        Ok(depth.unwrap_or(0) + 1)
    }
}

impl<K: Key> OrderedIndex<K> for BTreeIndex<K> {
    fn insert(&mut self, key: K) -> Result<bool> {
        trace!(key = ?key, "btree insert");
        let Some(root) = self.root else {
            let mut node = BTreeNode::leaf();
            node.keys.push(key);
            self.root = Some(self.arena.alloc(node));
            self.key_count += 1;
            return Ok(true);
        };

        if self.node(root)?.keys.len() == self.max_keys() {
            // Grow upward: a fresh root with the old one as its only
            // child, then split.
            let new_root = self.arena.alloc(BTreeNode {
                keys: Vec::new(),
                children: vec![root],
            });
            self.root = Some(new_root);
            self.split_child(new_root, 0)?;
            debug!("btree height grown");
        }

        let root = self
            .root
            .ok_or_else(|| ArborError::TreeCorrupted("root vanished during insert".into()))?;
        let inserted = self.insert_non_full(root, key)?;
        if inserted {
            self.key_count += 1;
        }
        Ok(inserted)
    }

    fn search(&self, target: K) -> Result<bool> {
        let mut current = self.root;
        while let Some(id) = current {
            self.probe
                .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
            let node = self.node(id)?;
            let idx = node.keys.partition_point(|&k| k < target);
            if node.keys.get(idx) == Some(&target) {
                self.probe.emit(id.as_u64(), Some(idx), Phase::Outcome, || {
                    format!("found {target:?}")
                });
                return Ok(true);
            }
            if node.is_leaf() {
                return Ok(false);
            }
            current = Some(node.children[idx]);
        }
        Ok(false)
    }

    fn remove(&mut self, target: K) -> Result<bool> {
        trace!(key = ?target, "btree remove");
        let Some(root) = self.root else {
            return Ok(false);
        };
        let removed = self.remove_at(root, target)?;
        self.collapse_root()?;
        if removed {
            self.key_count -= 1;
        }
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

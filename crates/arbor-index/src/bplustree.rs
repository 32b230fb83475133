//! B+-Tree of minimum degree `t`.
//!
//! Every key lives in a leaf; internal nodes hold copied separators
//! that only route. Leaves are threaded into a singly linked chain in
//! ascending order, so a range scan descends once and then walks
//! sideways. Routing is by `key >= separator` goes right: the separator
//! equals the first key of the subtree to its right at the time it was
//! copied up. A separator may outlive its key after removals; it still
//! partitions correctly, so it is left in place.
//!
//! Splitting a leaf copies the right half's first key up; splitting an
//! internal node moves the median up, exactly as in the B-Tree.

use crate::arena::{NodeArena, NodeId};
use crate::tree::{Key, OrderedIndex};
use arbor_common::{ArborError, IndexConfig, Phase, Probe, Result};
use std::mem;
use tracing::{debug, trace};

// ============================================================================
// Node
// ============================================================================

#[derive(Debug)]
struct BPlusNode<K> {
    keys: Vec<K>,
    /// Empty for leaves, `keys.len() + 1` entries for internal nodes.
    children: Vec<NodeId>,
    /// Right neighbor in the leaf chain. Always `None` for internal nodes.
    next: Option<NodeId>,
}

impl<K> BPlusNode<K> {
    fn leaf() -> Self {
        Self {
            keys: Vec::new(),
            children: Vec::new(),
            next: None,
        }
    }

    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Index of the child that owns `key`: the count of separators at
    /// or below it.
    fn route(&self, key: K) -> usize
    where
        K: Key,
    {
        self.keys.partition_point(|&sep| sep <= key)
    }
}

// ============================================================================
// BPlusIndex
// ============================================================================

/// B+-Tree over unique keys.
#[derive(Debug)]
pub struct BPlusIndex<K> {
    t: usize,
    arena: NodeArena<BPlusNode<K>>,
    root: Option<NodeId>,
    key_count: usize,
    probe: Probe,
}

impl<K: Key> BPlusIndex<K> {
    /// Creates an empty tree of minimum degree `t`. Degrees below 2 are
    /// rejected.
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
        self.key_count == 0
    }

    fn max_keys(&self) -> usize {
        2 * self.t - 1
    }

    fn node(&self, id: NodeId) -> Result<&BPlusNode<K>> {
        self.arena
            .get(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("b+tree node {} missing", id.index())))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut BPlusNode<K>> {
        self.arena
            .get_mut(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("b+tree node {} missing", id.index())))
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Splits the full child at `parent.children[i]`. A leaf keeps its
    /// lower `t - 1` keys and copies the right half's first key up as a
    /// separator; an internal node moves its median up.
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
        let (sep, right) = if child.is_leaf() {
            let right_keys = child.keys.split_off(t - 1);
            let sep = *right_keys.first().ok_or_else(|| {
                ArborError::TreeCorrupted("split of underfull leaf".into())
            })?;
            // The new leaf slots into the chain after the old one.
            let next = child.next;
            (
                sep,
                BPlusNode {
                    keys: right_keys,
                    children: Vec::new(),
                    next,
                },
            )
        } else {
            let right_keys = child.keys.split_off(t);
            let sep = child
                .keys
                .pop()
                .ok_or_else(|| ArborError::TreeCorrupted("split of underfull node".into()))?;
            let right_children = child.children.split_off(t);
            (
                sep,
                BPlusNode {
                    keys: right_keys,
                    children: right_children,
                    next: None,
                },
            )
        };
        let right_is_leaf = right.is_leaf();

        let right_id = self.arena.alloc(right);
        if right_is_leaf {
            self.node_mut(child_id)?.next = Some(right_id);
        }
        let parent = self.node_mut(parent_id)?;
        parent.keys.insert(i, sep);
        parent.children.insert(i + 1, right_id);

        debug!(separator = ?sep, leaf = right_is_leaf, "b+tree split");
        self.probe.emit(right_id.as_u64(), Some(i), Phase::SplitEnd, || {
            format!("separator {sep:?} moved up")
        });
        Ok(())
    }

    fn insert_non_full(&mut self, id: NodeId, key: K) -> Result<bool> {
        self.probe
            .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
        let node = self.node(id)?;
        if node.is_leaf() {
            let idx = node.keys.partition_point(|&k| k < key);
            if node.keys.get(idx) == Some(&key) {
                self.probe.emit(id.as_u64(), Some(idx), Phase::Outcome, || {
                    format!("duplicate {key:?}")
                });
                return Ok(false);
            }
            self.node_mut(id)?.keys.insert(idx, key);
            return Ok(true);
        }

        let mut idx = node.route(key);
        let child = node.children[idx];
        if self.node(child)?.keys.len() == self.max_keys() {
            self.split_child(id, idx)?;
            // A separator landed at `idx`; keys at or above it go right.
            if self.node(id)?.keys[idx] <= key {
                idx += 1;
            }
        }
        let child = self.node(id)?.children[idx];
        self.insert_non_full(child, key)
    }

    // ------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------

    /// Moves a key from the left sibling into `parent.children[idx]`.
    /// Between leaves the key moves directly and the separator is
    /// refreshed; between internal nodes it rotates through the
    /// separator.
    fn borrow_from_prev(&mut self, parent_id: NodeId, idx: usize) -> Result<()> {
        let (sib_id, child_id) = {
            let parent = self.node(parent_id)?;
            (parent.children[idx - 1], parent.children[idx])
        };
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowBegin, || {
            "from left sibling".to_string()
        });

        let sib = self.node_mut(sib_id)?;
        let leaf = sib.is_leaf();
        let stolen_key = sib
            .keys
            .pop()
            .ok_or_else(|| ArborError::TreeCorrupted("borrow from empty sibling".into()))?;
        let stolen_child = sib.children.pop();

        if leaf {
            let child = self.node_mut(child_id)?;
            child.keys.insert(0, stolen_key);
            self.node_mut(parent_id)?.keys[idx - 1] = stolen_key;
        } else {
            let sep = mem::replace(&mut self.node_mut(parent_id)?.keys[idx - 1], stolen_key);
            let child = self.node_mut(child_id)?;
            child.keys.insert(0, sep);
            if let Some(c) = stolen_child {
                child.children.insert(0, c);
            }
        }

        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowEnd, || {
            format!("{stolen_key:?} moved over")
        });
        Ok(())
    }

    /// Mirror of [`borrow_from_prev`](Self::borrow_from_prev), taking
    /// from the right sibling.
    fn borrow_from_next(&mut self, parent_id: NodeId, idx: usize) -> Result<()> {
        let (sib_id, child_id) = {
            let parent = self.node(parent_id)?;
            (parent.children[idx + 1], parent.children[idx])
        };
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowBegin, || {
            "from right sibling".to_string()
        });

        let sib = self.node_mut(sib_id)?;
        let leaf = sib.is_leaf();
        if sib.keys.is_empty() {
            return Err(ArborError::TreeCorrupted("borrow from empty sibling".into()));
        }
        let stolen_key = sib.keys.remove(0);
        let stolen_child = if leaf {
            None
        } else {
            Some(sib.children.remove(0))
        };
        let sib_new_first = sib.keys.first().copied();

        if leaf {
            self.node_mut(child_id)?.keys.push(stolen_key);
            let new_sep = sib_new_first
                .ok_or_else(|| ArborError::TreeCorrupted("borrow emptied sibling".into()))?;
            self.node_mut(parent_id)?.keys[idx] = new_sep;
        } else {
            let sep = mem::replace(&mut self.node_mut(parent_id)?.keys[idx], stolen_key);
            let child = self.node_mut(child_id)?;
            child.keys.push(sep);
            if let Some(c) = stolen_child {
                child.children.push(c);
            }
        }

        self.probe.emit(child_id.as_u64(), Some(idx), Phase::BorrowEnd, || {
            format!("{stolen_key:?} moved over")
        });
        Ok(())
    }

    /// Merges `parent.children[idx + 1]` into `parent.children[idx]`.
    /// Between leaves the separator is a copy and is simply dropped,
    /// and the chain link skips the absorbed leaf; between internal
    /// nodes the separator folds down.
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
        if child.is_leaf() {
            child.keys.extend(sib.keys);
            child.next = sib.next;
        } else {
            child.keys.push(sep);
            child.keys.extend(sib.keys);
            child.children.extend(sib.children);
        }

        debug!(separator = ?sep, "b+tree merge");
        self.probe.emit(child_id.as_u64(), Some(idx), Phase::MergeEnd, || {
            format!("separator {sep:?} dropped")
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
        if node.is_leaf() {
            return match node.keys.binary_search(&target) {
                Ok(idx) => {
                    self.node_mut(id)?.keys.remove(idx);
                    Ok(true)
                }
                Err(_) => Ok(false),
            };
        }

        // The target, if present, lives under the routed child even when
        // it equals a separator.
        let idx = node.route(target);
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

    /// Drops a childless-key root after removal.
    fn collapse_root(&mut self) -> Result<()> {
        if let Some(root_id) = self.root {
            let root = self.node(root_id)?;
            if root.is_leaf() {
                if root.keys.is_empty() {
                    self.root = None;
                    self.arena.release(root_id);
                }
            } else if root.keys.is_empty() {
                let survivor = root.children.first().copied();
                self.root = survivor;
                self.arena.release(root_id);
                debug!("b+tree height shrunk");
            }
        }
        Ok(())
    }

    /// Leftmost leaf, the head of the chain.
    fn first_leaf(&self) -> Result<Option<NodeId>> {
        let Some(mut current) = self.root else {
            return Ok(None);
        };
        loop {
            let node = self.node(current)?;
            match node.children.first() {
                Some(&first) => current = first,
                None => return Ok(Some(current)),
            }
        }
    }

    // ------------------------------------------------------------------
    // Invariant audit
    // ------------------------------------------------------------------

    /// Verifies the B+-Tree properties, for tests and debugging: key
    /// count bounds, fan-out, uniform leaf depth, routing bounds
    /// (child keys below a separator are strictly smaller, at or above
    /// it to the right), and an ascending leaf chain covering every key.
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(root) = self.root {
            self.audit_at(root, None, None, true)?;
        }

        // Walk the chain: strictly ascending, covering exactly key_count.
        let mut seen = 0usize;
        let mut previous: Option<K> = None;
        let mut leaf = self.first_leaf()?;
        while let Some(id) = leaf {
            let node = self.node(id)?;
            if !node.is_leaf() {
                return Err(ArborError::TreeCorrupted("internal node in leaf chain".into()));
            }
            for &key in &node.keys {
                if let Some(prev) = previous {
                    if key <= prev {
                        return Err(ArborError::TreeCorrupted("leaf chain out of order".into()));
                    }
                }
                previous = Some(key);
                seen += 1;
            }
            leaf = node.next;
        }
        if seen != self.key_count {
            return Err(ArborError::TreeCorrupted(format!(
                "leaf chain holds {} keys, expected {}",
                seen, self.key_count
            )));
        }
        Ok(())
    }

    /// Returns the leaf depth of the subtree at `id`. `min` is an
    /// inclusive lower bound, `max` an exclusive upper bound.
    fn audit_at(
        &self,
        id: NodeId,
        min: Option<K>,
        max: Option<K>,
        is_root: bool,
    ) -> Result<usize> {
        let node = self.node(id)?;
        if !is_root && (node.keys.len() < self.t - 1 || node.keys.len() > self.max_keys()) {
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
        if node.is_leaf() {
            for &key in &node.keys {
                if min.is_some_and(|lo| key < lo) || max.is_some_and(|hi| key >= hi) {
                    return Err(ArborError::TreeCorrupted(format!(
                        "leaf key {key:?} outside its routed range"
                    )));
                }
            }
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
        if node.next.is_some() {
            return Err(ArborError::TreeCorrupted("internal node with chain link".into()));
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

impl<K: Key> OrderedIndex<K> for BPlusIndex<K> {
    fn insert(&mut self, key: K) -> Result<bool> {
        trace!(key = ?key, "b+tree insert");
        let Some(root) = self.root else {
            let mut node = BPlusNode::leaf();
            node.keys.push(key);
            self.root = Some(self.arena.alloc(node));
            self.key_count += 1;
            return Ok(true);
        };

        if self.node(root)?.keys.len() == self.max_keys() {
            let new_root = self.arena.alloc(BPlusNode {
                keys: Vec::new(),
                children: vec![root],
                next: None,
            });
            self.root = Some(new_root);
            self.split_child(new_root, 0)?;
            debug!("b+tree height grown");
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
        let Some(mut current) = self.root else {
            return Ok(false);
        };
        loop {
            self.probe
                .emit(current.as_u64(), None, Phase::Visit, || "descend".to_string());
            let node = self.node(current)?;
            if node.is_leaf() {
                // Separators only route; the leaf is authoritative.
                let found = node.keys.binary_search(&target).is_ok();
                if found {
                    self.probe.emit(current.as_u64(), None, Phase::Outcome, || {
                        format!("found {target:?}")
                    });
                }
                return Ok(found);
            }
            current = node.children[node.route(target)];
        }
    }

    fn remove(&mut self, target: K) -> Result<bool> {
        trace!(key = ?target, "b+tree remove");
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
        let Some(mut current) = self.root else {
            return Ok(false);
        };

        // One descent to the leaf that would hold `begin`.
        loop {
            self.probe
                .emit(current.as_u64(), None, Phase::Visit, || "range descend".to_string());
            let node = self.node(current)?;
            if node.is_leaf() {
                break;
            }
            current = node.children[node.route(begin)];
        }

        // Then a sideways walk along the chain.
        let mut found = false;
        let mut leaf = Some(current);
        while let Some(id) = leaf {
            self.probe
                .emit(id.as_u64(), None, Phase::Visit, || "range scan".to_string());
            let node = self.node(id)?;
            for (i, &key) in node.keys.iter().enumerate() {
                if key > end {
                    return Ok(found);
                }
                if key >= begin {
                    found = true;
                    self.probe.emit(id.as_u64(), Some(i), Phase::Outcome, || {
                        format!("{key:?} in range")
                    });
                }
            }
            leaf = node.next;
        }
        Ok(found)
    }
}

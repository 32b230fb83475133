//! Red-black tree.
//!
//! Self-balancing binary search tree. Every node is red or black, the
//! root is black, a red node never has a red child, and every root-to-nil
//! path carries the same number of black nodes. Insertion and deletion
//! restore these properties with recoloring and at most a constant
//! number of rotations per level.
//!
//! Nil is represented by `Option::None` rather than a shared sentinel
//! node, so the deletion fix-up threads the parent of the (possibly
//! absent) replacement node explicitly.

use crate::arena::{NodeArena, NodeId};
use crate::tree::{Key, OrderedIndex};
use arbor_common::{ArborError, IndexConfig, Phase, Probe, Result};
use std::cmp::Ordering;
use tracing::trace;

// ============================================================================
// Node
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

#[derive(Debug)]
struct RbNode<K> {
    key: K,
    color: Color,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

// ============================================================================
// RbIndex
// ============================================================================

/// Red-black tree over unique keys.
#[derive(Debug)]
pub struct RbIndex<K> {
    arena: NodeArena<RbNode<K>>,
    root: Option<NodeId>,
    probe: Probe,
}

impl<K: Key> Default for RbIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> RbIndex<K> {
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

    // ------------------------------------------------------------------
    // Node access
    // ------------------------------------------------------------------

    fn node(&self, id: NodeId) -> Result<&RbNode<K>> {
        self.arena
            .get(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("rb node {} missing", id.index())))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut RbNode<K>> {
        self.arena
            .get_mut(id)
            .ok_or_else(|| ArborError::TreeCorrupted(format!("rb node {} missing", id.index())))
    }

    /// Color of a possibly-nil node. Nil counts as black.
    fn color(&self, id: Option<NodeId>) -> Result<Color> {
        match id {
            Some(id) => Ok(self.node(id)?.color),
            None => Ok(Color::Black),
        }
    }

    fn set_color(&mut self, id: NodeId, color: Color) -> Result<()> {
        self.node_mut(id)?.color = color;
        Ok(())
    }

    fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    fn left(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.left)
    }

    fn right(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.right)
    }

    fn set_parent(&mut self, id: Option<NodeId>, parent: Option<NodeId>) -> Result<()> {
        if let Some(id) = id {
            self.node_mut(id)?.parent = parent;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Rotations
    // ------------------------------------------------------------------

    fn left_rotate(&mut self, x: NodeId) -> Result<()> {
        self.probe
            .emit(x.as_u64(), None, Phase::RotateBegin, || "left".to_string());
        let y = self
            .right(x)?
            .ok_or_else(|| ArborError::TreeCorrupted("left rotate without right child".into()))?;

        let y_left = self.left(y)?;
        self.node_mut(x)?.right = y_left;
        self.set_parent(y_left, Some(x))?;

        let x_parent = self.parent(x)?;
        self.node_mut(y)?.parent = x_parent;
        match x_parent {
            None => self.root = Some(y),
            Some(p) => {
                let parent = self.node_mut(p)?;
                if parent.left == Some(x) {
                    parent.left = Some(y);
                } else {
                    parent.right = Some(y);
                }
            }
        }

        self.node_mut(y)?.left = Some(x);
        self.node_mut(x)?.parent = Some(y);
        self.probe
            .emit(y.as_u64(), None, Phase::RotateEnd, || "left".to_string());
        Ok(())
    }

    fn right_rotate(&mut self, x: NodeId) -> Result<()> {
        self.probe
            .emit(x.as_u64(), None, Phase::RotateBegin, || "right".to_string());
        let y = self
            .left(x)?
            .ok_or_else(|| ArborError::TreeCorrupted("right rotate without left child".into()))?;

        let y_right = self.right(y)?;
        self.node_mut(x)?.left = y_right;
        self.set_parent(y_right, Some(x))?;

        let x_parent = self.parent(x)?;
        self.node_mut(y)?.parent = x_parent;
        match x_parent {
            None => self.root = Some(y),
            Some(p) => {
                let parent = self.node_mut(p)?;
                if parent.right == Some(x) {
                    parent.right = Some(y);
                } else {
                    parent.left = Some(y);
                }
            }
        }

        self.node_mut(y)?.right = Some(x);
        self.node_mut(x)?.parent = Some(y);
        self.probe
            .emit(y.as_u64(), None, Phase::RotateEnd, || "right".to_string());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Insert fix-up
    // ------------------------------------------------------------------

    fn insert_fixup(&mut self, mut z: NodeId) -> Result<()> {
        while self.color(self.parent(z)?)? == Color::Red {
            // A red parent is never the root, so the grandparent exists.
            let p = self
                .parent(z)?
                .ok_or_else(|| ArborError::TreeCorrupted("red node without parent".into()))?;
            let g = self
                .parent(p)?
                .ok_or_else(|| ArborError::TreeCorrupted("red parent without grandparent".into()))?;

            if self.left(g)? == Some(p) {
                let uncle = self.right(g)?;
                if self.color(uncle)? == Color::Red {
                    // Case 1: red uncle, recolor and continue from the
                    // grandparent.
                    self.probe.emit(g.as_u64(), None, Phase::FixupCase, || {
                        "insert case 1: red uncle".to_string()
                    });
                    self.set_color(p, Color::Black)?;
                    if let Some(u) = uncle {
                        self.set_color(u, Color::Black)?;
                    }
                    self.set_color(g, Color::Red)?;
                    z = g;
                } else {
                    if self.right(p)? == Some(z) {
                        // Case 2: triangle, rotate into a line.
                        self.probe.emit(p.as_u64(), None, Phase::FixupCase, || {
                            "insert case 2: left-right triangle".to_string()
                        });
                        z = p;
                        self.left_rotate(z)?;
                    }
                    // Case 3: line, recolor and rotate the grandparent.
                    let p = self
                        .parent(z)?
                        .ok_or_else(|| ArborError::TreeCorrupted("fixup lost parent".into()))?;
                    let g = self
                        .parent(p)?
                        .ok_or_else(|| ArborError::TreeCorrupted("fixup lost grandparent".into()))?;
                    self.probe.emit(g.as_u64(), None, Phase::FixupCase, || {
                        "insert case 3: left-left line".to_string()
                    });
                    self.set_color(p, Color::Black)?;
                    self.set_color(g, Color::Red)?;
                    self.right_rotate(g)?;
                }
            } else {
                // Mirror image.
                let uncle = self.left(g)?;
                if self.color(uncle)? == Color::Red {
                    self.probe.emit(g.as_u64(), None, Phase::FixupCase, || {
                        "insert case 1: red uncle".to_string()
                    });
                    self.set_color(p, Color::Black)?;
                    if let Some(u) = uncle {
                        self.set_color(u, Color::Black)?;
                    }
                    self.set_color(g, Color::Red)?;
                    z = g;
                } else {
                    if self.left(p)? == Some(z) {
                        self.probe.emit(p.as_u64(), None, Phase::FixupCase, || {
                            "insert case 2: right-left triangle".to_string()
                        });
                        z = p;
                        self.right_rotate(z)?;
                    }
                    let p = self
                        .parent(z)?
                        .ok_or_else(|| ArborError::TreeCorrupted("fixup lost parent".into()))?;
                    let g = self
                        .parent(p)?
                        .ok_or_else(|| ArborError::TreeCorrupted("fixup lost grandparent".into()))?;
                    self.probe.emit(g.as_u64(), None, Phase::FixupCase, || {
                        "insert case 3: right-right line".to_string()
                    });
                    self.set_color(p, Color::Black)?;
                    self.set_color(g, Color::Red)?;
                    self.left_rotate(g)?;
                }
            }
        }

        if let Some(root) = self.root {
            self.set_color(root, Color::Black)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    fn find(&self, target: K) -> Result<Option<NodeId>> {
        let mut current = self.root;
        while let Some(id) = current {
            self.probe
                .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
            let node = self.node(id)?;
            match target.cmp(&node.key) {
                Ordering::Equal => return Ok(Some(id)),
                Ordering::Less => current = node.left,
                Ordering::Greater => current = node.right,
            }
        }
        Ok(None)
    }

    fn minimum(&self, mut id: NodeId) -> Result<NodeId> {
        while let Some(left) = self.left(id)? {
            id = left;
        }
        Ok(id)
    }

    /// Replaces the subtree rooted at `u` with the subtree rooted at `v`.
    fn transplant(&mut self, u: NodeId, v: Option<NodeId>) -> Result<()> {
        let u_parent = self.parent(u)?;
        match u_parent {
            None => self.root = v,
            Some(p) => {
                let parent = self.node_mut(p)?;
                if parent.left == Some(u) {
                    parent.left = v;
                } else {
                    parent.right = v;
                }
            }
        }
        self.set_parent(v, u_parent)
    }

    /// Restores the black-height after removing a black node. `x` is the
    /// node that took the removed node's place (possibly nil) and
    /// `x_parent` its parent, threaded explicitly because nil has no
    /// parent pointer.
    fn delete_fixup(&mut self, mut x: Option<NodeId>, mut x_parent: Option<NodeId>) -> Result<()> {
        while x != self.root && self.color(x)? == Color::Black {
            let p = x_parent
                .ok_or_else(|| ArborError::TreeCorrupted("non-root fixup node without parent".into()))?;

            if self.left(p)? == x {
                let mut w = self
                    .right(p)?
                    .ok_or_else(|| ArborError::TreeCorrupted("double-black without sibling".into()))?;

                if self.color(Some(w))? == Color::Red {
                    // Case 1: red sibling, rotate it up.
                    self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                        "delete case 1: red sibling".to_string()
                    });
                    self.set_color(w, Color::Black)?;
                    self.set_color(p, Color::Red)?;
                    self.left_rotate(p)?;
                    w = self
                        .right(p)?
                        .ok_or_else(|| ArborError::TreeCorrupted("double-black without sibling".into()))?;
                }

                let w_left = self.left(w)?;
                let w_right = self.right(w)?;
                if self.color(w_left)? == Color::Black && self.color(w_right)? == Color::Black {
                    // Case 2: both nephews black, push the deficit up.
                    self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                        "delete case 2: black sibling, black nephews".to_string()
                    });
                    self.set_color(w, Color::Red)?;
                    x = Some(p);
                    x_parent = self.parent(p)?;
                } else {
                    if self.color(w_right)? == Color::Black {
                        // Case 3: near nephew red, rotate the sibling.
                        self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                            "delete case 3: red near nephew".to_string()
                        });
                        if let Some(wl) = w_left {
                            self.set_color(wl, Color::Black)?;
                        }
                        self.set_color(w, Color::Red)?;
                        self.right_rotate(w)?;
                        w = self
                            .right(p)?
                            .ok_or_else(|| ArborError::TreeCorrupted("double-black without sibling".into()))?;
                    }
                    // Case 4: far nephew red, terminal rotation.
                    self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                        "delete case 4: red far nephew".to_string()
                    });
                    let p_color = self.node(p)?.color;
                    self.set_color(w, p_color)?;
                    self.set_color(p, Color::Black)?;
                    if let Some(wr) = self.right(w)? {
                        self.set_color(wr, Color::Black)?;
                    }
                    self.left_rotate(p)?;
                    x = self.root;
                    x_parent = None;
                }
            } else {
                // Mirror image.
                let mut w = self
                    .left(p)?
                    .ok_or_else(|| ArborError::TreeCorrupted("double-black without sibling".into()))?;

                if self.color(Some(w))? == Color::Red {
                    self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                        "delete case 1: red sibling".to_string()
                    });
                    self.set_color(w, Color::Black)?;
                    self.set_color(p, Color::Red)?;
                    self.right_rotate(p)?;
                    w = self
                        .left(p)?
                        .ok_or_else(|| ArborError::TreeCorrupted("double-black without sibling".into()))?;
                }

                let w_left = self.left(w)?;
                let w_right = self.right(w)?;
                if self.color(w_left)? == Color::Black && self.color(w_right)? == Color::Black {
                    self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                        "delete case 2: black sibling, black nephews".to_string()
                    });
                    self.set_color(w, Color::Red)?;
                    x = Some(p);
                    x_parent = self.parent(p)?;
                } else {
                    if self.color(w_left)? == Color::Black {
                        self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                            "delete case 3: red near nephew".to_string()
                        });
                        if let Some(wr) = w_right {
                            self.set_color(wr, Color::Black)?;
                        }
                        self.set_color(w, Color::Red)?;
                        self.left_rotate(w)?;
                        w = self
                            .left(p)?
                            .ok_or_else(|| ArborError::TreeCorrupted("double-black without sibling".into()))?;
                    }
                    self.probe.emit(w.as_u64(), None, Phase::FixupCase, || {
                        "delete case 4: red far nephew".to_string()
                    });
                    let p_color = self.node(p)?.color;
                    self.set_color(w, p_color)?;
                    self.set_color(p, Color::Black)?;
                    if let Some(wl) = self.left(w)? {
                        self.set_color(wl, Color::Black)?;
                    }
                    self.right_rotate(p)?;
                    x = self.root;
                    x_parent = None;
                }
            }
        }

        if let Some(x) = x {
            self.set_color(x, Color::Black)?;
        }
        Ok(())
    }

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

    // ------------------------------------------------------------------
    // Invariant audit
    // ------------------------------------------------------------------

    /// Verifies the red-black properties, for tests and debugging:
    /// black root, no red node with a red child, equal black count on
    /// every root-to-nil path, and search-tree ordering.
    pub fn check_invariants(&self) -> Result<()> {
        if self.color(self.root)? != Color::Black {
            return Err(ArborError::TreeCorrupted("red root".into()));
        }
        if let Some(root) = self.root {
            self.audit_at(root, None, None)?;
        }
        Ok(())
    }

    /// Returns the black height of the subtree at `id`.
    fn audit_at(&self, id: NodeId, min: Option<K>, max: Option<K>) -> Result<usize> {
        let node = self.node(id)?;
        if let Some(min) = min {
            if node.key <= min {
                return Err(ArborError::TreeCorrupted(format!(
                    "order violation at node {}",
                    id.index()
                )));
            }
        }
        if let Some(max) = max {
            if node.key >= max {
                return Err(ArborError::TreeCorrupted(format!(
                    "order violation at node {}",
                    id.index()
                )));
            }
        }
        if node.color == Color::Red
            && (self.color(node.left)? == Color::Red || self.color(node.right)? == Color::Red)
        {
            return Err(ArborError::TreeCorrupted(format!(
                "red node {} with red child",
                id.index()
            )));
        }
        let left_height = match node.left {
            Some(left) => self.audit_at(left, min, Some(node.key))?,
            None => 1,
        };
        let right_height = match node.right {
            Some(right) => self.audit_at(right, Some(node.key), max)?,
            None => 1,
        };
        if left_height != right_height {
            return Err(ArborError::TreeCorrupted(format!(
                "black height mismatch at node {}",
                id.index()
            )));
        }
        Ok(left_height + usize::from(node.color == Color::Black))
    }
}

impl<K: Key> OrderedIndex<K> for RbIndex<K> {
    fn insert(&mut self, key: K) -> Result<bool> {
        trace!(key = ?key, "rb insert");
        let mut parent = None;
        let mut current = self.root;
        while let Some(id) = current {
            self.probe
                .emit(id.as_u64(), None, Phase::Visit, || "descend".to_string());
            let node = self.node(id)?;
            parent = Some(id);
            match key.cmp(&node.key) {
                Ordering::Equal => {
                    self.probe.emit(id.as_u64(), None, Phase::Outcome, || {
                        format!("duplicate {key:?}")
                    });
                    return Ok(false);
                }
                Ordering::Less => current = node.left,
                Ordering::Greater => current = node.right,
            }
        }

        // New nodes start red so only the red-red property can break.
        let z = self.arena.alloc(RbNode {
            key,
            color: Color::Red,
            parent,
            left: None,
            right: None,
        });
        match parent {
            None => self.root = Some(z),
            Some(p) => {
                let parent_node = self.node_mut(p)?;
                if key < parent_node.key {
                    parent_node.left = Some(z);
                } else {
                    parent_node.right = Some(z);
                }
            }
        }

        self.insert_fixup(z)?;
        Ok(true)
    }

    fn search(&self, target: K) -> Result<bool> {
        match self.find(target)? {
            Some(id) => {
                self.probe
                    .emit(id.as_u64(), None, Phase::Outcome, || format!("found {target:?}"));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&mut self, target: K) -> Result<bool> {
        trace!(key = ?target, "rb remove");
        let Some(z) = self.find(target)? else {
            return Ok(false);
        };

        let z_node = self.node(z)?;
        let (z_left, z_right) = (z_node.left, z_node.right);
        let mut y_color = z_node.color;
        let x;
        let x_parent;

        match (z_left, z_right) {
            (None, _) => {
                x = z_right;
                x_parent = self.parent(z)?;
                self.transplant(z, z_right)?;
            }
            (_, None) => {
                x = z_left;
                x_parent = self.parent(z)?;
                self.transplant(z, z_left)?;
            }
            (Some(_), Some(right)) => {
                // Two children: splice out the in-order successor and move
                // it into z's position with z's color.
                let y = self.minimum(right)?;
                y_color = self.node(y)?.color;
                x = self.right(y)?;
                if self.parent(y)? == Some(z) {
                    x_parent = Some(y);
                } else {
                    x_parent = self.parent(y)?;
                    let y_right = self.right(y)?;
                    self.transplant(y, y_right)?;
                    self.node_mut(y)?.right = Some(right);
                    self.set_parent(Some(right), Some(y))?;
                }
                self.transplant(z, Some(y))?;
                self.node_mut(y)?.left = z_left;
                self.set_parent(z_left, Some(y))?;
                let z_color = self.node(z)?.color;
                self.set_color(y, z_color)?;
            }
        }

        self.arena.release(z);
        if y_color == Color::Black {
            self.delete_fixup(x, x_parent)?;
        }
        Ok(true)
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

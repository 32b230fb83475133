//! Slot-indexed node storage shared by all tree engines.
//!
//! Nodes live in a `Vec<Option<N>>`; a [`NodeId`] is an index into that
//! vector. Released slots go onto a free list and are reused by later
//! allocations, so identifiers stay dense across heavy insert/remove
//! churn. A `None` slot reached through a live link means the tree is
//! corrupted; engines surface that as `ArborError::TreeCorrupted`
//! rather than panicking.

// ============================================================================
// NodeId
// ============================================================================

/// Identifier of a node slot within a [`NodeArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    /// Creates a node id from a raw slot index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the slot index.
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Returns the id widened for trace events.
    pub fn as_u64(&self) -> u64 {
        u64::from(self.0)
    }
}

// ============================================================================
// NodeArena
// ============================================================================

/// Growable arena of tree nodes with slot reuse.
#[derive(Debug)]
pub struct NodeArena<N> {
    nodes: Vec<Option<N>>,
    free: Vec<u32>,
}

impl<N> NodeArena<N> {
    /// Creates an empty arena with room for `capacity` nodes before
    /// reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
        }
    }

    /// Stores a node and returns its id, reusing a released slot when
    /// one is available.
    pub fn alloc(&mut self, node: N) -> NodeId {
        if let Some(index) = self.free.pop() {
            self.nodes[index as usize] = Some(node);
            NodeId(index)
        } else {
            let index = self.nodes.len() as u32;
            self.nodes.push(Some(node));
            NodeId(index)
        }
    }

    /// Releases a slot for reuse, returning the node if it was live.
    pub fn release(&mut self, id: NodeId) -> Option<N> {
        let slot = self.nodes.get_mut(id.index())?;
        let node = slot.take();
        if node.is_some() {
            self.free.push(id.0);
        }
        node
    }

    /// Returns the node at `id`, or `None` for a released/out-of-range slot.
    pub fn get(&self, id: NodeId) -> Option<&N> {
        self.nodes.get(id.index())?.as_ref()
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut N> {
        self.nodes.get_mut(id.index())?.as_mut()
    }

    /// Number of live nodes.
    pub fn live_len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    /// True when no node is live.
    pub fn is_empty(&self) -> bool {
        self.live_len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_and_get() {
        let mut arena: NodeArena<&str> = NodeArena::with_capacity(4);
        let a = arena.alloc("a");
        let b = arena.alloc("b");
        assert_ne!(a, b);
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena.get(b), Some(&"b"));
        assert_eq!(arena.live_len(), 2);
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut arena: NodeArena<u32> = NodeArena::with_capacity(4);
        let id = arena.alloc(10);
        *arena.get_mut(id).unwrap() += 5;
        assert_eq!(arena.get(id), Some(&15));
    }

    #[test]
    fn test_release_then_get_is_none() {
        let mut arena: NodeArena<u32> = NodeArena::with_capacity(4);
        let id = arena.alloc(1);
        assert_eq!(arena.release(id), Some(1));
        assert_eq!(arena.get(id), None);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_released_slot_is_reused() {
        let mut arena: NodeArena<u32> = NodeArena::with_capacity(4);
        let a = arena.alloc(1);
        let _b = arena.alloc(2);
        arena.release(a);

        let c = arena.alloc(3);
        assert_eq!(c, a);
        assert_eq!(arena.get(c), Some(&3));
        assert_eq!(arena.live_len(), 2);
    }

    #[test]
    fn test_double_release_is_ignored() {
        let mut arena: NodeArena<u32> = NodeArena::with_capacity(4);
        let a = arena.alloc(1);
        assert_eq!(arena.release(a), Some(1));
        assert_eq!(arena.release(a), None);

        // The free list must not hand the slot out twice.
        let b = arena.alloc(2);
        let c = arena.alloc(3);
        assert_ne!(b, c);
    }

    #[test]
    fn test_out_of_range_id() {
        let arena: NodeArena<u32> = NodeArena::with_capacity(0);
        assert_eq!(arena.get(NodeId::new(99)), None);
    }

    #[test]
    fn test_node_id_widening() {
        let id = NodeId::new(7);
        assert_eq!(id.index(), 7);
        assert_eq!(id.as_u64(), 7u64);
    }
}

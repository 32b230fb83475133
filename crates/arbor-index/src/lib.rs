//! Arbor ordered-index engines.
//!
//! Four in-memory tree structures over totally-ordered copyable keys,
//! all behind the same [`OrderedIndex`] trait:
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  OrderedIndex<K>                │
//! │    insert / search / remove / range_search      │
//! ├───────────┬───────────┬────────────┬────────────┤
//! │ BstIndex  │  RbIndex  │ BTreeIndex │ BPlusIndex │
//! │  (binary) │ (balanced │ (multiway) │ (multiway, │
//! │           │  binary)  │            │ leaf chain)│
//! └───────────┴───────────┴────────────┴────────────┘
//!                        │
//!                  NodeArena<N>
//!            (slot-indexed node storage)
//! ```
//!
//! Keys are unique: inserting a present key and removing an absent key
//! both report `Ok(false)`. Every operation answers with a boolean, so
//! an attached [`Probe`](arbor_common::Probe) sink sees the full walk
//! while callers get a plain membership verdict.

pub mod arena;
pub mod bplustree;
pub mod bst;
pub mod btree;
pub mod rbtree;
pub mod tree;

pub use arena::{NodeArena, NodeId};
pub use bplustree::BPlusIndex;
pub use bst::BstIndex;
pub use btree::BTreeIndex;
pub use rbtree::RbIndex;
pub use tree::{Key, OrderedIndex};

//! The common interface every tree engine implements.

use arbor_common::Result;
use std::fmt;

/// Key bound shared by all engines.
///
/// Keys are compared with their total order and copied freely between
/// nodes; no engine stores a key by reference.
pub trait Key: Ord + Copy + fmt::Debug {}

impl<T: Ord + Copy + fmt::Debug> Key for T {}

/// An ordered index of unique keys.
///
/// All four operations report their outcome as a boolean. Expected
/// absences (duplicate insert, removing or searching a missing key,
/// an empty range) are `Ok(false)`, never errors; `Err` is reserved
/// for internal invariant violations.
pub trait OrderedIndex<K: Key> {
    /// Inserts `key`. Returns `Ok(false)` if the key is already present;
    /// the stored key set is never changed by a rejected insert, though
    /// the multiway engines may still split nodes on the way down.
    fn insert(&mut self, key: K) -> Result<bool>;

    /// Returns `Ok(true)` if `target` is present.
    fn search(&self, target: K) -> Result<bool>;

    /// Removes `target`. Returns `Ok(false)` if it was not present.
    fn remove(&mut self, target: K) -> Result<bool>;

    /// Returns `Ok(true)` if any key `k` satisfies `begin <= k <= end`.
    /// An inverted interval (`begin > end`) matches nothing.
    fn range_search(&self, begin: K, end: K) -> Result<bool>;
}

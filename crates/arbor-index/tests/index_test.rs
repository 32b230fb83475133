//! Cross-engine integration tests.
//!
//! Every engine behind [`OrderedIndex`] must agree on the operation
//! contract: boolean verdicts, duplicate rejection, absence without
//! error, inclusive range endpoints. The randomized tests cross-check
//! each engine against `std::collections::BTreeSet`.

use arbor_common::{Probe, ProbeSink, TraceEvent};
use arbor_index::{BPlusIndex, BTreeIndex, BstIndex, OrderedIndex, RbIndex};
use rand::Rng;
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

// ============================================================================
// Shared contract
// ============================================================================

fn exercise_contract(tree: &mut dyn OrderedIndex<i32>) {
    // Empty tree: everything is a clean miss.
    assert!(!tree.search(7).unwrap());
    assert!(!tree.remove(7).unwrap());
    assert!(!tree.range_search(0, 100).unwrap());

    // First insert succeeds, duplicate is rejected.
    assert!(tree.insert(7).unwrap());
    assert!(!tree.insert(7).unwrap());
    assert!(tree.search(7).unwrap());

    // Inclusive endpoints on both sides.
    assert!(tree.range_search(7, 7).unwrap());
    assert!(tree.range_search(0, 7).unwrap());
    assert!(tree.range_search(7, 100).unwrap());
    assert!(!tree.range_search(8, 100).unwrap());
    // Inverted interval matches nothing.
    assert!(!tree.range_search(8, 6).unwrap());

    // Remove reports presence, second remove reports absence.
    assert!(tree.remove(7).unwrap());
    assert!(!tree.remove(7).unwrap());
    assert!(!tree.search(7).unwrap());
}

#[test]
fn test_contract_bst() {
    exercise_contract(&mut BstIndex::new());
}

#[test]
fn test_contract_rbtree() {
    exercise_contract(&mut RbIndex::new());
}

#[test]
fn test_contract_btree() {
    exercise_contract(&mut BTreeIndex::new(2).unwrap());
}

#[test]
fn test_contract_bplustree() {
    exercise_contract(&mut BPlusIndex::new(2).unwrap());
}

// ============================================================================
// Degree validation
// ============================================================================

#[test]
fn test_multiway_engines_reject_degree_below_two() {
    assert!(BTreeIndex::<i32>::new(1).is_err());
    assert!(BTreeIndex::<i32>::new(0).is_err());
    assert!(BPlusIndex::<i32>::new(1).is_err());
    assert!(BPlusIndex::<i32>::new(0).is_err());
    assert!(BTreeIndex::<i32>::new(2).is_ok());
    assert!(BPlusIndex::<i32>::new(2).is_ok());
}

// ============================================================================
// Engines agree with each other
// ============================================================================

#[test]
fn test_all_engines_agree_on_mixed_workload() {
    let mut bst = BstIndex::new();
    let mut rb = RbIndex::new();
    let mut bt = BTreeIndex::new(2).unwrap();
    let mut bp = BPlusIndex::new(3).unwrap();

    let inserts = [50, 30, 70, 20, 40, 60, 80, 10, 25, 35, 45, 55, 65, 75, 85];
    let removes = [30, 80, 10, 50];

    for k in inserts {
        assert!(bst.insert(k).unwrap());
        assert!(rb.insert(k).unwrap());
        assert!(bt.insert(k).unwrap());
        assert!(bp.insert(k).unwrap());
    }
    for k in removes {
        assert!(bst.remove(k).unwrap());
        assert!(rb.remove(k).unwrap());
        assert!(bt.remove(k).unwrap());
        assert!(bp.remove(k).unwrap());
    }

    rb.check_invariants().unwrap();
    bt.check_invariants().unwrap();
    bp.check_invariants().unwrap();

    for k in 0..100 {
        let expected = inserts.contains(&k) && !removes.contains(&k);
        assert_eq!(bst.search(k).unwrap(), expected, "bst key {k}");
        assert_eq!(rb.search(k).unwrap(), expected, "rb key {k}");
        assert_eq!(bt.search(k).unwrap(), expected, "btree key {k}");
        assert_eq!(bp.search(k).unwrap(), expected, "b+tree key {k}");
    }

    for (begin, end) in [(0, 100), (21, 29), (26, 29), (44, 46), (86, 99)] {
        let expected = inserts
            .iter()
            .any(|k| !removes.contains(k) && (begin..=end).contains(k));
        assert_eq!(bst.range_search(begin, end).unwrap(), expected, "[{begin}, {end}]");
        assert_eq!(rb.range_search(begin, end).unwrap(), expected, "[{begin}, {end}]");
        assert_eq!(bt.range_search(begin, end).unwrap(), expected, "[{begin}, {end}]");
        assert_eq!(bp.range_search(begin, end).unwrap(), expected, "[{begin}, {end}]");
    }
}

// ============================================================================
// Randomized cross-check against BTreeSet
// ============================================================================

fn random_churn(tree: &mut dyn OrderedIndex<i32>, rounds: usize) {
    let mut rng = rand::thread_rng();
    let mut model = BTreeSet::new();

    for _ in 0..rounds {
        let key = rng.gen_range(0..200);
        match rng.gen_range(0..4) {
            0 | 1 => {
                let expected = model.insert(key);
                assert_eq!(tree.insert(key).unwrap(), expected, "insert {key}");
            }
            2 => {
                let expected = model.remove(&key);
                assert_eq!(tree.remove(key).unwrap(), expected, "remove {key}");
            }
            _ => {
                let expected = model.contains(&key);
                assert_eq!(tree.search(key).unwrap(), expected, "search {key}");
            }
        }

        if rng.gen_range(0..8) == 0 {
            let a = rng.gen_range(0..200);
            let b = rng.gen_range(0..200);
            let (begin, end) = (a.min(b), a.max(b));
            let expected = model.range(begin..=end).next().is_some();
            assert_eq!(
                tree.range_search(begin, end).unwrap(),
                expected,
                "range [{begin}, {end}]"
            );
        }
    }

    for key in 0..200 {
        assert_eq!(tree.search(key).unwrap(), model.contains(&key), "final {key}");
    }
}

#[test]
fn test_random_churn_bst() {
    random_churn(&mut BstIndex::new(), 2000);
}

#[test]
fn test_random_churn_rbtree() {
    let mut tree = RbIndex::new();
    random_churn(&mut tree, 2000);
    tree.check_invariants().unwrap();
}

#[test]
fn test_random_churn_btree() {
    for t in [2, 3, 5] {
        let mut tree = BTreeIndex::new(t).unwrap();
        random_churn(&mut tree, 2000);
        tree.check_invariants().unwrap();
    }
}

#[test]
fn test_random_churn_bplustree() {
    for t in [2, 3, 5] {
        let mut tree = BPlusIndex::new(t).unwrap();
        random_churn(&mut tree, 2000);
        tree.check_invariants().unwrap();
    }
}

// ============================================================================
// Probe transparency
// ============================================================================

#[derive(Clone, Default)]
struct SharedSink {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl ProbeSink for SharedSink {
    fn record(&mut self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// An attached sink must observe traffic without changing any verdict.
#[test]
fn test_probe_observes_without_changing_results() {
    let sink = SharedSink::default();
    let events = sink.events.clone();
    let mut probed = BTreeIndex::with_probe(2, Probe::attached(Box::new(sink))).unwrap();
    let mut silent = BTreeIndex::new(2).unwrap();

    for k in 1..=12 {
        assert_eq!(probed.insert(k).unwrap(), silent.insert(k).unwrap());
    }
    for k in [3, 6, 9, 20] {
        assert_eq!(probed.remove(k).unwrap(), silent.remove(k).unwrap());
    }
    for k in 0..=13 {
        assert_eq!(probed.search(k).unwrap(), silent.search(k).unwrap());
    }
    assert_eq!(
        probed.range_search(4, 8).unwrap(),
        silent.range_search(4, 8).unwrap()
    );

    probed.check_invariants().unwrap();
    silent.check_invariants().unwrap();
    assert!(!events.borrow().is_empty(), "sink saw no traffic");
}

#[test]
fn test_probe_sees_structural_events() {
    use arbor_common::Phase;

    let sink = SharedSink::default();
    let events = sink.events.clone();
    let mut tree = RbIndex::with_probe(Probe::attached(Box::new(sink)));

    // Sequential insertion forces rotations and recoloring.
    for k in 0..16 {
        tree.insert(k).unwrap();
    }
    tree.check_invariants().unwrap();

    let events = events.borrow();
    assert!(events.iter().any(|e| e.phase == Phase::RotateBegin));
    assert!(events.iter().any(|e| e.phase == Phase::RotateEnd));
    assert!(events.iter().any(|e| e.phase == Phase::FixupCase));
}

// ============================================================================
// Scale
// ============================================================================

#[test]
fn test_large_ordered_load() {
    let mut rb = RbIndex::new();
    let mut bp = BPlusIndex::new(4).unwrap();
    for k in 0..5000 {
        assert!(rb.insert(k).unwrap());
        assert!(bp.insert(k).unwrap());
    }
    rb.check_invariants().unwrap();
    bp.check_invariants().unwrap();

    assert!(rb.range_search(4990, 5005).unwrap());
    assert!(bp.range_search(4990, 5005).unwrap());
    assert!(!rb.range_search(5000, 6000).unwrap());
    assert!(!bp.range_search(5000, 6000).unwrap());

    for k in (0..5000).step_by(2) {
        assert!(rb.remove(k).unwrap());
        assert!(bp.remove(k).unwrap());
    }
    rb.check_invariants().unwrap();
    bp.check_invariants().unwrap();
    assert_eq!(rb.len(), 2500);
    assert_eq!(bp.len(), 2500);
}

//! Instrumentation boundary for step-by-step observers.
//!
//! Each tree owns a [`Probe`] and reports what it touches: nodes visited,
//! key comparisons, structural events (split/merge/borrow/rotation) and
//! fix-up case selection. An external renderer subscribes by implementing
//! [`ProbeSink`]; nothing in this workspace renders.
//!
//! Emission is strictly observational: attaching or detaching a sink must
//! never change an operation's return value or the tree's final shape.
//! Detail strings are built lazily so a detached probe costs a branch.

use std::cell::RefCell;
use std::fmt;

/// Phase label attached to every trace event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// A node was visited during search/insert/remove.
    Visit,
    /// A key comparison was decided.
    Compare,
    /// A node split is starting.
    SplitBegin,
    /// A node split completed.
    SplitEnd,
    /// A sibling merge is starting.
    MergeBegin,
    /// A sibling merge completed.
    MergeEnd,
    /// A borrow from a sibling is starting.
    BorrowBegin,
    /// A borrow from a sibling completed.
    BorrowEnd,
    /// A rotation is starting.
    RotateBegin,
    /// A rotation completed.
    RotateEnd,
    /// A fix-up case was selected.
    FixupCase,
    /// The outcome of a public operation was decided.
    Outcome,
}

/// A single observation emitted by a tree engine.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// Opaque identifier of the subject node (arena slot).
    pub node: u64,
    /// Key slot within the node, when one is relevant.
    pub slot: Option<usize>,
    /// What kind of step this is.
    pub phase: Phase,
    /// Free-text narration for the step.
    pub detail: String,
}

/// Receiver for trace events.
pub trait ProbeSink {
    /// Records one event. Called synchronously from inside tree operations.
    fn record(&mut self, event: TraceEvent);
}

/// Probe handle owned by each tree.
///
/// Uses interior mutability so read-only operations (`search`,
/// `range_search`) can emit without taking `&mut self` on the tree.
pub struct Probe {
    sink: Option<RefCell<Box<dyn ProbeSink>>>,
}

impl Probe {
    /// Creates a probe with no sink attached. Emission is a no-op.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    /// Creates a probe delivering events to the given sink.
    pub fn attached(sink: Box<dyn ProbeSink>) -> Self {
        Self {
            sink: Some(RefCell::new(sink)),
        }
    }

    /// Returns true if a sink is attached.
    pub fn is_attached(&self) -> bool {
        self.sink.is_some()
    }

    /// Emits one event. `detail` is only evaluated when a sink is attached.
    pub fn emit<F>(&self, node: u64, slot: Option<usize>, phase: Phase, detail: F)
    where
        F: FnOnce() -> String,
    {
        if let Some(sink) = &self.sink {
            sink.borrow_mut().record(TraceEvent {
                node,
                slot,
                phase,
                detail: detail(),
            });
        }
    }
}

impl Default for Probe {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Probe")
            .field("attached", &self.is_attached())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        events: Vec<TraceEvent>,
    }

    impl ProbeSink for RecordingSink {
        fn record(&mut self, event: TraceEvent) {
            self.events.push(event);
        }
    }

    struct CountingSink(std::rc::Rc<std::cell::Cell<usize>>);

    impl ProbeSink for CountingSink {
        fn record(&mut self, _event: TraceEvent) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_disabled_probe_skips_detail() {
        let probe = Probe::disabled();
        assert!(!probe.is_attached());
        probe.emit(0, None, Phase::Visit, || {
            panic!("detail must not be evaluated when no sink is attached")
        });
    }

    #[test]
    fn test_attached_probe_delivers_events() {
        let count = std::rc::Rc::new(std::cell::Cell::new(0));
        let probe = Probe::attached(Box::new(CountingSink(count.clone())));
        assert!(probe.is_attached());

        probe.emit(7, Some(1), Phase::Compare, || "7 > 3".to_string());
        probe.emit(7, None, Phase::Outcome, || "found".to_string());
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_event_fields() {
        let mut sink = RecordingSink::default();
        sink.record(TraceEvent {
            node: 12,
            slot: Some(2),
            phase: Phase::SplitBegin,
            detail: "splitting full child".to_string(),
        });
        let event = &sink.events[0];
        assert_eq!(event.node, 12);
        assert_eq!(event.slot, Some(2));
        assert_eq!(event.phase, Phase::SplitBegin);
        assert!(event.detail.contains("splitting"));
    }

    #[test]
    fn test_probe_debug_format() {
        assert_eq!(format!("{:?}", Probe::disabled()), "Probe { attached: false }");
    }
}

//! The deferred map and overflow flag.
//!
//! A single small struct, guarded by one `parking_lot::Mutex`, shared by
//! every worker in the pool. Mutations here are O(1) and never overlap a
//! blocking `Step` invocation or store I/O.

use fate_core::FateId;
use parking_lot::Mutex;
use std::collections::HashSet;

struct Inner {
    ids: HashSet<FateId>,
    overflow: bool,
    /// Set when a deferral is recorded while `overflow` is already true —
    /// tells `end_pass` that this pass was not "clean" and the flag must
    /// stay up a while longer.
    refilled_during_overflow: bool,
}

/// Tracks which transactions this process has deferred, bounded by
/// `max_deferred`, and the process-wide overflow flag that trips when the
/// cap is exceeded.
pub struct DeferredState {
    inner: Mutex<Inner>,
    max_deferred: usize,
}

impl DeferredState {
    /// Create an empty deferred map with the given capacity.
    pub fn new(max_deferred: usize) -> Self {
        DeferredState {
            inner: Mutex::new(Inner {
                ids: HashSet::new(),
                overflow: false,
                refilled_during_overflow: false,
            }),
            max_deferred,
        }
    }

    /// Record that `id` was deferred this pass. If the map is already at
    /// capacity, trips the overflow flag and clears the map instead of
    /// inserting.
    ///
    /// While overflow is already active, `runnable()` is ignoring deadlines
    /// entirely, so there is nothing useful to insert — this call instead
    /// marks the pass as non-clean so [`DeferredState::end_pass`] knows not
    /// to clear the flag yet.
    pub fn record_deferral(&self, id: FateId) {
        let mut inner = self.inner.lock();
        if inner.overflow {
            inner.refilled_during_overflow = true;
            return;
        }
        inner.ids.insert(id);
        if inner.ids.len() > self.max_deferred {
            inner.ids.clear();
            inner.overflow = true;
            inner.refilled_during_overflow = false;
            tracing::warn!(
                max_deferred = self.max_deferred,
                "deferred map overflow; ignoring deferral deadlines until a clean pass"
            );
        }
    }

    /// Whether `runnable()` should currently ignore deferral deadlines.
    pub fn ignore_deferrals(&self) -> bool {
        self.inner.lock().overflow
    }

    /// Current size of the deferred set. Always bounded by `max_deferred`.
    pub fn deferred_count(&self) -> usize {
        self.inner.lock().ids.len()
    }

    /// Whether the overflow flag is currently set.
    pub fn overflow_active(&self) -> bool {
        self.inner.lock().overflow
    }

    /// Mark the end of one scheduler pass. If overflow was active and no
    /// new deferral was recorded during the pass, the flag clears.
    pub fn end_pass(&self) {
        let mut inner = self.inner.lock();
        if inner.overflow {
            if inner.refilled_during_overflow {
                inner.refilled_during_overflow = false;
            } else {
                inner.overflow = false;
                tracing::info!("deferred map overflow cleared after a clean pass");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(n: u64) -> FateId {
        FateId::from_raw(n)
    }

    proptest! {
        // Testable property (spec §8, item 6): deferred_count <= max_deferred
        // always holds, no matter how many deferrals land in one pass.
        #[test]
        fn deferred_count_never_exceeds_cap(
            max_deferred in 1usize..50,
            raw_ids in prop::collection::vec(0u64..200, 0..300),
        ) {
            let state = DeferredState::new(max_deferred);
            for raw in raw_ids {
                state.record_deferral(id(raw));
                prop_assert!(state.deferred_count() <= max_deferred);
            }
        }

        // Whatever sequence of deferrals and pass boundaries occurs, the
        // overflow flag is only ever observed set after the cap was
        // actually exceeded at least once.
        #[test]
        fn overflow_only_follows_an_actual_overflow(
            max_deferred in 1usize..20,
            raw_ids in prop::collection::vec(0u64..40, 0..60),
            end_passes in prop::collection::vec(any::<bool>(), 0..60),
        ) {
            let state = DeferredState::new(max_deferred);
            let mut ever_exceeded = false;
            for (raw, end_pass) in raw_ids.into_iter().zip(end_passes) {
                let before = state.deferred_count();
                state.record_deferral(id(raw));
                if before == max_deferred {
                    ever_exceeded = true;
                }
                if end_pass {
                    state.end_pass();
                }
            }
            if state.overflow_active() {
                prop_assert!(ever_exceeded);
            }
        }
    }

    #[test]
    fn stays_under_cap_without_overflow() {
        let state = DeferredState::new(10);
        for i in 0..10 {
            state.record_deferral(id(i));
        }
        assert_eq!(state.deferred_count(), 10);
        assert!(!state.overflow_active());
    }

    #[test]
    fn exceeding_cap_trips_overflow_and_clears() {
        let state = DeferredState::new(10);
        for i in 0..10 {
            state.record_deferral(id(i));
        }
        state.record_deferral(id(10));
        assert_eq!(state.deferred_count(), 0);
        assert!(state.overflow_active());
        assert!(state.ignore_deferrals());
    }

    #[test]
    fn overflow_clears_after_a_clean_pass() {
        let state = DeferredState::new(2);
        state.record_deferral(id(0));
        state.record_deferral(id(1));
        state.record_deferral(id(2)); // trips overflow
        assert!(state.overflow_active());

        // A pass where nothing new is deferred: flag clears.
        state.end_pass();
        assert!(!state.overflow_active());
    }

    #[test]
    fn overflow_stays_up_while_refilling() {
        let state = DeferredState::new(1);
        state.record_deferral(id(0));
        state.record_deferral(id(1)); // trips overflow
        assert!(state.overflow_active());

        state.record_deferral(id(2)); // still deferring during overflow
        state.end_pass();
        assert!(state.overflow_active(), "pass was not clean, flag must stay up");

        state.end_pass();
        assert!(!state.overflow_active(), "next clean pass clears it");
    }
}

//! Transaction status and the legal state-transition table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a FATE transaction.
///
/// `Unknown` is not a status a row can ever hold; it is what callers see
/// when they ask about a [`FateId`](crate::FateId) with no durable row —
/// either one that was never created, or one that has been [`delete`]d.
///
/// [`delete`]: ../../fate_store/trait.ReservedTx.html#tymethod.delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Row created, not yet seeded with a first step.
    New,
    /// Seeded; waiting for the executor to claim it.
    Submitted,
    /// Claimed by the executor; the step loop is driving it.
    InProgress,
    /// Terminal: the step stack emptied without error.
    Successful,
    /// A step failed; compensation is in progress.
    FailedInProgress,
    /// Terminal: compensation finished (or there was nothing to undo).
    Failed,
    /// No durable row exists for this id.
    Unknown,
}

impl Status {
    /// A status from which [`delete`] is legal.
    ///
    /// [`delete`]: ../../fate_store/trait.ReservedTx.html#tymethod.delete
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Successful | Status::Failed)
    }

    /// Statuses the executor's `runnable()` query considers live:
    /// seeded-but-not-done, mid-flight, or mid-compensation.
    pub fn is_runnable_candidate(&self) -> bool {
        matches!(
            self,
            Status::New | Status::Submitted | Status::InProgress | Status::FailedInProgress
        )
    }

    /// Whether `self -> to` appears in the legal transition table (§4.4).
    ///
    /// `IN_PROGRESS -> IN_PROGRESS` (push/pop within the step loop) is
    /// legal and is the only self-transition.
    pub fn can_transition_to(&self, to: Status) -> bool {
        use Status::*;
        matches!(
            (*self, to),
            (New, Submitted)
                | (New, FailedInProgress)
                | (Submitted, InProgress)
                | (Submitted, FailedInProgress)
                | (InProgress, InProgress)
                | (InProgress, Successful)
                | (InProgress, FailedInProgress)
                | (FailedInProgress, Failed)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::New => "NEW",
            Status::Submitted => "SUBMITTED",
            Status::InProgress => "IN_PROGRESS",
            Status::Successful => "SUCCESSFUL",
            Status::FailedInProgress => "FAILED_IN_PROGRESS",
            Status::Failed => "FAILED",
            Status::Unknown => "UNKNOWN",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use Status::*;

    const ALL: [Status; 7] = [
        New,
        Submitted,
        InProgress,
        Successful,
        FailedInProgress,
        Failed,
        Unknown,
    ];

    fn status_strategy() -> impl Strategy<Value = Status> {
        (0usize..ALL.len()).prop_map(|i| ALL[i])
    }

    proptest! {
        // Testable property (spec §8, item 1): the only statuses any
        // status can legally move to are exactly the ones in the table in
        // §4.4 — this walks every pair in the enum and checks the claim
        // against a second, independently-written copy of that table.
        #[test]
        fn can_transition_to_matches_the_spec_table(from in status_strategy(), to in status_strategy()) {
            let expected = matches!(
                (from, to),
                (New, Submitted)
                    | (New, FailedInProgress)
                    | (Submitted, InProgress)
                    | (Submitted, FailedInProgress)
                    | (InProgress, InProgress)
                    | (InProgress, Successful)
                    | (InProgress, FailedInProgress)
                    | (FailedInProgress, Failed)
            );
            prop_assert_eq!(from.can_transition_to(to), expected);
        }

        // No transition ever leads into `Unknown` (that status models "no
        // row exists", reached only via `delete`, which is not a status
        // transition at all) or out of a terminal status.
        #[test]
        fn terminal_and_unknown_are_dead_ends(from in status_strategy(), to in status_strategy()) {
            if from.is_terminal() || from == Unknown {
                prop_assert!(!from.can_transition_to(to));
            }
            prop_assert!(!from.can_transition_to(Unknown));
        }
    }

    #[test]
    fn legal_transitions_match_table() {
        assert!(New.can_transition_to(Submitted));
        assert!(New.can_transition_to(FailedInProgress));
        assert!(Submitted.can_transition_to(InProgress));
        assert!(Submitted.can_transition_to(FailedInProgress));
        assert!(InProgress.can_transition_to(InProgress));
        assert!(InProgress.can_transition_to(Successful));
        assert!(InProgress.can_transition_to(FailedInProgress));
        assert!(FailedInProgress.can_transition_to(Failed));
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        assert!(!New.can_transition_to(InProgress));
        assert!(!New.can_transition_to(Successful));
        assert!(!Submitted.can_transition_to(Successful));
        assert!(!Successful.can_transition_to(InProgress));
        assert!(!Failed.can_transition_to(InProgress));
        assert!(!FailedInProgress.can_transition_to(New));
        assert!(!Unknown.can_transition_to(New));
    }

    #[test]
    fn terminal_statuses() {
        assert!(Successful.is_terminal());
        assert!(Failed.is_terminal());
        assert!(!InProgress.is_terminal());
        assert!(!Unknown.is_terminal());
    }
}

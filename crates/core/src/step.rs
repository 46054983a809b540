//! The `Step` contract: the one capability the engine requires of the
//! embedder's repository operations.
//!
//! What used to be an inheritance hierarchy of concrete operations becomes
//! here a single object-safe trait. `fate-core` ships no implementations of
//! it beyond test fixtures — defining what a step actually *does* (compact
//! a table, run a bulk import, ...) is explicitly out of scope for this
//! crate.

use crate::error::{StepCodecError, StepError};
use crate::{FateId, Value};
use std::sync::Arc;

/// One unit of work in a transaction's step stack.
///
/// `E` is the embedder-supplied environment threaded through every call —
/// FATE does not constrain its shape.
///
/// Implementations must be safe to invoke from any worker thread and, for
/// `undo`, idempotent: the executor calls `undo` exactly once per step that
/// was ever pushed onto a failed transaction's stack, but a crash between
/// `undo` and the subsequent `pop` means the same `undo` can run again after
/// restart.
pub trait Step<E>: Send + Sync {
    /// A stable identifying string, used in logs and in
    /// [`FateException`](crate::error::StepError) records. Should not
    /// change across releases of the embedder's step implementation.
    fn name(&self) -> &str;

    /// Probe whether this step is ready to run.
    ///
    /// Returns `Ok(0)` to run now, or `Ok(delay_ms)` with `delay_ms > 0` to
    /// defer this transaction for at least that many milliseconds. An
    /// `Err` is treated exactly like a failure of [`Step::call`]: it
    /// transitions the transaction to `FAILED_IN_PROGRESS` and triggers
    /// compensation (this step is undone because it was pushed, even
    /// though `call` was never entered).
    fn is_ready(&self, id: FateId, env: &E) -> Result<u64, StepError>;

    /// Execute this step.
    ///
    /// Returning `Ok(Some(next))` pushes `next` onto the stack above this
    /// step (this step remains; it will not be called again). Returning
    /// `Ok(None)` pops this step as successfully completed. An `Err`
    /// transitions the transaction to `FAILED_IN_PROGRESS`.
    #[allow(clippy::type_complexity)]
    fn call(&self, id: FateId, env: &E) -> Result<Option<Box<dyn Step<E>>>, StepError>;

    /// Compensate this step's side effects after a later step failed.
    ///
    /// Only called for steps whose `call` may have run (i.e. every step
    /// that was pushed onto a transaction that ends up `FAILED_IN_PROGRESS`).
    /// Must be idempotent. Errors are logged by the compensation engine but
    /// never halt or fail the rollback.
    fn undo(&self, id: FateId, env: &E) -> Result<(), StepError>;

    /// The opaque success payload, meaningful only for the step that was on
    /// top of the stack when it emptied (i.e. the terminal step of a
    /// `SUCCESSFUL` transaction). Steps that are not terminal may return
    /// `None` unconditionally.
    fn return_value(&self) -> Option<Value> {
        None
    }
}

/// Serializes and reconstructs `Step` values so a durable store with an
/// on-disk journal (see `fate_store::journal`) can recover a transaction's
/// full step stack across a process crash, not just its status history.
///
/// FATE itself never inspects a step's bytes (spec.md §6 "Step
/// serialization"); only an embedder-supplied `StepCodec` knows how to turn
/// its own concrete `Step` types into bytes and back. A store built without
/// one can still journal status transitions, but cannot reconstruct an
/// in-flight stack after a restart — see `fate_store::InMemoryTransactionStore::with_journal`.
pub trait StepCodec<E>: Send + Sync {
    /// Encode `step` to bytes. `step.name()` is persisted alongside the
    /// bytes and handed back to `decode` so it can pick the right concrete
    /// type, so it need not be duplicated inside the encoding itself.
    fn encode(&self, step: &dyn Step<E>) -> Result<Vec<u8>, StepCodecError>;

    /// Reconstruct a step from its `name()` and the bytes `encode` produced
    /// for it.
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<Arc<dyn Step<E>>, StepCodecError>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod fixtures {
    //! Minimal `Step` fixtures shared by this crate's and sibling crates'
    //! tests, gated behind the `test-support` feature (only ever enabled
    //! as a `[dev-dependencies]` feature, never in a normal build) — real
    //! step semantics are an embedder concern, not FATE's.
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// A step that always succeeds immediately and counts its own calls.
    pub struct CountingStep {
        pub label: &'static str,
        pub calls: Arc<AtomicUsize>,
        pub undos: Arc<AtomicUsize>,
    }

    impl<E> Step<E> for CountingStep {
        fn name(&self) -> &str {
            self.label
        }

        fn is_ready(&self, _id: FateId, _env: &E) -> Result<u64, StepError> {
            Ok(0)
        }

        fn call(&self, _id: FateId, _env: &E) -> Result<Option<Box<dyn Step<E>>>, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn undo(&self, _id: FateId, _env: &E) -> Result<(), StepError> {
            self.undos.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn return_value(&self) -> Option<Value> {
            Some(Value::from(self.label))
        }
    }

    /// A step whose `call` always fails.
    pub struct FailingCallStep {
        pub label: &'static str,
        pub undos: Arc<AtomicUsize>,
    }

    impl<E> Step<E> for FailingCallStep {
        fn name(&self) -> &str {
            self.label
        }

        fn is_ready(&self, _id: FateId, _env: &E) -> Result<u64, StepError> {
            Ok(0)
        }

        fn call(&self, _id: FateId, _env: &E) -> Result<Option<Box<dyn Step<E>>>, StepError> {
            Err(StepError::CallFailed {
                step: self.label.to_string(),
                message: "call() failed".to_string(),
            })
        }

        fn undo(&self, _id: FateId, _env: &E) -> Result<(), StepError> {
            self.undos.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// A step whose `is_ready` always fails (never reaches `call`).
    pub struct FailingReadyStep {
        pub label: &'static str,
        pub undos: Arc<AtomicUsize>,
    }

    impl<E> Step<E> for FailingReadyStep {
        fn name(&self) -> &str {
            self.label
        }

        fn is_ready(&self, _id: FateId, _env: &E) -> Result<u64, StepError> {
            Err(StepError::IsReadyFailed {
                step: self.label.to_string(),
                message: "isReady() failed".to_string(),
            })
        }

        fn call(&self, _id: FateId, _env: &E) -> Result<Option<Box<dyn Step<E>>>, StepError> {
            unreachable!("is_ready failed; call must never be entered")
        }

        fn undo(&self, _id: FateId, _env: &E) -> Result<(), StepError> {
            self.undos.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }
}

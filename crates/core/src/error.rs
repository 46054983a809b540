//! The FATE error taxonomy.
//!
//! Each component that can fail gets its own `thiserror`-derived enum —
//! [`StoreError`], [`StateError`], [`StepError`] — and the crate-level
//! [`Error`] composes them with `#[from]`.

use crate::FateId;
use thiserror::Error;

/// Errors from the durable store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A transient I/O hiccup. The store retries these internally with
    /// capped backoff; this variant surfaces only if retries are
    /// exhausted.
    #[error("transient store error after retries: {0}")]
    Transient(String),

    /// A persistent backend failure. The affected row is left untouched;
    /// the executor pauses work on it.
    #[error("store backend error: {0}")]
    Backend(String),

    /// An operation targeted a row with no durable state.
    #[error("no such transaction: {0}")]
    NotFound(FateId),
}

/// Errors from transaction state/reservation handling.
#[derive(Debug, Error)]
pub enum StateError {
    /// The attempted transition is not in the legal table.
    #[error("transaction {id} cannot go from {from} to {to}")]
    WrongStatus {
        /// The transaction in question.
        id: FateId,
        /// Its status at the time of the attempted transition.
        from: crate::Status,
        /// The status that was requested.
        to: crate::Status,
    },

    /// The reservation's owner changed underneath the caller — the
    /// previous holder's process died and a new one reclaimed the row.
    /// The current worker must abort its loop iteration without mutating
    /// further.
    #[error("lost reservation on transaction {0}")]
    LostReservation(FateId),

    /// The row was already deleted; every mutating operation on a
    /// `ReservedTx` fails this way from then on.
    #[error("transaction {0} was deleted")]
    Deleted(FateId),

    /// `reserve`/`tryReserve` was called for an id with no row.
    #[error("cannot reserve nonexistent transaction {0}")]
    NoSuchTransaction(FateId),

    /// The row already has a different, live owner.
    #[error("transaction {0} is reserved by another worker")]
    AlreadyReserved(FateId),
}

/// Errors surfaced by a `Step`.
#[derive(Debug, Error, Clone)]
pub enum StepError {
    /// `call()` returned an error.
    #[error("step {step}: call() failed: {message}")]
    CallFailed {
        /// The step's [`name()`](crate::Step::name).
        step: String,
        /// The failure detail.
        message: String,
    },

    /// `isReady()` returned an error; `call` was never entered for this
    /// step, but it is still undone.
    #[error("step {step}: isReady() failed: {message}")]
    IsReadyFailed {
        /// The step's [`name()`](crate::Step::name).
        step: String,
        /// The failure detail.
        message: String,
    },

    /// `undo()` returned an error. Logged by the compensation engine;
    /// never surfaced to a caller and never halts rollback.
    #[error("step {step}: undo() failed: {message}")]
    UndoFailed {
        /// The step's [`name()`](crate::Step::name).
        step: String,
        /// The failure detail.
        message: String,
    },
}

impl StepError {
    /// The name of the step that raised this error.
    pub fn step_name(&self) -> &str {
        match self {
            StepError::CallFailed { step, .. }
            | StepError::IsReadyFailed { step, .. }
            | StepError::UndoFailed { step, .. } => step,
        }
    }

    /// The human-readable message, without the `step: kind failed:` prefix.
    pub fn message(&self) -> &str {
        match self {
            StepError::CallFailed { message, .. }
            | StepError::IsReadyFailed { message, .. }
            | StepError::UndoFailed { message, .. } => message,
        }
    }
}

/// Errors from a `StepCodec` implementation, surfaced only by a durable
/// store with the optional crash-recovery journal enabled.
#[derive(Debug, Error, Clone)]
pub enum StepCodecError {
    /// `decode` was asked for a step name no registered codec recognizes.
    #[error("no codec registered for step {0:?}")]
    UnknownStep(String),

    /// `encode` failed.
    #[error("failed to encode step {step}: {message}")]
    Encode {
        /// The step's [`name()`](crate::Step::name).
        step: String,
        /// The failure detail.
        message: String,
    },

    /// `decode` failed.
    #[error("failed to decode step {step}: {message}")]
    Decode {
        /// The step's [`name()`](crate::Step::name).
        step: String,
        /// The failure detail.
        message: String,
    },
}

/// The unified FATE error type. Every public API in this workspace returns
/// `fate_core::Result<T>` (or a newtype around it).
#[derive(Debug, Error)]
pub enum Error {
    /// See [`StoreError`].
    #[error(transparent)]
    Store(#[from] StoreError),

    /// See [`StateError`].
    #[error(transparent)]
    State(#[from] StateError),

    /// See [`StepError`]. Surfaces a step failure to a caller inspecting
    /// `getException`; ordinary step failures are *recorded*, not
    /// returned from the API that triggered them (the API call that seeded
    /// or waited on the transaction returns `Ok`, and the failure shows up
    /// as the transaction's terminal status). This variant exists for
    /// callers that synchronously invoke step logic outside the scheduler
    /// (e.g. tests).
    #[error(transparent)]
    Step(#[from] StepError),

    /// The calling thread was interrupted while blocked (waiting for
    /// completion, or mid-shutdown). The operation in progress is treated
    /// as a failure and — for a step — triggers compensation.
    #[error("interrupted")]
    Interrupted,
}

/// Result alias used throughout the `fate-*` crates.
pub type Result<T> = std::result::Result<T, Error>;

/// The durable record of why a transaction is `FAILED_IN_PROGRESS` or
/// `FAILED`, returned by `Fate::get_exception`.
///
/// This is the *original* failure (a `CallFailed` or `IsReadyFailed`); a
/// later `undo` failure during compensation never replaces it.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FateException {
    /// The step that raised the failure.
    pub step_name: String,
    /// The failure message.
    pub message: String,
    /// Additional context, outermost cause first — empty unless the
    /// failing step chose to populate it.
    pub chain: Vec<String>,
}

impl FateException {
    /// Build an exception record from the `Step` error that caused it.
    pub fn from_step_error(err: &StepError) -> Self {
        FateException {
            step_name: err.step_name().to_string(),
            message: err.message().to_string(),
            chain: Vec::new(),
        }
    }

    /// Build an exception record for a transaction whose in-flight step was
    /// interrupted by shutdown, rather than by the step itself raising an
    /// error.
    pub fn interrupted(step_name: &str) -> Self {
        FateException {
            step_name: step_name.to_string(),
            message: "interrupted during shutdown".to_string(),
            chain: Vec::new(),
        }
    }
}

impl std::fmt::Display for FateException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.step_name, self.message)
    }
}

//! The public FATE facade.
//!
//! [`Fate`] is the single entry point embedders use: seed a transaction,
//! observe or cancel it, wait for its terminal status, and reclaim it.
//! Everything else — the durable store, the reservation protocol, the
//! worker pool — is an implementation detail reached only through this
//! type.

#![warn(missing_docs)]

mod metrics;

pub use fate_core::error::{Error, FateException, Result, StateError, StepError, StoreError};
pub use fate_core::{FateId, Status, Step, TxInfoKey, Value};
pub use fate_scheduler::{SchedulerConfig as FateConfig, SchedulerConfigBuilder as FateConfigBuilder};
pub use fate_store::{TxFilter, TxView};
pub use metrics::FateMetrics;

use fate_lock::{ClusterLock, StaticLock};
use fate_scheduler::Executor;
use fate_store::InMemoryTransactionStore;
use std::sync::Arc;
use std::time::Duration;

/// The FATE public API.
///
/// `E` is the embedder's step environment, passed unchanged to every
/// `Step` invocation.
pub struct Fate<E> {
    store: Arc<InMemoryTransactionStore<E>>,
    lock: Arc<dyn ClusterLock>,
    executor: Executor<E>,
}

impl<E: Send + Sync + 'static> Fate<E> {
    /// Start a builder with default configuration and a single-node
    /// cluster lock (sufficient for embedding FATE in one process; supply
    /// a real [`ClusterLock`] via [`FateBuilder::lock`] for multi-process
    /// deployments).
    pub fn builder(env: E) -> FateBuilder<E> {
        FateBuilder::new(env)
    }

    /// Allocate a new transaction at `NEW`.
    pub fn start_transaction(&self) -> FateId {
        self.store.create()
    }

    /// Seed a `NEW` transaction with its first step and submit it for
    /// execution.
    ///
    /// Idempotent: a second call with byte-identical `(op, step.name(),
    /// auto_clean, reason)` on a row this call already moved to
    /// `SUBMITTED` succeeds silently. A call with different arguments, or
    /// on a row not in `NEW`/already-matching-`SUBMITTED`, fails with
    /// `State::WrongStatus`.
    ///
    /// A row already cancelled while `NEW` is `FAILED_IN_PROGRESS` before
    /// it was ever seeded; seeding it still attaches the step so the
    /// compensation engine has something to undo, but leaves the status
    /// untouched. If the executor finalized that cancellation to `FAILED`
    /// first (an empty stack compensates instantly), seeding is accepted
    /// as a no-op instead — in both orderings the step's `call` never
    /// runs.
    pub fn seed_transaction(
        &self,
        op: impl Into<String>,
        id: FateId,
        step: Arc<dyn Step<E>>,
        auto_clean: bool,
        reason: impl Into<String>,
    ) -> Result<()> {
        let op = op.into();
        let reason = reason.into();
        let fingerprint = format!("{op}|{}|{auto_clean}|{reason}", step.name());

        let owner = self.current_lock_owner()?;
        let tx = self.store.reserve(id, owner).map_err(state_err)?;
        let status = tx.get_status().map_err(state_err)?;

        match status {
            Status::New => {
                tx.set_op_tag(op.clone()).map_err(state_err)?;
                tx.set_transaction_info(&TxInfoKey::OperationTag, Value::from(op))
                    .map_err(state_err)?;
                tx.set_transaction_info(&TxInfoKey::Reason, Value::from(reason))
                    .map_err(state_err)?;
                tx.set_transaction_info(
                    &TxInfoKey::AutoClean,
                    Value::from(if auto_clean { "true" } else { "false" }),
                )
                .map_err(state_err)?;
                tx.set_transaction_info(&TxInfoKey::SeedFingerprint, Value::from(fingerprint))
                    .map_err(state_err)?;
                tx.push(step).map_err(state_err)?;
                let result = tx.set_status(Status::Submitted).map_err(state_err);
                tx.release();
                result
            }
            Status::Submitted => {
                let existing = tx.get_transaction_info(&TxInfoKey::SeedFingerprint);
                tx.release();
                match existing.map_err(state_err)? {
                    Some(v) if v.as_str() == Some(fingerprint.as_str()) => Ok(()),
                    _ => Err(StateError::WrongStatus {
                        id,
                        from: status,
                        to: Status::Submitted,
                    }
                    .into()),
                }
            }
            Status::FailedInProgress => {
                // `cancel` already moved this row here before it was ever
                // seeded. The step is still attached so compensation has
                // something to walk — it is undone without ever being
                // called, per the isReady-failure convention — but the
                // status itself does not change.
                tx.set_transaction_info(&TxInfoKey::OperationTag, Value::from(op))
                    .map_err(state_err)?;
                tx.set_transaction_info(&TxInfoKey::Reason, Value::from(reason))
                    .map_err(state_err)?;
                tx.push(step).map_err(state_err)?;
                tx.release();
                Ok(())
            }
            Status::Failed => {
                // The race this engine can't rule out: `cancel` on a `NEW`
                // row can finalize all the way to `FAILED` (empty stack,
                // nothing to compensate) before this call reserves the
                // row. Either way the transaction already ran zero steps
                // and never will; accept the call as a no-op rather than
                // surfacing a spurious error to a caller that did nothing
                // wrong.
                tx.release();
                Ok(())
            }
            other => {
                tx.release();
                Err(StateError::WrongStatus {
                    id,
                    from: other,
                    to: Status::Submitted,
                }
                .into())
            }
        }
    }

    /// Cancel `id` if the executor has not yet reserved it. Returns `true`
    /// if the transaction is cancelled (or was already terminal — a
    /// no-op); `false` if it is already reserved or mid-flight and cannot
    /// be cancelled from here.
    pub fn cancel(&self, id: FateId) -> Result<bool> {
        let owner = self.current_lock_owner()?;
        let tx = match self.store.try_reserve(id, owner) {
            Ok(Some(tx)) => tx,
            Ok(None) => return Ok(false), // the executor (or another caller) holds it
            Err(e) => return Err(state_err(e)),
        };

        let status = tx.get_status().map_err(state_err)?;
        let outcome = match status {
            Status::New | Status::Submitted => {
                tx.set_status(Status::FailedInProgress).map_err(state_err)?;
                true
            }
            s if s.is_terminal() => true,
            _ => false,
        };
        tx.release();
        Ok(outcome)
    }

    /// Block until `id` reaches a terminal status, then return it.
    pub fn wait_for_completion(&self, id: FateId) -> Result<Status> {
        loop {
            let status = self.store.status_of(id);
            if status.is_terminal() {
                return Ok(status);
            }
            if status == Status::Unknown {
                return Err(StoreError::NotFound(id).into());
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// The failure record for `id`, if it is `FAILED`/`FAILED_IN_PROGRESS`.
    pub fn get_exception(&self, id: FateId) -> Option<FateException> {
        self.store.get_exception(id)
    }

    /// The step return value recorded by the last step of a `SUCCESSFUL`
    /// transaction, if any.
    pub fn get_return_value(&self, id: FateId) -> Option<Value> {
        self.store.get_return_value(id)
    }

    /// Remove a terminal transaction's row; subsequent reads see `UNKNOWN`.
    pub fn delete(&self, id: FateId) -> Result<()> {
        let owner = self.current_lock_owner()?;
        let tx = self.store.reserve(id, owner).map_err(state_err)?;
        let status = tx.get_status().map_err(state_err)?;
        if !status.is_terminal() {
            tx.release();
            return Err(StateError::WrongStatus {
                id,
                from: status,
                to: Status::Unknown,
            }
            .into());
        }
        tx.delete().map_err(state_err)
    }

    /// Administrative listing with optional status/operation-tag filters.
    pub fn list(&self, filter: &TxFilter) -> Vec<TxView> {
        self.store.list(filter)
    }

    /// A point-in-time snapshot of transaction counts and scheduler
    /// bookkeeping, in lieu of the metrics backend that is named as an
    /// external collaborator out of scope for this crate.
    pub fn metrics(&self) -> FateMetrics {
        metrics::snapshot(&self.store, &self.executor)
    }

    /// Drain the executor: stop claiming new work, wait up to
    /// `timeout` for in-flight steps, then stop waiting.
    pub fn shutdown(&self, timeout: Duration) {
        self.executor.shutdown(timeout);
    }

    /// Resize the worker pool. Applied between iterations of each
    /// worker's loop, never mid-step.
    pub fn resize_pool(&self, worker_pool_size: usize) {
        self.executor.resize(worker_pool_size);
    }

    fn current_lock_owner(&self) -> Result<fate_lock::LockId> {
        self.lock.current().ok_or(Error::Interrupted)
    }
}

fn state_err(e: StateError) -> Error {
    Error::State(e)
}

/// Builder for [`Fate`], with a fluent configuration style.
pub struct FateBuilder<E> {
    env: E,
    lock: Arc<dyn ClusterLock>,
    config: FateConfig,
    clock: Arc<dyn fate_core::Clock>,
}

impl<E: Send + Sync + 'static> FateBuilder<E> {
    fn new(env: E) -> Self {
        FateBuilder {
            env,
            lock: Arc::new(StaticLock::acquire()),
            config: FateConfig::default(),
            clock: fate_core::MonotonicClock::new(),
        }
    }

    /// Supply the cluster lock identity. Defaults to a single-node
    /// [`StaticLock`] that is always held.
    pub fn lock(mut self, lock: Arc<dyn ClusterLock>) -> Self {
        self.lock = lock;
        self
    }

    /// Supply the monotonic clock used for deferral deadlines. Defaults
    /// to [`fate_core::MonotonicClock`]; tests substitute
    /// [`fate_core::FakeClock`] for deterministic control.
    pub fn clock(mut self, clock: Arc<dyn fate_core::Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the scheduler configuration wholesale.
    pub fn config(mut self, config: FateConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the worker pool size.
    pub fn worker_pool_size(mut self, n: usize) -> Self {
        self.config.worker_pool_size = n;
        self
    }

    /// Set the deferred-map capacity.
    pub fn max_deferred(mut self, n: usize) -> Self {
        self.config.max_deferred = n;
        self
    }

    /// Build the store, recover orphaned reservations under this
    /// process's lock identity, and start the worker pool.
    pub fn build(self) -> Fate<E> {
        let store = Arc::new(InMemoryTransactionStore::with_clock(self.clock));
        if let Some(live) = self.lock.current() {
            store.recover(live);
        }
        let env = Arc::new(self.env);
        let executor = Executor::start(store.clone(), self.lock.clone(), env, self.config);
        Fate {
            store,
            lock: self.lock,
            executor,
        }
    }
}

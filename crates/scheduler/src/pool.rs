//! The worker pool: the executor loop that drives runnable transactions,
//! plus the compensation engine that unwinds a failed one.

use crate::config::SchedulerConfig;
use crate::deferred::DeferredState;
use fate_core::error::StepError;
use fate_core::{FateException, Status, Step, TxInfoKey};
use fate_lock::ClusterLock;
use fate_store::{InMemoryTransactionStore, ReservedTx};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Shared state every worker thread reads from. Cheap to clone (an `Arc`)
/// so each thread gets its own handle.
struct Shared<E> {
    store: Arc<InMemoryTransactionStore<E>>,
    lock: Arc<dyn ClusterLock>,
    deferred: Arc<DeferredState>,
    config: SchedulerConfig,
    env: Arc<E>,
    shutdown: Arc<AtomicBool>,
    target_size: Arc<AtomicUsize>,
}

/// The pool of worker threads that drives every reservable transaction
/// through its step loop or compensation loop.
///
/// `E` is the embedder's step environment, threaded unchanged into every
/// `Step` call.
pub struct Executor<E> {
    shared: Arc<Shared<E>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: Send + Sync + 'static> Executor<E> {
    /// Start a pool sized by `config.worker_pool_size`.
    pub fn start(
        store: Arc<InMemoryTransactionStore<E>>,
        lock: Arc<dyn ClusterLock>,
        env: Arc<E>,
        config: SchedulerConfig,
    ) -> Self {
        let deferred = Arc::new(DeferredState::new(config.max_deferred));
        let target_size = Arc::new(AtomicUsize::new(config.worker_pool_size));
        let shared = Arc::new(Shared {
            store,
            lock,
            deferred,
            config,
            env,
            shutdown: Arc::new(AtomicBool::new(false)),
            target_size,
        });

        let mut threads = Vec::new();
        for idx in 0..shared.config.worker_pool_size {
            threads.push(spawn_worker(idx, shared.clone()));
        }

        Executor {
            shared,
            threads: Mutex::new(threads),
        }
    }

    /// Current size of the deferred map.
    pub fn deferred_count(&self) -> usize {
        self.shared.deferred.deferred_count()
    }

    /// Whether the overflow flag is currently tripped.
    pub fn overflow_active(&self) -> bool {
        self.shared.deferred.overflow_active()
    }

    /// Resize the pool. Workers observe this between iterations of their
    /// own loop, never mid-step.
    pub fn resize(&self, new_size: usize) {
        let old_size = self.shared.target_size.swap(new_size, Ordering::SeqCst);
        if new_size > old_size {
            let mut threads = self.threads.lock();
            for idx in old_size..new_size {
                threads.push(spawn_worker(idx, self.shared.clone()));
            }
        }
        // Shrinking: threads with idx >= new_size notice on their next
        // iteration and exit; stale JoinHandles are reaped on shutdown.
    }

    /// Stop the pool. Workers finish whatever reservation they currently
    /// hold (or are interrupted after `timeout`) and then exit; joins all
    /// threads.
    ///
    /// Standard threads cannot be preempted, so a step that ignores the
    /// interrupt flag keeps running past `timeout` — this is a cooperative
    /// shutdown, not a hard kill.
    pub fn shutdown(&self, timeout: Duration) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        let deadline = std::time::Instant::now() + timeout;
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                // Grace period spent; stop waiting on the rest. The OS
                // thread keeps running until its current step yields.
                drop(handle);
                continue;
            }
            let _ = handle.join();
        }
    }
}

fn spawn_worker<E: Send + Sync + 'static>(idx: usize, shared: Arc<Shared<E>>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("fate-worker-{idx}"))
        .spawn(move || worker_loop(idx, shared))
        .expect("failed to spawn fate worker thread")
}

fn worker_loop<E: Send + Sync + 'static>(idx: usize, shared: Arc<Shared<E>>) {
    std::thread::sleep(shared.config.poll_initial_delay);
    let mut backoff = shared.config.poll_min_interval;

    loop {
        if shared.shutdown.load(Ordering::SeqCst) {
            return;
        }
        if idx >= shared.target_size.load(Ordering::SeqCst) {
            tracing::debug!(worker = idx, "pool shrank below this worker's index; exiting");
            return;
        }
        if !shared.lock.is_held() {
            // Cluster lock lost: outstanding work must be abandoned
            // before any further mutation. Stop claiming new work until
            // the lock is regained.
            std::thread::sleep(shared.config.poll_min_interval);
            continue;
        }

        let owner = match shared.lock.current() {
            Some(id) => id,
            None => {
                std::thread::sleep(shared.config.poll_min_interval);
                continue;
            }
        };

        let ignore_deferrals = shared.deferred.ignore_deferrals();
        let runnable = shared.store.runnable(ignore_deferrals);
        let mut did_work = false;

        for id in runnable {
            if shared.shutdown.load(Ordering::SeqCst) {
                break;
            }
            match shared.store.try_reserve(id, owner) {
                Ok(Some(tx)) => {
                    did_work = true;
                    process_one(&shared, tx);
                }
                Ok(None) => continue, // another worker claimed it first
                Err(_) => continue, // deleted or vanished between scan and claim
            }
        }
        shared.deferred.end_pass();

        if did_work {
            backoff = shared.config.poll_min_interval;
        } else {
            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(shared.config.poll_max_interval);
        }
    }
}

/// Dispatch on a freshly reserved transaction's status, drive it through
/// one step-loop or compensation-loop pass, and release the reservation.
fn process_one<E>(shared: &Shared<E>, tx: ReservedTx<E>) {
    let status = match tx.get_status() {
        Ok(s) => s,
        Err(_) => {
            tx.release();
            return;
        }
    };

    match status {
        Status::New => {
            // Not seeded yet; nothing to run.
            tx.release();
        }
        Status::Submitted => {
            if tx.set_status(Status::InProgress).is_err() {
                tx.release();
                return;
            }
            step_loop(shared, &tx);
            maybe_auto_clean(&tx);
            tx.release();
        }
        Status::InProgress => {
            step_loop(shared, &tx);
            maybe_auto_clean(&tx);
            tx.release();
        }
        Status::FailedInProgress => {
            compensation_loop(shared, &tx);
            maybe_auto_clean(&tx);
            tx.release();
        }
        Status::Successful | Status::Failed => {
            maybe_auto_clean(&tx);
            tx.release();
        }
        Status::Unknown => {
            tx.release();
        }
    }
}

/// Drive the step stack forward while it is ready, not yet empty, and not
/// failed. Runs multiple steps back to back under a single reservation
/// hold when each is immediately ready — the reservation is this worker's
/// alone, so there is no correctness reason to release and re-reserve
/// between them.
fn step_loop<E>(shared: &Shared<E>, tx: &ReservedTx<E>) {
    loop {
        let top = match tx.peek_top() {
            Ok(Some(step)) => step,
            Ok(None) => {
                let _ = tx.set_status(Status::Successful);
                return;
            }
            Err(_) => return,
        };

        if shared.shutdown.load(Ordering::SeqCst) {
            // Interrupted mid-step: translated into a failure path like any
            // other.
            let exception = FateException::interrupted(top.name());
            let _ = tx.set_exception(exception);
            let _ = tx.set_status(Status::FailedInProgress);
            return;
        }

        if !shared.lock.is_held() {
            // The cluster lock session this reservation was made under is
            // gone. This worker can no longer tell whether it is still the
            // sole owner of the row, so it must stop mutating it right
            // here; a new owner reclaims it via `recover()` once it
            // acquires the lock under a fresh id.
            return;
        }

        let id = tx.id();
        match top.is_ready(id, &shared.env) {
            Ok(0) => {}
            Ok(delay_ms) => {
                if tx.defer(delay_ms).is_ok() {
                    shared.deferred.record_deferral(id);
                }
                return;
            }
            Err(e) => {
                fail(tx, &e);
                return;
            }
        }

        match top.call(id, &shared.env) {
            Ok(Some(next)) => {
                if tx.push(Arc::from(next)).is_err() {
                    return;
                }
            }
            Ok(None) => {
                // If this pop empties the stack, `top` is the terminal
                // step: its return value becomes the transaction's result.
                if matches!(tx.stack_len(), Ok(1)) {
                    if let Some(rv) = top.return_value() {
                        let _ = tx.set_return_value(rv);
                    }
                }
                if tx.pop().is_err() {
                    return;
                }
            }
            Err(e) => {
                fail(tx, &e);
                return;
            }
        }
    }
}

fn fail<E>(tx: &ReservedTx<E>, err: &StepError) {
    let exception = FateException::from_step_error(err);
    let _ = tx.set_exception(exception);
    // The step that threw stays on the stack; compensation pops it first.
    let _ = tx.set_status(Status::FailedInProgress);
}

/// Walk the stack in reverse, undoing every step that was pushed — exactly
/// the ones present right now, since a step is never popped before it
/// completes successfully.
fn compensation_loop<E>(shared: &Shared<E>, tx: &ReservedTx<E>) {
    loop {
        if !shared.lock.is_held() {
            // Same reasoning as in `step_loop`: stop undoing further steps
            // once this process can no longer vouch for sole ownership of
            // the row.
            return;
        }
        match tx.pop() {
            Ok(Some(step)) => {
                if let Err(e) = step.undo(tx.id(), &shared.env) {
                    tracing::error!(
                        id = %tx.id(),
                        step = step.name(),
                        error = %e,
                        "undo() failed; compensation continues"
                    );
                }
            }
            Ok(None) => break,
            Err(_) => return,
        }
    }
    let _ = tx.set_status(Status::Failed);
}

fn maybe_auto_clean<E>(tx: &ReservedTx<E>) {
    let status = match tx.get_status() {
        Ok(s) => s,
        Err(_) => return,
    };
    if !status.is_terminal() {
        return;
    }
    let auto_clean = tx
        .get_transaction_info(&TxInfoKey::AutoClean)
        .ok()
        .flatten()
        .and_then(|v| v.as_str().map(|s| s == "true"))
        .unwrap_or(false);
    if auto_clean {
        let _ = tx.delete();
    }
}

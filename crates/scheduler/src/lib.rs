//! The FATE executor: worker pool, deferral/overflow bookkeeping, and the
//! compensation engine.
//!
//! This crate owns no durable state of its own — everything it touches
//! lives in `fate-store` rows — and requires no in-process locks on
//! transaction state beyond the small [`deferred::DeferredState`] guard;
//! cross-worker exclusion is entirely the store's reservation protocol.

#![warn(missing_docs)]

mod config;
mod deferred;
mod pool;

pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use deferred::DeferredState;
pub use pool::Executor;

#[cfg(test)]
mod tests {
    use super::*;
    use fate_core::fixtures::CountingStep;
    use fate_core::{FakeClock, FateId, Status};
    use fate_lock::StaticLock;
    use fate_store::InMemoryTransactionStore;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    type Env = ();

    fn fast_config(pool_size: usize) -> SchedulerConfig {
        SchedulerConfig::builder()
            .poll_initial_delay(Duration::from_millis(1))
            .poll_min_interval(Duration::from_millis(1))
            .poll_max_interval(Duration::from_millis(20))
            .worker_pool_size(pool_size)
            .build()
    }

    fn wait_until<F: Fn() -> bool>(pred: F, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if pred() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        pred()
    }

    #[test]
    fn drives_a_seeded_transaction_to_successful() {
        let clock = FakeClock::new();
        let store: Arc<InMemoryTransactionStore<Env>> =
            Arc::new(InMemoryTransactionStore::with_clock(clock));
        let lock = Arc::new(StaticLock::acquire());
        let env = Arc::new(());

        let id = store.create();
        let calls = Arc::new(AtomicUsize::new(0));
        let undos = Arc::new(AtomicUsize::new(0));
        let step: Arc<dyn fate_core::Step<Env>> = Arc::new(CountingStep {
            label: "only-step",
            calls: calls.clone(),
            undos,
        });
        {
            let tx = store
                .try_reserve(id, lock.current().unwrap())
                .unwrap()
                .unwrap();
            tx.push(step).unwrap();
            tx.set_status(Status::Submitted).unwrap();
            tx.release();
        }

        let executor = Executor::start(store.clone(), lock, env, fast_config(2));
        let reached = wait_until(
            || store.status_of(id) == Status::Successful,
            Duration::from_secs(2),
        );
        executor.shutdown(Duration::from_secs(1));

        assert!(reached, "expected transaction to reach SUCCESSFUL");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn compensates_in_reverse_order_on_failure() {
        use fate_core::error::StepError;
        use fate_core::FateException;

        struct FailingThird {
            order: Arc<parking_lot::Mutex<Vec<&'static str>>>,
        }
        impl fate_core::Step<Env> for FailingThird {
            fn name(&self) -> &str {
                "op3"
            }
            fn is_ready(&self, _id: FateId, _env: &Env) -> Result<u64, StepError> {
                Ok(0)
            }
            fn call(
                &self,
                _id: FateId,
                _env: &Env,
            ) -> Result<Option<Box<dyn fate_core::Step<Env>>>, StepError> {
                Err(StepError::CallFailed {
                    step: "op3".into(),
                    message: "call() failed".into(),
                })
            }
            fn undo(&self, _id: FateId, _env: &Env) -> Result<(), StepError> {
                self.order.lock().push("op3");
                Ok(())
            }
        }

        struct Recording {
            label: &'static str,
            order: Arc<parking_lot::Mutex<Vec<&'static str>>>,
            next: std::sync::Mutex<Option<Box<dyn fate_core::Step<Env>>>>,
        }
        impl fate_core::Step<Env> for Recording {
            fn name(&self) -> &str {
                self.label
            }
            fn is_ready(&self, _id: FateId, _env: &Env) -> Result<u64, StepError> {
                Ok(0)
            }
            fn call(
                &self,
                _id: FateId,
                _env: &Env,
            ) -> Result<Option<Box<dyn fate_core::Step<Env>>>, StepError> {
                Ok(self.next.lock().unwrap().take())
            }
            fn undo(&self, _id: FateId, _env: &Env) -> Result<(), StepError> {
                self.order.lock().push(self.label);
                Ok(())
            }
        }

        let clock = FakeClock::new();
        let store: Arc<InMemoryTransactionStore<Env>> =
            Arc::new(InMemoryTransactionStore::with_clock(clock));
        let lock = Arc::new(StaticLock::acquire());
        let env = Arc::new(());
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        // Each step's call() returns the next one, exactly as a real step
        // chain would (seed pushes only op1; op2 and op3 appear on the
        // stack because op1's and op2's call() returned them) — this keeps
        // "never-called steps are not undone" automatically satisfied,
        // since only the final, never-reached step could ever be pushed
        // without its own call() having run.
        let op3: Box<dyn fate_core::Step<Env>> = Box::new(FailingThird { order: order.clone() });
        let op2: Box<dyn fate_core::Step<Env>> = Box::new(Recording {
            label: "op2",
            order: order.clone(),
            next: std::sync::Mutex::new(Some(op3)),
        });
        let op1: Box<dyn fate_core::Step<Env>> = Box::new(Recording {
            label: "op1",
            order: order.clone(),
            next: std::sync::Mutex::new(Some(op2)),
        });

        let id = store.create();
        {
            let tx = store
                .try_reserve(id, lock.current().unwrap())
                .unwrap()
                .unwrap();
            tx.push(Arc::from(op1)).unwrap();
            tx.set_status(Status::Submitted).unwrap();
            tx.release();
        }

        let executor = Executor::start(store.clone(), lock, env, fast_config(2));
        let reached = wait_until(
            || store.status_of(id) == Status::Failed,
            Duration::from_secs(2),
        );
        executor.shutdown(Duration::from_secs(1));

        assert!(reached, "expected transaction to reach FAILED");
        assert_eq!(*order.lock(), vec!["op3", "op2", "op1"]);

        let exc: FateException = store.get_exception(id).unwrap();
        assert!(exc.message.contains("call() failed"));
    }

    #[test]
    fn lock_loss_mid_flight_aborts_further_steps_until_recovered() {
        use fate_core::error::StepError;
        use fate_lock::{FaultInjectedLock, LockId};
        use std::sync::mpsc;

        /// Signals it has started, then blocks until the test lets it
        /// continue — simulating a step whose `call()` is running exactly
        /// when the cluster lock is lost.
        struct SignalThenWait {
            started: mpsc::Sender<()>,
            proceed: Arc<AtomicBool>,
        }
        impl fate_core::Step<Env> for SignalThenWait {
            fn name(&self) -> &str {
                "signal-then-wait"
            }
            fn is_ready(&self, _id: FateId, _env: &Env) -> Result<u64, StepError> {
                Ok(0)
            }
            fn call(
                &self,
                _id: FateId,
                _env: &Env,
            ) -> Result<Option<Box<dyn fate_core::Step<Env>>>, StepError> {
                let _ = self.started.send(());
                while !self.proceed.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(2));
                }
                Ok(Some(Box::new(NeverCalled) as Box<dyn fate_core::Step<Env>>))
            }
            fn undo(&self, _id: FateId, _env: &Env) -> Result<(), StepError> {
                Ok(())
            }
        }

        struct NeverCalled;
        impl fate_core::Step<Env> for NeverCalled {
            fn name(&self) -> &str {
                "never-called"
            }
            fn is_ready(&self, _id: FateId, _env: &Env) -> Result<u64, StepError> {
                Ok(0)
            }
            fn call(
                &self,
                _id: FateId,
                _env: &Env,
            ) -> Result<Option<Box<dyn fate_core::Step<Env>>>, StepError> {
                panic!("must not run once the cluster lock has been lost")
            }
            fn undo(&self, _id: FateId, _env: &Env) -> Result<(), StepError> {
                Ok(())
            }
        }

        let store: Arc<InMemoryTransactionStore<Env>> = Arc::new(InMemoryTransactionStore::new());
        let lock = Arc::new(FaultInjectedLock::acquire());
        let env = Arc::new(());

        let (started_tx, started_rx) = mpsc::channel();
        let proceed = Arc::new(AtomicBool::new(false));
        let id = store.create();
        {
            let tx = store
                .try_reserve(id, lock.current().unwrap())
                .unwrap()
                .unwrap();
            tx.push(Arc::new(SignalThenWait {
                started: started_tx,
                proceed: proceed.clone(),
            }))
            .unwrap();
            tx.set_status(Status::Submitted).unwrap();
            tx.release();
        }

        let executor = Executor::start(store.clone(), lock.clone(), env, fast_config(1));
        started_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("step never started");

        lock.lose();
        proceed.store(true, Ordering::SeqCst);

        // Give the worker a moment to wake up, notice the lost lock, and
        // abort before touching the row again.
        std::thread::sleep(Duration::from_millis(150));
        executor.shutdown(Duration::from_secs(1));

        assert_eq!(store.status_of(id), Status::InProgress);

        let new_owner = LockId::new();
        assert!(
            store.try_reserve(id, new_owner).unwrap().is_none(),
            "the orphaned reservation must stay held by the stale owner until recover()"
        );
        store.recover(new_owner);
        let reclaimed = store
            .try_reserve(id, new_owner)
            .unwrap()
            .expect("recover() should free the orphaned reservation for a new owner");
        assert_eq!(reclaimed.stack_len().unwrap(), 1);
    }
}

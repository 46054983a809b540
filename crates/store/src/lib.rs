//! The durable store for FATE transactions.
//!
//! This crate supplies the in-memory, lock-striped row table that backs
//! every transaction: a `dashmap::DashMap` sharded by id, with each row
//! behind its own `parking_lot::Mutex`. Optional crash-recovery journaling
//! lives behind the `journal` feature (`fate_store::journal`).
//!
//! Reservation is the linchpin: every mutating method on a
//! [`ReservedTx`] re-validates the `(owner, serial)` tuple against the
//! row before touching it, so a worker that lost its reservation — because
//! its process died and a new owner reclaimed the row — finds out on its
//! very next write instead of silently clobbering the new owner's progress.

#![warn(missing_docs)]

mod filter;
#[cfg(feature = "journal")]
pub mod journal;
mod row;

pub use filter::{TxFilter, TxView};

use fate_core::{Clock, FateException, FateId, FateIdGenerator, MonotonicClock, Status, Step, StateError, StepCodec, TxInfoKey, Value};
use fate_lock::LockId;
use parking_lot::Mutex;
use row::Row;
use std::sync::Arc;

type RowHandle<E> = Arc<Mutex<Row<E>>>;

/// The durable store. Parameterized by `E`, the embedder's step
/// environment, so the stack can hold `Arc<dyn Step<E>>` without an
/// unconstrained type parameter leaking into every call site.
pub struct InMemoryTransactionStore<E> {
    rows: dashmap::DashMap<FateId, RowHandle<E>>,
    id_gen: FateIdGenerator,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "journal")]
    journal: Option<journal::JournalHandle>,
    #[cfg(feature = "journal")]
    codec: Option<Arc<dyn StepCodec<E>>>,
}

impl<E> InMemoryTransactionStore<E> {
    /// Create an empty store with a process-monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock::new())
    }

    /// Create an empty store with an explicit clock (tests use
    /// [`fate_core::FakeClock`] for deterministic deferral behavior).
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        InMemoryTransactionStore {
            rows: dashmap::DashMap::new(),
            id_gen: FateId::generator(),
            clock,
            #[cfg(feature = "journal")]
            journal: None,
            #[cfg(feature = "journal")]
            codec: None,
        }
    }

    /// Create a store backed by an on-disk journal, replaying every record
    /// already there to fully reconstruct each row: id allocation, status,
    /// deletion, and — if `codec` is supplied — the step stack itself.
    ///
    /// Without a `codec`, `Pushed`/`Popped` records are skipped during
    /// replay and every recovered row comes back with an empty stack: the
    /// journal has no way to turn the recorded bytes back into `Arc<dyn
    /// Step<E>>` on its own. This mirrors the contract in
    /// [`fate_core::StepCodec`].
    #[cfg(feature = "journal")]
    pub fn with_journal(
        clock: Arc<dyn Clock>,
        journal: journal::JournalHandle,
        codec: Option<Arc<dyn StepCodec<E>>>,
    ) -> Result<Self, journal::JournalError> {
        let id_gen = FateId::generator();
        let rows: dashmap::DashMap<FateId, RowHandle<E>> = dashmap::DashMap::new();
        for record in journal.replay()? {
            match record {
                journal::JournalRecord::Created { id } => {
                    id_gen.observe(id);
                    rows.entry(id).or_insert_with(|| Arc::new(Mutex::new(Row::new())));
                }
                journal::JournalRecord::StatusChanged { id, to } => {
                    if let Some(row) = rows.get(&id) {
                        row.lock().status = to;
                    }
                }
                journal::JournalRecord::Deleted { id } => {
                    if let Some(row) = rows.get(&id) {
                        let mut row = row.lock();
                        row.deleted = true;
                        row.stack.clear();
                    }
                }
                journal::JournalRecord::Pushed { id, step_name, bytes } => {
                    if let Some(codec) = &codec {
                        if let Some(row) = rows.get(&id) {
                            match codec.decode(&step_name, &bytes) {
                                Ok(step) => row.lock().stack.push(step),
                                Err(e) => tracing::error!(%id, step = %step_name, error = %e, "failed to decode journaled step; stack entry dropped"),
                            }
                        }
                    }
                }
                journal::JournalRecord::Popped { id } => {
                    if codec.is_some() {
                        if let Some(row) = rows.get(&id) {
                            row.lock().stack.pop();
                        }
                    }
                }
            }
        }
        Ok(InMemoryTransactionStore {
            rows,
            id_gen,
            clock,
            journal: Some(journal),
            codec,
        })
    }

    /// Allocate a new transaction. Inserts a row at `Status::New` with an
    /// empty stack and no operation tag.
    pub fn create(&self) -> FateId {
        loop {
            let id = self.id_gen.next();
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.rows.entry(id) {
                slot.insert(Arc::new(Mutex::new(Row::new())));
                #[cfg(feature = "journal")]
                if let Some(journal) = &self.journal {
                    if let Err(e) = journal.append(&journal::JournalRecord::Created { id }) {
                        tracing::error!(%id, error = %e, "failed to journal transaction creation");
                    }
                }
                return id;
            }
            // Collision: this dense generator should never repeat an id
            // already present. Retry with the next one.
        }
    }

    /// Current status of `id`, or `Status::Unknown` if no row exists, or
    /// if it was `delete`d — a deleted row is indistinguishable from one
    /// that never existed.
    pub fn status_of(&self, id: FateId) -> Status {
        match self.rows.get(&id) {
            Some(row) => {
                let row = row.lock();
                if row.deleted {
                    Status::Unknown
                } else {
                    row.status
                }
            }
            None => Status::Unknown,
        }
    }

    /// The failure record for `id`, if it has one and the row has not
    /// been deleted.
    pub fn get_exception(&self, id: FateId) -> Option<FateException> {
        self.rows.get(&id).and_then(|row| {
            let row = row.lock();
            if row.deleted {
                None
            } else {
                row.exception.clone()
            }
        })
    }

    /// The step return value for `id`, if one was ever recorded and the
    /// row has not been deleted.
    pub fn get_return_value(&self, id: FateId) -> Option<Value> {
        self.rows.get(&id).and_then(|row| {
            let row = row.lock();
            if row.deleted {
                None
            } else {
                row.return_value.clone()
            }
        })
    }

    /// Snapshot listing, filtered by status and/or operation tag. Each
    /// row's view is internally consistent; the overall list is not a
    /// single consistent snapshot.
    pub fn list(&self, filter: &TxFilter) -> Vec<TxView> {
        self.rows
            .iter()
            .filter_map(|entry| {
                let row = entry.value().lock();
                if row.deleted || !filter.matches(row.status, row.op_tag.as_deref()) {
                    return None;
                }
                Some(TxView {
                    id: *entry.key(),
                    status: row.status,
                    op_tag: row.op_tag.clone(),
                    stack_depth: row.stack.len(),
                    exception: row.exception.clone(),
                    info: row.info.clone(),
                })
            })
            .collect()
    }

    /// Every id whose status is a runnable candidate (`NEW`, `SUBMITTED`,
    /// `IN_PROGRESS`, or `FAILED_IN_PROGRESS`) and whose deferral deadline
    /// has passed — or every such id regardless of deadline, if
    /// `ignore_deferrals` is set.
    ///
    /// One pass, one snapshot: the scheduler owns the polling loop and
    /// its own backoff; this method never blocks.
    pub fn runnable(&self, ignore_deferrals: bool) -> Vec<FateId> {
        let now = self.clock.now_millis();
        self.rows
            .iter()
            .filter_map(|entry| {
                let row = entry.value().lock();
                if row.deleted || !row.status.is_runnable_candidate() {
                    return None;
                }
                if row.reservation.is_some() {
                    return None;
                }
                let due = ignore_deferrals || row.defer_until.map_or(true, |d| d <= now);
                due.then_some(*entry.key())
            })
            .collect()
    }

    /// Non-blocking reservation attempt. Returns `Ok(None)` if another
    /// worker already holds `id`.
    pub fn try_reserve(&self, id: FateId, owner: LockId) -> Result<Option<ReservedTx<E>>, StateError> {
        let handle = self
            .rows
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StateError::NoSuchTransaction(id))?;
        let mut row = handle.lock();
        if row.deleted {
            return Err(StateError::Deleted(id));
        }
        if row.reservation.is_some() {
            return Ok(None);
        }
        let serial = row.next_serial;
        row.next_serial += 1;
        row.reservation = Some((owner, serial));
        drop(row);
        Ok(Some(ReservedTx {
            id,
            owner,
            serial,
            row: handle,
            clock: self.clock.clone(),
            #[cfg(feature = "journal")]
            journal: self.journal.clone(),
            #[cfg(feature = "journal")]
            codec: self.codec.clone(),
        }))
    }

    /// Blocking reservation: retries [`try_reserve`](Self::try_reserve)
    /// with a short capped backoff until it succeeds.
    pub fn reserve(&self, id: FateId, owner: LockId) -> Result<ReservedTx<E>, StateError> {
        let mut backoff_us = 100u64;
        loop {
            if let Some(reserved) = self.try_reserve(id, owner)? {
                return Ok(reserved);
            }
            std::thread::sleep(std::time::Duration::from_micros(backoff_us));
            backoff_us = (backoff_us * 2).min(5_000);
        }
    }

    /// Clear every reservation in the store. Called once at startup after
    /// acquiring `live`. Every reservation recorded before this process
    /// started belongs, by construction, to a previous — and therefore
    /// dead — lock generation, so recovery is unconditional.
    pub fn recover(&self, live: LockId) {
        let mut cleared = 0u32;
        for entry in self.rows.iter() {
            let mut row = entry.value().lock();
            if row.reservation.take().is_some() {
                cleared += 1;
            }
        }
        tracing::info!(lock_id = %live, cleared, "cleared orphaned reservations at startup");
    }
}

impl<E> Default for InMemoryTransactionStore<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle proving sole ownership of a transaction, returned by
/// [`InMemoryTransactionStore::reserve`] / `try_reserve`. Every method
/// re-validates the `(owner, serial)` tuple before mutating.
pub struct ReservedTx<E> {
    id: FateId,
    owner: LockId,
    serial: u64,
    row: RowHandle<E>,
    clock: Arc<dyn Clock>,
    #[cfg(feature = "journal")]
    journal: Option<journal::JournalHandle>,
    #[cfg(feature = "journal")]
    codec: Option<Arc<dyn StepCodec<E>>>,
}

impl<E> ReservedTx<E> {
    /// The reserved transaction's id.
    pub fn id(&self) -> FateId {
        self.id
    }

    fn guard(&self) -> Result<parking_lot::MutexGuard<'_, Row<E>>, StateError> {
        let row = self.row.lock();
        if row.deleted {
            return Err(StateError::Deleted(self.id));
        }
        match row.reservation {
            Some((owner, serial)) if owner == self.owner && serial == self.serial => Ok(row),
            _ => Err(StateError::LostReservation(self.id)),
        }
    }

    /// Current status.
    pub fn get_status(&self) -> Result<Status, StateError> {
        Ok(self.guard()?.status)
    }

    /// Set the status, validating the transition against the legal
    /// transition table.
    pub fn set_status(&self, to: Status) -> Result<(), StateError> {
        let mut row = self.guard()?;
        let from = row.status;
        if !from.can_transition_to(to) {
            return Err(StateError::WrongStatus {
                id: self.id,
                from,
                to,
            });
        }
        row.status = to;
        drop(row);
        #[cfg(feature = "journal")]
        self.append_journal(journal::JournalRecord::StatusChanged { id: self.id, to });
        Ok(())
    }

    /// Set the operation tag. Only meaningful before the first seeding
    /// call; the store itself does not enforce immutability here (the
    /// `fate-api` facade does).
    pub fn set_op_tag(&self, op_tag: impl Into<String>) -> Result<(), StateError> {
        let mut row = self.guard()?;
        row.op_tag = Some(op_tag.into());
        Ok(())
    }

    /// The operation tag, if set.
    pub fn op_tag(&self) -> Result<Option<String>, StateError> {
        Ok(self.guard()?.op_tag.clone())
    }

    /// Write a transaction-info entry.
    pub fn set_transaction_info(&self, key: &TxInfoKey, value: Value) -> Result<(), StateError> {
        let mut row = self.guard()?;
        row.info.insert(key.as_str().to_string(), value);
        Ok(())
    }

    /// Read a transaction-info entry.
    pub fn get_transaction_info(&self, key: &TxInfoKey) -> Result<Option<Value>, StateError> {
        Ok(self.guard()?.info_get(key).cloned())
    }

    /// Number of steps currently on the stack.
    pub fn stack_len(&self) -> Result<usize, StateError> {
        Ok(self.guard()?.stack.len())
    }

    /// Clone a reference to the top step, if any, without holding the
    /// row lock across the caller's use of it — `isReady`/`call`/`undo`
    /// may block indefinitely and must never be invoked while this store
    /// is locked.
    pub fn peek_top(&self) -> Result<Option<Arc<dyn Step<E>>>, StateError> {
        Ok(self.guard()?.stack.last().cloned())
    }

    /// Push a step onto the top of the stack. Journaled (as `Pushed`) when
    /// the journal feature is enabled and a `StepCodec` was supplied, so
    /// the stack survives a restart; otherwise this is in-memory only.
    pub fn push(&self, step: Arc<dyn Step<E>>) -> Result<(), StateError> {
        let mut row = self.guard()?;
        #[cfg(feature = "journal")]
        self.append_push_journal(step.as_ref());
        row.stack.push(step);
        Ok(())
    }

    /// Pop the top of the stack, returning it.
    pub fn pop(&self) -> Result<Option<Arc<dyn Step<E>>>, StateError> {
        let mut row = self.guard()?;
        let popped = row.stack.pop();
        drop(row);
        #[cfg(feature = "journal")]
        if popped.is_some() {
            self.append_journal(journal::JournalRecord::Popped { id: self.id });
        }
        Ok(popped)
    }

    /// Persist a deferral deadline `delay_ms` from now.
    pub fn defer(&self, delay_ms: u64) -> Result<(), StateError> {
        let now = self.clock.now_millis();
        let mut row = self.guard()?;
        row.defer_until = Some(now.saturating_add(delay_ms));
        Ok(())
    }

    /// Record the terminal exception for a `FAILED_IN_PROGRESS`/`FAILED`
    /// transaction. The *original* failure only — compensation failures
    /// are logged, never stored here.
    pub fn set_exception(&self, exception: FateException) -> Result<(), StateError> {
        let mut row = self.guard()?;
        row.exception = Some(exception);
        Ok(())
    }

    /// Record the terminal step's return value.
    pub fn set_return_value(&self, value: Value) -> Result<(), StateError> {
        let mut row = self.guard()?;
        row.return_value = Some(value);
        Ok(())
    }

    /// Remove this row. Every subsequent call on this (or any other)
    /// handle to the same id fails with `StateError::Deleted`.
    pub fn delete(&self) -> Result<(), StateError> {
        let mut row = self.guard()?;
        if !row.status.is_terminal() {
            return Err(StateError::WrongStatus {
                id: self.id,
                from: row.status,
                to: Status::Unknown,
            });
        }
        row.deleted = true;
        row.reservation = None;
        drop(row);
        #[cfg(feature = "journal")]
        self.append_journal(journal::JournalRecord::Deleted { id: self.id });
        Ok(())
    }

    /// Release this reservation without deleting or otherwise mutating
    /// the row, so another worker may claim it. Used when a worker finds
    /// nothing to do (e.g. row is still `NEW`) or after a clean step-loop
    /// exit.
    pub fn release(self) {
        if let Ok(mut row) = self.guard() {
            if row.reservation == Some((self.owner, self.serial)) {
                row.reservation = None;
            }
        }
    }

    #[cfg(feature = "journal")]
    fn append_journal(&self, record: journal::JournalRecord) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.append(&record) {
                tracing::error!(id = %self.id, error = %e, "failed to append journal record");
            }
        }
    }

    /// Encode and journal `step` as a `Pushed` record, if both a journal
    /// and a codec are configured. Silent no-op otherwise — a store
    /// without a codec journals status/lifecycle only, per
    /// [`fate_core::StepCodec`]'s contract.
    #[cfg(feature = "journal")]
    fn append_push_journal(&self, step: &dyn Step<E>) {
        let (Some(journal), Some(codec)) = (&self.journal, &self.codec) else {
            return;
        };
        match codec.encode(step) {
            Ok(bytes) => {
                let record = journal::JournalRecord::Pushed {
                    id: self.id,
                    step_name: step.name().to_string(),
                    bytes,
                };
                if let Err(e) = journal.append(&record) {
                    tracing::error!(id = %self.id, error = %e, "failed to append journal record");
                }
            }
            Err(e) => {
                tracing::error!(id = %self.id, step = %step.name(), error = %e, "failed to encode step for journal");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fate_core::error::StepError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Env = ();

    /// A step that always succeeds immediately and counts its own calls —
    /// local to this crate's tests; `fate-core`'s own `Step` fixtures are
    /// not part of its public surface.
    struct CountingStep {
        label: &'static str,
        calls: Arc<AtomicUsize>,
        undos: Arc<AtomicUsize>,
    }

    impl Step<Env> for CountingStep {
        fn name(&self) -> &str {
            self.label
        }

        fn is_ready(&self, _id: FateId, _env: &Env) -> Result<u64, StepError> {
            Ok(0)
        }

        fn call(&self, _id: FateId, _env: &Env) -> Result<Option<Box<dyn Step<Env>>>, StepError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }

        fn undo(&self, _id: FateId, _env: &Env) -> Result<(), StepError> {
            self.undos.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn create_starts_at_new_with_empty_stack() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        assert_eq!(store.status_of(id), Status::New);
        assert_eq!(store.list(&TxFilter::all()).len(), 1);
    }

    #[test]
    fn unknown_id_has_unknown_status() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let ghost = FateId::from_raw(9999);
        assert_eq!(store.status_of(ghost), Status::Unknown);
    }

    #[test]
    fn try_reserve_excludes_a_second_owner() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        let owner_a = LockId::new();
        let owner_b = LockId::new();

        let tx_a = store.try_reserve(id, owner_a).unwrap().unwrap();
        let attempt_b = store.try_reserve(id, owner_b).unwrap();
        assert!(attempt_b.is_none());

        tx_a.release();
        let tx_b = store.try_reserve(id, owner_b).unwrap();
        assert!(tx_b.is_some());
    }

    #[test]
    fn mutation_without_reservation_match_is_rejected() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        let owner = LockId::new();
        let tx = store.try_reserve(id, owner).unwrap().unwrap();
        tx.set_status(Status::Submitted).unwrap();

        tx.release();
        let tx2 = store.try_reserve(id, owner).unwrap().unwrap();
        assert_ne!(tx2.serial, 0);
    }

    #[test]
    fn push_pop_is_lifo() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        let tx = store.try_reserve(id, LockId::new()).unwrap().unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let undos = Arc::new(AtomicUsize::new(0));
        let s1: Arc<dyn Step<Env>> = Arc::new(CountingStep {
            label: "s1",
            calls: calls.clone(),
            undos: undos.clone(),
        });
        let s2: Arc<dyn Step<Env>> = Arc::new(CountingStep {
            label: "s2",
            calls,
            undos,
        });

        tx.push(s1.clone()).unwrap();
        tx.push(s2.clone()).unwrap();
        assert_eq!(tx.stack_len().unwrap(), 2);
        assert_eq!(tx.peek_top().unwrap().unwrap().name(), "s2");
        assert_eq!(tx.pop().unwrap().unwrap().name(), "s2");
        assert_eq!(tx.peek_top().unwrap().unwrap().name(), "s1");
    }

    #[test]
    fn delete_requires_terminal_status() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        let tx = store.try_reserve(id, LockId::new()).unwrap().unwrap();
        assert!(matches!(
            tx.delete(),
            Err(StateError::WrongStatus { .. })
        ));
    }

    #[test]
    fn write_after_delete_fails() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        let tx = store.try_reserve(id, LockId::new()).unwrap().unwrap();
        tx.set_status(Status::Submitted).unwrap();
        tx.set_status(Status::InProgress).unwrap();
        tx.set_status(Status::Successful).unwrap();
        tx.delete().unwrap();

        assert!(matches!(tx.set_status(Status::Failed), Err(StateError::Deleted(_))));
        assert!(matches!(tx.push(Arc::new(CountingStep {
            label: "x",
            calls: Arc::new(AtomicUsize::new(0)),
            undos: Arc::new(AtomicUsize::new(0)),
        })), Err(StateError::Deleted(_))));
        assert!(matches!(tx.pop(), Err(StateError::Deleted(_))));
        assert!(matches!(
            tx.set_transaction_info(&TxInfoKey::Reason, Value::from("x")),
            Err(StateError::Deleted(_))
        ));
        assert!(matches!(tx.delete(), Err(StateError::Deleted(_))));
        assert_eq!(store.status_of(id), Status::Unknown);
    }

    #[test]
    fn runnable_respects_deferral_deadline() {
        let clock = fate_core::FakeClock::new();
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::with_clock(clock.clone());
        let id = store.create();
        {
            let tx = store.try_reserve(id, LockId::new()).unwrap().unwrap();
            tx.set_status(Status::Submitted).unwrap();
            tx.defer(1_000).unwrap();
            tx.release();
        }

        assert!(store.runnable(false).is_empty());
        clock.advance(999);
        assert!(store.runnable(false).is_empty());
        clock.advance(1);
        assert_eq!(store.runnable(false), vec![id]);
    }

    #[test]
    fn runnable_ignores_deadline_on_overflow() {
        let clock = fate_core::FakeClock::new();
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::with_clock(clock);
        let id = store.create();
        {
            let tx = store.try_reserve(id, LockId::new()).unwrap().unwrap();
            tx.set_status(Status::Submitted).unwrap();
            tx.defer(60_000).unwrap();
            tx.release();
        }

        assert!(store.runnable(false).is_empty());
        assert_eq!(store.runnable(true), vec![id]);
    }

    #[test]
    fn recover_clears_all_reservations() {
        let store: InMemoryTransactionStore<Env> = InMemoryTransactionStore::new();
        let id = store.create();
        let old_owner = LockId::new();
        let tx = store.try_reserve(id, old_owner).unwrap().unwrap();
        std::mem::forget(tx); // simulate the owning process crashing

        let new_owner = LockId::new();
        assert!(store.try_reserve(id, new_owner).unwrap().is_none());
        store.recover(new_owner);
        assert!(store.try_reserve(id, new_owner).unwrap().is_some());
    }
}

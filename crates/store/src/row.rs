//! The in-memory representation of a single transaction's durable row.

use fate_core::{FateException, Status, Step, TxInfoKey, Value};
use fate_lock::LockId;
use std::collections::BTreeMap;
use std::sync::Arc;

/// `(owner, serial)`: proof of sole ownership over a row.
///
/// `serial` increases every time the row is reserved, so a worker that
/// cached an old `(owner, serial)` pair can detect a reclaim by a new
/// owner even if that owner happens to reuse the same [`LockId`] (it
/// won't, in practice — `LockId`s are minted fresh per acquisition — but
/// the serial makes the check independent of that assumption).
pub(crate) type Reservation = (LockId, u64);

/// A transaction's full durable state.
pub(crate) struct Row<E> {
    pub status: Status,
    pub stack: Vec<Arc<dyn Step<E>>>,
    pub op_tag: Option<String>,
    pub exception: Option<FateException>,
    pub return_value: Option<Value>,
    pub info: BTreeMap<String, Value>,
    pub reservation: Option<Reservation>,
    pub next_serial: u64,
    /// Absolute deadline (clock millis) before which `runnable()` should
    /// not offer this id, set by [`ReservedTx::defer`](crate::ReservedTx::defer).
    pub defer_until: Option<u64>,
    /// Set once [`delete`](crate::ReservedTx::delete) has run. The row
    /// stays in the store's map — an in-flight `ReservedTx` may still
    /// hold this `Arc` — so every mutation re-checks this flag instead.
    pub deleted: bool,
}

impl<E> Row<E> {
    pub fn new() -> Self {
        Row {
            status: Status::New,
            stack: Vec::new(),
            op_tag: None,
            exception: None,
            return_value: None,
            info: BTreeMap::new(),
            reservation: None,
            next_serial: 0,
            defer_until: None,
            deleted: false,
        }
    }

    pub fn info_get(&self, key: &TxInfoKey) -> Option<&Value> {
        self.info.get(key.as_str())
    }
}

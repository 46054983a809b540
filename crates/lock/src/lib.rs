//! Cluster lock identity.
//!
//! The cluster lock service is an external collaborator: it provides an
//! opaque, hierarchical ephemeral lock primitive, and on loss the store's
//! reservation layer must treat any rows reserved by the lost lock-id as
//! orphaned and eligible for recovery by a new lock-id. This crate
//! supplies the narrow contract FATE needs from it — a [`LockId`]
//! identifying the current holder, and a [`ClusterLock`] trait a process
//! can query to find out whether it still holds that identity — without
//! implementing the lock service itself.
//!
//! A thin coordination crate other crates depend on for a single
//! cross-cutting concern, with no storage or scheduling logic of its own.

#![warn(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Identifies the process (or process generation) that currently believes
/// it holds the cluster lock.
///
/// A fresh [`LockId`] is minted each time a process acquires the lock —
/// including when the *same* process reconnects after a session loss —
/// so that a reservation's `(owner-lock-id, serial)` tuple can distinguish
/// "the same worker, still alive" from "a new owner after a crash".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockId(Uuid);

impl LockId {
    /// Mint a new, unique lock id.
    pub fn new() -> Self {
        LockId(Uuid::new_v4())
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The contract FATE needs from the cluster lock service.
///
/// A `ClusterLock` represents this process's claim on a single, opaque
/// ephemeral lock. FATE uses [`ClusterLock::current`] to tag new
/// reservations and [`ClusterLock::is_held`] to decide whether it is safe
/// to keep mutating rows it believes it owns.
pub trait ClusterLock: Send + Sync {
    /// The lock id this process currently holds, if any.
    fn current(&self) -> Option<LockId>;

    /// Whether the lock identified by `current()` is still held.
    ///
    /// Once this returns `false`, every reservation this process held
    /// under the old id must be treated as lost: outstanding work in
    /// progress is aborted before any further mutation.
    fn is_held(&self) -> bool;
}

/// A single-node `ClusterLock` that is always held once acquired.
///
/// Sufficient for embedding FATE in a single process with no real cluster
/// coordination, and as the default in tests that don't exercise lock
/// loss.
#[derive(Debug, Clone)]
pub struct StaticLock {
    id: LockId,
}

impl StaticLock {
    /// Acquire a fresh, permanently-held lock identity.
    pub fn acquire() -> Self {
        let id = LockId::new();
        tracing::info!(lock_id = %id, "acquired cluster lock");
        StaticLock { id }
    }
}

impl ClusterLock for StaticLock {
    fn current(&self) -> Option<LockId> {
        Some(self.id)
    }

    fn is_held(&self) -> bool {
        true
    }
}

/// A `ClusterLock` whose holder can be toggled, for fault-injection tests
/// that simulate losing (and regaining, under a fresh id) the cluster
/// lock.
#[derive(Debug, Clone)]
pub struct FaultInjectedLock {
    inner: Arc<FaultInjectedLockInner>,
}

#[derive(Debug)]
struct FaultInjectedLockInner {
    id: parking_lot::Mutex<LockId>,
    held: AtomicBool,
}

impl FaultInjectedLock {
    /// Acquire a fresh lock identity that can later be dropped with
    /// [`FaultInjectedLock::lose`].
    pub fn acquire() -> Self {
        FaultInjectedLock {
            inner: Arc::new(FaultInjectedLockInner {
                id: parking_lot::Mutex::new(LockId::new()),
                held: AtomicBool::new(true),
            }),
        }
    }

    /// Simulate losing the cluster lock session.
    pub fn lose(&self) {
        tracing::warn!("simulated cluster lock loss");
        self.inner.held.store(false, Ordering::SeqCst);
    }

    /// Simulate reconnecting under a brand new lock id.
    pub fn reacquire(&self) -> LockId {
        let new_id = LockId::new();
        *self.inner.id.lock() = new_id;
        self.inner.held.store(true, Ordering::SeqCst);
        tracing::info!(lock_id = %new_id, "reacquired cluster lock after simulated loss");
        new_id
    }
}

impl ClusterLock for FaultInjectedLock {
    fn current(&self) -> Option<LockId> {
        if self.inner.held.load(Ordering::SeqCst) {
            Some(*self.inner.id.lock())
        } else {
            None
        }
    }

    fn is_held(&self) -> bool {
        self.inner.held.load(Ordering::SeqCst)
    }
}

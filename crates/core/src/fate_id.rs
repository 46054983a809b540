//! Unique identifiers for FATE transactions.

use std::fmt;
use std::num::ParseIntError;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a FATE transaction.
///
/// FateIds are dense: a process-wide counter hands out consecutive values,
/// so the id space has no artificial gaps beyond ones left by collisions
/// that [`fate_store::TransactionStore::create`](../../fate_store/trait.TransactionStore.html#method.create)
/// retried past. They print as 16 lowercase hex digits, the conventional
/// FATE id rendering.
///
/// # Examples
///
/// ```
/// use fate_core::FateId;
///
/// let gen = FateId::generator();
/// let a = gen.next();
/// let b = gen.next();
/// assert_ne!(a, b);
/// assert_eq!(format!("{}", a).len(), 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FateId(u64);

impl FateId {
    /// Wrap a raw numeric id.
    ///
    /// Exposed for store implementations that need to reconstruct a
    /// [`FateId`] from persisted bytes; application code should prefer
    /// [`FateId::generator`].
    pub fn from_raw(raw: u64) -> Self {
        FateId(raw)
    }

    /// The raw numeric id.
    pub fn as_raw(&self) -> u64 {
        self.0
    }

    /// Parse a FateId from its canonical 16-hex-digit rendering.
    pub fn from_hex(s: &str) -> Result<Self, ParseIntError> {
        u64::from_str_radix(s, 16).map(FateId)
    }

    /// Create a generator producing dense, unique ids starting at `start`.
    pub fn generator_from(start: u64) -> FateIdGenerator {
        FateIdGenerator {
            next: AtomicU64::new(start),
        }
    }

    /// Create a generator starting at zero.
    pub fn generator() -> FateIdGenerator {
        Self::generator_from(0)
    }
}

impl fmt::Display for FateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Allocates dense, unique [`FateId`]s.
///
/// One generator is shared by every caller of
/// [`TransactionStore::create`](../../fate_store/trait.TransactionStore.html#method.create);
/// a store that discovers its allocated id already has a row (extremely
/// unlikely, but possible if a generator is recreated at a stale `start`)
/// retries with the next value.
#[derive(Debug)]
pub struct FateIdGenerator {
    next: AtomicU64,
}

impl FateIdGenerator {
    /// Allocate the next unique id.
    pub fn next(&self) -> FateId {
        FateId(self.next.fetch_add(1, Ordering::Relaxed))
    }

    /// Advance the generator so it never hands out an id `<= seen`.
    ///
    /// Used by stores recovering from a journal: `seen` is the highest id
    /// observed in the log, and the generator must not reissue it.
    pub fn observe(&self, seen: FateId) {
        self.next.fetch_max(seen.0 + 1, Ordering::Relaxed);
    }
}

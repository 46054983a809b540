//! Well-known keys into a transaction's free-form `Tx Info` map.

use serde::{Deserialize, Serialize};

/// A key into a transaction's info map.
///
/// The map itself is opaque free-form storage (`FateId -> key -> `
/// [`Value`](crate::Value)); these are the keys FATE itself reads or
/// writes. Embedders may store additional keys of their own —
/// `TxInfoKey::Custom` carries them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxInfoKey {
    /// The operation tag set at seed time (e.g. `"compact-table"`).
    ///
    /// Duplicated from the dedicated operation-tag field on the row for
    /// convenience — both are written together by `seedTransaction` and
    /// neither changes afterward.
    OperationTag,
    /// Free-text reason supplied to `seedTransaction`, surfaced for
    /// debugging and admin listings.
    Reason,
    /// Whether this transaction should be auto-deleted by the executor
    /// once it reaches a terminal status (`"true"` / `"false"` as a
    /// `Value::String`; written by `seedTransaction`).
    AutoClean,
    /// A fingerprint of the arguments a `seedTransaction` call was made
    /// with, used to detect an idempotent repeat call.
    SeedFingerprint,
    /// Opaque distributed-tracing context (e.g. a W3C `traceparent`)
    /// propagated from the caller that seeded this transaction, so steps
    /// run later by a different worker can still join the original trace.
    TracingContext,
    /// Identifies the caller or subsystem that seeded this transaction
    /// (a service name, a user id, ...), surfaced for admin listings and
    /// debugging alongside `Reason`.
    Originator,
    /// An embedder-defined key.
    Custom(String),
}

impl TxInfoKey {
    /// The string this key is stored under.
    pub fn as_str(&self) -> &str {
        match self {
            TxInfoKey::OperationTag => "op-tag",
            TxInfoKey::Reason => "reason",
            TxInfoKey::AutoClean => "auto-clean",
            TxInfoKey::SeedFingerprint => "seed-fingerprint",
            TxInfoKey::TracingContext => "tracing-context",
            TxInfoKey::Originator => "originator",
            TxInfoKey::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for TxInfoKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Administrative listing: `list(filter)`.

use fate_core::{FateException, FateId, Status, Value};
use std::collections::{BTreeMap, HashSet};

/// Constrains [`TransactionStore::list`](crate::InMemoryTransactionStore::list)
/// by status and/or operation tag. An unset field matches everything.
#[derive(Debug, Clone, Default)]
pub struct TxFilter {
    /// Only include rows whose status is in this set.
    pub statuses: Option<HashSet<Status>>,
    /// Only include rows with this exact operation tag.
    pub op_tag: Option<String>,
}

impl TxFilter {
    /// No constraints — matches every row.
    pub fn all() -> Self {
        Self::default()
    }

    /// Constrain to a single status.
    pub fn with_status(status: Status) -> Self {
        let mut statuses = HashSet::new();
        statuses.insert(status);
        TxFilter {
            statuses: Some(statuses),
            op_tag: None,
        }
    }

    /// Constrain to a set of statuses.
    pub fn with_statuses(statuses: impl IntoIterator<Item = Status>) -> Self {
        TxFilter {
            statuses: Some(statuses.into_iter().collect()),
            op_tag: None,
        }
    }

    /// Constrain to an operation tag.
    pub fn with_op_tag(mut self, op_tag: impl Into<String>) -> Self {
        self.op_tag = Some(op_tag.into());
        self
    }

    pub(crate) fn matches(&self, status: Status, op_tag: Option<&str>) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&status) {
                return false;
            }
        }
        if let Some(want) = &self.op_tag {
            if op_tag != Some(want.as_str()) {
                return false;
            }
        }
        true
    }
}

/// A read-only snapshot of one row, as returned by `list()` and status
/// lookups. Snapshot-consistent per row — not a consistent view across
/// the whole listing.
#[derive(Debug, Clone)]
pub struct TxView {
    /// The transaction's id.
    pub id: FateId,
    /// Its status at the moment this view was taken.
    pub status: Status,
    /// Its operation tag, if seeded.
    pub op_tag: Option<String>,
    /// Number of steps currently on its stack.
    pub stack_depth: usize,
    /// Its failure record, if any.
    pub exception: Option<FateException>,
    /// A snapshot of its transaction info map.
    pub info: BTreeMap<String, Value>,
}

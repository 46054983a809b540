//! A cheap, in-process metrics snapshot, standing in for the metrics
//! backend that is named as an external collaborator out of scope for
//! this crate.

use fate_core::Status;
use fate_scheduler::Executor;
use fate_store::{InMemoryTransactionStore, TxFilter};

/// A point-in-time count of transactions by status, plus the scheduler's
/// deferred-map bookkeeping.
#[derive(Debug, Clone, Copy, Default)]
pub struct FateMetrics {
    /// Rows in `NEW`.
    pub new: usize,
    /// Rows in `SUBMITTED`.
    pub submitted: usize,
    /// Rows in `IN_PROGRESS`.
    pub in_progress: usize,
    /// Rows in `SUCCESSFUL` (not yet reclaimed via `delete`).
    pub successful: usize,
    /// Rows in `FAILED_IN_PROGRESS`.
    pub failed_in_progress: usize,
    /// Rows in `FAILED` (not yet reclaimed via `delete`).
    pub failed: usize,
    /// Size of the process-wide deferred map.
    pub deferred_count: usize,
    /// Whether the deferred-map overflow flag is currently tripped.
    pub overflow_active: bool,
}

pub(crate) fn snapshot<E>(store: &InMemoryTransactionStore<E>, executor: &Executor<E>) -> FateMetrics {
    let mut metrics = FateMetrics {
        deferred_count: executor.deferred_count(),
        overflow_active: executor.overflow_active(),
        ..Default::default()
    };
    for view in store.list(&TxFilter::all()) {
        match view.status {
            Status::New => metrics.new += 1,
            Status::Submitted => metrics.submitted += 1,
            Status::InProgress => metrics.in_progress += 1,
            Status::Successful => metrics.successful += 1,
            Status::FailedInProgress => metrics.failed_in_progress += 1,
            Status::Failed => metrics.failed += 1,
            Status::Unknown => {}
        }
    }
    metrics
}

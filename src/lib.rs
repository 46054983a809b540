//! # FATE
//!
//! Fault-tolerant Asynchronous Transaction Executor — a durable,
//! crash-recoverable engine for multi-step administrative operations
//! (table compaction, bulk imports, cluster rebalancing — any operation
//! too long-running to finish inside a single request and too important
//! to leave half-done after a crash).
//!
//! A transaction is a stack of [`Step`]s. The executor drives the stack
//! top-down: call the top step, push whatever it returns, pop it when it
//! reports done. If a step fails, the same stack unwinds bottom-up,
//! calling `undo` on everything that was pushed. A transaction's identity
//! and reservation survive the process that was running it — another
//! process can reclaim the same durable row once the cluster lock says
//! the old owner is gone. Surviving the row's full *progress* — the step
//! stack itself, across a crash — is conditional: the default in-memory
//! store keeps no state on disk at all, and even the optional `journal`
//! feature only recovers a stack if the embedder supplies a
//! [`fate_core::StepCodec`] for their own step types (see
//! `fate_store::journal`). Without one, a journaled store still recovers
//! status and lifecycle history, but a recovered row's stack comes back
//! empty.
//!
//! ## Quick start
//!
//! ```ignore
//! use fate::prelude::*;
//! use std::sync::Arc;
//!
//! struct MyEnv {
//!     // embedder-supplied handles: a database pool, an HTTP client, ...
//! }
//!
//! let fate: Fate<MyEnv> = Fate::builder(MyEnv {}).build();
//!
//! let id = fate.start_transaction();
//! fate.seed_transaction("compact-table", id, Arc::new(my_first_step), false, "nightly job")?;
//! let status = fate.wait_for_completion(id)?;
//! # Ok::<(), fate::Error>(())
//! ```
//!
//! ## Crate layout
//!
//! This crate is a thin re-export over the workspace's member crates:
//!
//! - [`fate-core`](../fate_core/index.html) — vocabulary: [`FateId`],
//!   [`Status`], the [`Step`] contract, [`error::Error`].
//! - [`fate-store`](../fate_store/index.html) — the durable store and
//!   reservation protocol.
//! - [`fate-lock`](../fate_lock/index.html) — the cluster lock contract.
//! - [`fate-scheduler`](../fate_scheduler/index.html) — the worker pool,
//!   deferral/overflow bookkeeping, and compensation engine.
//! - [`fate-api`](../fate_api/index.html) — the [`Fate`] facade this
//!   crate re-exports.

#![warn(missing_docs)]

pub mod prelude;

pub use fate_api::{
    Error, FateConfig, FateConfigBuilder, FateException, FateMetrics, Result, StateError,
    StepError, StoreError,
};
pub use fate_api::{Fate, FateBuilder};
pub use fate_core::{FateId, Status, Step, TxInfoKey, Value};
pub use fate_store::{TxFilter, TxView};

//! Core types for FATE (Fault-tolerant Asynchronous Transaction Executor).
//!
//! This crate defines the vocabulary shared by every other `fate-*` crate:
//! [`FateId`], [`Status`], the [`Step`] contract that embedders implement,
//! the optional [`StepCodec`] that lets a journaled store recover a step
//! stack across a crash, the well-known [`TxInfoKey`]s, and the composed
//! [`error::Error`] type.
//!
//! It has no opinion on how transactions are stored or scheduled — see
//! `fate-store` and `fate-scheduler` for that.

#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod fate_id;
pub mod status;
pub mod step;
pub mod tx_info;
pub mod value;

pub use clock::{Clock, FakeClock, MonotonicClock};
pub use error::{Error, FateException, Result, StateError, StepCodecError, StepError, StoreError};
pub use fate_id::FateId;
pub use status::Status;
#[cfg(any(test, feature = "test-support"))]
pub use step::fixtures;
pub use step::{Step, StepCodec};
pub use tx_info::TxInfoKey;
pub use value::Value;

//! Convenient imports for FATE.
//!
//! ```ignore
//! use fate::prelude::*;
//! ```

// Main entry point
pub use crate::{Fate, FateBuilder};

// Error handling
pub use crate::{Error, FateException, Result, StateError, StepError, StoreError};

// Core types
pub use crate::{FateId, Status, Step, TxInfoKey, Value};

// Configuration and administrative listing
pub use crate::{FateConfig, FateConfigBuilder, FateMetrics, TxFilter, TxView};

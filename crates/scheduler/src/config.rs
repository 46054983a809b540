//! Executor tuning knobs.

use std::time::Duration;

/// Runtime configuration for a [`crate::Executor`].
///
/// Constructed directly or via [`SchedulerConfigBuilder`]; `fate-api`'s
/// `FateConfigBuilder` is a thin fluent wrapper around this one.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Delay before a worker's first poll after startup.
    pub poll_initial_delay: Duration,
    /// Lower bound of the idle-backoff sleep.
    pub poll_min_interval: Duration,
    /// Upper bound of the idle-backoff sleep.
    pub poll_max_interval: Duration,
    /// Cap on the in-memory deferred map before overflow trips.
    pub max_deferred: usize,
    /// Number of worker threads in the pool. Hot-reloadable via
    /// [`crate::Executor::resize`].
    pub worker_pool_size: usize,
    /// How long [`crate::Executor::shutdown`] waits for in-flight steps
    /// before giving up on a graceful join.
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            poll_initial_delay: Duration::from_millis(200),
            poll_min_interval: Duration::from_millis(50),
            poll_max_interval: Duration::from_secs(5),
            max_deferred: 1_000,
            worker_pool_size: 4,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

impl SchedulerConfig {
    /// Start from the defaults.
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::new()
    }
}

/// Fluent builder for [`SchedulerConfig`].
#[derive(Debug, Clone)]
pub struct SchedulerConfigBuilder {
    config: SchedulerConfig,
}

impl SchedulerConfigBuilder {
    /// Start from the defaults.
    pub fn new() -> Self {
        SchedulerConfigBuilder {
            config: SchedulerConfig::default(),
        }
    }

    /// Set [`SchedulerConfig::poll_initial_delay`].
    pub fn poll_initial_delay(mut self, d: Duration) -> Self {
        self.config.poll_initial_delay = d;
        self
    }

    /// Set [`SchedulerConfig::poll_min_interval`].
    pub fn poll_min_interval(mut self, d: Duration) -> Self {
        self.config.poll_min_interval = d;
        self
    }

    /// Set [`SchedulerConfig::poll_max_interval`].
    pub fn poll_max_interval(mut self, d: Duration) -> Self {
        self.config.poll_max_interval = d;
        self
    }

    /// Set [`SchedulerConfig::max_deferred`].
    pub fn max_deferred(mut self, n: usize) -> Self {
        self.config.max_deferred = n;
        self
    }

    /// Set [`SchedulerConfig::worker_pool_size`].
    pub fn worker_pool_size(mut self, n: usize) -> Self {
        self.config.worker_pool_size = n;
        self
    }

    /// Set [`SchedulerConfig::shutdown_grace`].
    pub fn shutdown_grace(mut self, d: Duration) -> Self {
        self.config.shutdown_grace = d;
        self
    }

    /// Finish building.
    pub fn build(self) -> SchedulerConfig {
        self.config
    }
}

impl Default for SchedulerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

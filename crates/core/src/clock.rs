//! Monotonic time source used for scheduling.
//!
//! FATE never compares wall-clock timestamps across processes — a
//! transaction's deferral deadline is only ever evaluated by the same
//! process that set it within a single store instance — so a simple
//! monotonic millisecond counter is enough.

use std::sync::Arc;
use std::time::Instant;

/// A monotonic elapsed-time source.
///
/// `E` is left out of this trait (unlike [`Step`](crate::Step)) because
/// time is not embedder-specific; tests substitute [`FakeClock`] for
/// deterministic control over deferral deadlines.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since this clock was created.
    fn now_millis(&self) -> u64;
}

/// A [`Clock`] backed by [`std::time::Instant`].
#[derive(Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Start a new clock, ticking from zero.
    pub fn new() -> Arc<Self> {
        Arc::new(MonotonicClock {
            start: Instant::now(),
        })
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        MonotonicClock {
            start: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

/// A [`Clock`] whose reading is set explicitly, for deterministic tests of
/// deferral and overflow behavior.
#[derive(Debug)]
pub struct FakeClock {
    millis: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    /// Start a fake clock at time zero.
    pub fn new() -> Arc<Self> {
        Arc::new(FakeClock {
            millis: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.millis
            .fetch_add(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_advances_deterministically() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_millis(), 0);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 250);
    }

    #[test]
    fn monotonic_clock_never_goes_backward() {
        let clock = MonotonicClock::new();
        let a = clock.now_millis();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = clock.now_millis();
        assert!(b >= a);
    }
}

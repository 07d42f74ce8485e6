//! Wall-clock time sources
//!
//! Peers must be roughly synchronized; nothing here authenticates time.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

/// Supplies the current time as a duration since the Unix epoch
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Operating system wall clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        // A clock set before 1970 reads as the epoch itself
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
    }
}

/// Manually driven clock for simulation and tests
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    now: Mutex<Duration>,
}

impl ManualTimeSource {
    pub fn new(start: Duration) -> Self {
        ManualTimeSource {
            now: Mutex::new(start),
        }
    }

    /// Jump to an absolute time (may move backwards)
    pub fn set(&self, now: Duration) {
        *self.now.lock() = now;
    }

    /// Move forward by `dt`
    pub fn advance(&self, dt: Duration) {
        let mut now = self.now.lock();
        *now = now.saturating_add(dt);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

//! Clock abstraction for the stage and its subsystems.
//!
//! Execution uses the clock to age idle activations and messaging uses it
//! to compute request deadlines. Production stages read the wall clock;
//! tests inject a [`ManualClock`] and advance it explicitly so cleanup
//! passes are deterministic.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::sync::lock;

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time according to this clock.
    fn now(&self) -> SystemTime;
}

/// Wall clock backed by [`SystemTime::now`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for deterministic tests.
///
/// Clones share the same underlying instant, so a test can keep one handle
/// and hand another to the stage.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: SystemTime) {
        *lock(&self.now) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *lock(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH);

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH + Duration::from_secs(5));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let clock = ManualClock::default();
        let shared: Arc<dyn Clock> = Arc::new(clock.clone());

        clock.advance(Duration::from_millis(250));
        assert_eq!(
            shared.now(),
            SystemTime::UNIX_EPOCH + Duration::from_millis(250)
        );
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let before = SystemTime::now();
        assert!(SystemClock.now() >= before);
    }
}

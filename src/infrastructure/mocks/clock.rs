//! Mock clock for testing.

use crate::application::ports::Clock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock clock for testing.
///
/// Allows tests to control time progression explicitly, enabling deterministic
/// testing of refills and key expiry.
///
/// # Examples
///
/// Requires the `test-helpers` feature outside of this crate's own tests.
///
/// ```ignore
/// use tenant_kv::infrastructure::mocks::MockClock;
/// use tenant_kv::application::ports::Clock;
/// use std::time::Duration;
///
/// let clock = MockClock::new(1_000);
///
/// // Time starts at the specified unix millisecond
/// assert_eq!(clock.now_ms(), 1_000);
///
/// // Advance time explicitly
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now_ms(), 11_000);
///
/// // Or set to a specific instant
/// clock.set(100_000);
/// assert_eq!(clock.now_ms(), 100_000);
/// ```
///
/// # Thread Safety
///
/// All clones share the same underlying time value, so advancing time in
/// one clone affects all clones.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_ms: Arc<Mutex<i64>>,
}

impl MockClock {
    /// Create a mock clock starting at `start_ms` unix milliseconds.
    pub fn new(start_ms: i64) -> Self {
        Self {
            current_ms: Arc::new(Mutex::new(start_ms)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let step = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        let mut time = self
            .current_ms
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time = time.saturating_add(step);
    }

    /// Set the clock to a specific unix millisecond.
    pub fn set(&self, now_ms: i64) {
        let mut time = self
            .current_ms
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock");
        *time = now_ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        *self
            .current_ms
            .lock()
            .expect("MockClock mutex poisoned - a test thread panicked while holding the lock")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let clock = MockClock::new(5_000);

        assert_eq!(clock.now_ms(), 5_000);

        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now_ms(), 5_250);

        clock.set(1);
        assert_eq!(clock.now_ms(), 1);
    }

    #[test]
    fn test_clones_share_time() {
        let clock = MockClock::new(0);
        let clone = clock.clone();

        let handle = std::thread::spawn(move || clone.advance(Duration::from_secs(5)));
        handle.join().unwrap();

        assert_eq!(clock.now_ms(), 5_000);
    }
}

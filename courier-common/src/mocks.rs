//! Controllable clocks for tests.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::clock::Clock;

/// Manually driven clock.
///
/// Clones share the same time, so advancing one clone is visible through all
/// of them (and through any component holding it as a `SharedClock`).
///
/// ```ignore
/// use std::time::Duration;
/// use courier_common::{Clock, mocks::MockClock};
///
/// let clock = MockClock::default();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(10));
/// assert_eq!((clock.now() - start).num_seconds(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct MockClock {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl MockClock {
    /// Create a mock clock starting at a specific time.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(Mutex::new(start)),
        }
    }

    /// Advance the clock by a duration.
    pub fn advance(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX);
        let mut current = self.current.lock();
        *current = current
            .checked_add_signed(delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Set the clock to a specific time.
    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.lock() = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

/// Wall clock that follows tokio's clock.
///
/// With `#[tokio::test(start_paused = true)]` tokio's clock only moves when
/// the runtime auto-advances over sleeps, so timestamps taken through this
/// clock line up exactly with the timers the delivery worker waits on.
#[derive(Debug, Clone)]
pub struct TokioClock {
    anchor: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    /// Anchor the clock at the current system time.
    #[must_use]
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// Anchor the clock at `anchor`; elapsed tokio time is added on top.
    #[must_use]
    pub fn starting_at(anchor: DateTime<Utc>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.anchor
            .checked_add_signed(elapsed)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_clock() {
        let start = Utc::now();
        let clock = MockClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));

        let later = start + TimeDelta::hours(5);
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn test_mock_clock_clones_share_time() {
        let clock = MockClock::default();
        let other = clock.clone();
        let before = clock.now();

        other.advance(Duration::from_secs(5));
        assert_eq!(clock.now() - before, TimeDelta::seconds(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let start = Utc::now();
        let clock = TokioClock::starting_at(start);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(clock.now() - start, TimeDelta::seconds(61));
    }
}

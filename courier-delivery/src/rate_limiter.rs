//! Global send-rate limiting over fixed minute, hour and day windows
//!
//! Each window keeps a counter and the instant it opened. Windows roll over
//! lazily: whenever the limiter is consulted, any window whose duration has
//! fully elapsed is reset to zero and re-anchored at the current time. A
//! send is permitted only while every window is below its limit, and only
//! successful sends are counted.
//!
//! # Example
//!
//! ```text
//! Limits: 2/min, 100/h, 1000/day
//! - t=0s   send, send        minute window full
//! - t=30s  saturated         wait 30s for the minute window to roll
//! - t=60s  minute resets     sending resumes
//! ```

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use courier_common::tracing;
use serde::{Deserialize, Serialize};

/// Configured per-window ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    /// Successful sends allowed per minute.
    ///
    /// Default: 10
    #[serde(default = "defaults::max_per_minute")]
    pub max_per_minute: u32,

    /// Successful sends allowed per hour.
    ///
    /// Default: 100
    #[serde(default = "defaults::max_per_hour")]
    pub max_per_hour: u32,

    /// Successful sends allowed per day.
    ///
    /// Default: 1000
    #[serde(default = "defaults::max_per_day")]
    pub max_per_day: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            max_per_minute: defaults::max_per_minute(),
            max_per_hour: defaults::max_per_hour(),
            max_per_day: defaults::max_per_day(),
        }
    }
}

impl RateLimits {
    const fn limit(&self, window: WindowKind) -> u32 {
        match window {
            WindowKind::Minute => self.max_per_minute,
            WindowKind::Hour => self.max_per_hour,
            WindowKind::Day => self.max_per_day,
        }
    }
}

mod defaults {
    pub const fn max_per_minute() -> u32 {
        10
    }

    pub const fn max_per_hour() -> u32 {
        100
    }

    pub const fn max_per_day() -> u32 {
        1000
    }
}

/// A partial update to [`RateLimits`]; unset fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitUpdate {
    #[serde(default)]
    pub max_per_minute: Option<u32>,
    #[serde(default)]
    pub max_per_hour: Option<u32>,
    #[serde(default)]
    pub max_per_day: Option<u32>,
}

/// The three counting windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowKind {
    Minute,
    Hour,
    Day,
}

impl WindowKind {
    pub const ALL: [Self; 3] = [Self::Minute, Self::Hour, Self::Day];

    /// Length of the window.
    #[must_use]
    pub const fn length(self) -> TimeDelta {
        match self {
            Self::Minute => TimeDelta::minutes(1),
            Self::Hour => TimeDelta::hours(1),
            Self::Day => TimeDelta::days(1),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
        }
    }
}

impl std::fmt::Display for WindowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter state for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowCounter {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

impl WindowCounter {
    const fn new(now: DateTime<Utc>) -> Self {
        Self {
            count: 0,
            window_start: now,
        }
    }

    fn roll(&mut self, kind: WindowKind, now: DateTime<Utc>) {
        if now - self.window_start >= kind.length() {
            self.count = 0;
            self.window_start = now;
        }
    }

    fn resets_in(&self, kind: WindowKind, now: DateTime<Utc>) -> Duration {
        (self.window_start + kind.length() - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Point-in-time view of limits and counters, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitSnapshot {
    pub limits: RateLimits,
    pub minute: WindowCounter,
    pub hour: WindowCounter,
    pub day: WindowCounter,
}

/// Fixed-window limiter shared by every queued message.
///
/// Not synchronised on its own: the queue keeps it under the same lock as
/// the pending list so that window checks and dispatch decisions agree.
#[derive(Debug)]
pub(crate) struct RateLimiter {
    limits: RateLimits,
    minute: WindowCounter,
    hour: WindowCounter,
    day: WindowCounter,
}

impl RateLimiter {
    pub(crate) const fn new(limits: RateLimits, now: DateTime<Utc>) -> Self {
        Self {
            limits,
            minute: WindowCounter::new(now),
            hour: WindowCounter::new(now),
            day: WindowCounter::new(now),
        }
    }

    const fn counter(&self, window: WindowKind) -> &WindowCounter {
        match window {
            WindowKind::Minute => &self.minute,
            WindowKind::Hour => &self.hour,
            WindowKind::Day => &self.day,
        }
    }

    const fn counter_mut(&mut self, window: WindowKind) -> &mut WindowCounter {
        match window {
            WindowKind::Minute => &mut self.minute,
            WindowKind::Hour => &mut self.hour,
            WindowKind::Day => &mut self.day,
        }
    }

    /// Reset every window whose length has fully elapsed.
    pub(crate) fn roll(&mut self, now: DateTime<Utc>) {
        for window in WindowKind::ALL {
            self.counter_mut(window).roll(window, now);
        }
    }

    /// Check whether a send is currently permitted.
    ///
    /// Returns `Ok(())` if every window has capacity, or `Err` with the
    /// saturated window that resets last and the time until it does.
    pub(crate) fn check(&mut self, now: DateTime<Utc>) -> Result<(), (WindowKind, Duration)> {
        self.roll(now);

        let blocked = WindowKind::ALL
            .into_iter()
            .filter(|&window| self.counter(window).count >= self.limits.limit(window))
            .map(|window| (window, self.counter(window).resets_in(window, now)))
            .max_by_key(|&(_, wait)| wait);

        blocked.map_or(Ok(()), |(window, wait)| {
            tracing::debug!(
                window = %window,
                wait_seconds = wait.as_secs_f64(),
                "Rate limit reached, must wait"
            );
            Err((window, wait))
        })
    }

    /// Count one successful send against every window.
    pub(crate) fn record_sent(&mut self, now: DateTime<Utc>) {
        self.roll(now);
        for window in WindowKind::ALL {
            let counter = self.counter_mut(window);
            counter.count = counter.count.saturating_add(1);
        }
    }

    /// Apply a partial update. Counters are untouched; a lowered limit takes
    /// effect on the next check.
    pub(crate) fn update(&mut self, update: RateLimitUpdate) {
        if let Some(limit) = update.max_per_minute {
            self.limits.max_per_minute = limit;
        }
        if let Some(limit) = update.max_per_hour {
            self.limits.max_per_hour = limit;
        }
        if let Some(limit) = update.max_per_day {
            self.limits.max_per_day = limit;
        }
    }

    pub(crate) const fn limits(&self) -> RateLimits {
        self.limits
    }

    pub(crate) fn snapshot(&mut self, now: DateTime<Utc>) -> RateLimitSnapshot {
        self.roll(now);
        RateLimitSnapshot {
            limits: self.limits,
            minute: self.minute,
            hour: self.hour,
            day: self.day,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().unwrap_or_default()
    }

    #[test]
    fn test_allows_until_minute_limit() {
        let now = start();
        let mut limiter = RateLimiter::new(
            RateLimits {
                max_per_minute: 2,
                ..RateLimits::default()
            },
            now,
        );

        assert!(limiter.check(now).is_ok());
        limiter.record_sent(now);
        assert!(limiter.check(now).is_ok());
        limiter.record_sent(now);

        let (window, wait) = limiter.check(now + TimeDelta::seconds(20)).unwrap_err();
        assert_eq!(window, WindowKind::Minute);
        assert_eq!(wait, Duration::from_secs(40));
    }

    #[test]
    fn test_window_rolls_over() {
        let now = start();
        let mut limiter = RateLimiter::new(
            RateLimits {
                max_per_minute: 1,
                ..RateLimits::default()
            },
            now,
        );

        limiter.record_sent(now);
        assert!(limiter.check(now + TimeDelta::seconds(59)).is_err());
        assert!(limiter.check(now + TimeDelta::seconds(60)).is_ok());

        let snapshot = limiter.snapshot(now + TimeDelta::seconds(60));
        assert_eq!(snapshot.minute.count, 0);
        assert_eq!(snapshot.minute.window_start, now + TimeDelta::seconds(60));
        assert_eq!(snapshot.hour.count, 1);
        assert_eq!(snapshot.day.count, 1);
    }

    #[test]
    fn test_longest_saturated_window_wins() {
        let now = start();
        let mut limiter = RateLimiter::new(
            RateLimits {
                max_per_minute: 1,
                max_per_hour: 1,
                max_per_day: 1000,
            },
            now,
        );

        limiter.record_sent(now);
        let (window, wait) = limiter.check(now).unwrap_err();
        assert_eq!(window, WindowKind::Hour);
        assert_eq!(wait, Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_limit_blocks() {
        let now = start();
        let mut limiter = RateLimiter::new(
            RateLimits {
                max_per_day: 0,
                ..RateLimits::default()
            },
            now,
        );

        assert_eq!(limiter.check(now).unwrap_err().0, WindowKind::Day);
    }

    #[test]
    fn test_partial_update() {
        let now = start();
        let mut limiter = RateLimiter::new(RateLimits::default(), now);

        limiter.update(RateLimitUpdate {
            max_per_hour: Some(5),
            ..RateLimitUpdate::default()
        });

        assert_eq!(
            limiter.limits(),
            RateLimits {
                max_per_minute: 10,
                max_per_hour: 5,
                max_per_day: 1000,
            }
        );
    }

    #[test]
    fn test_lowered_limit_applies_to_existing_count() {
        let now = start();
        let mut limiter = RateLimiter::new(RateLimits::default(), now);
        for _ in 0..3 {
            limiter.record_sent(now);
        }

        limiter.update(RateLimitUpdate {
            max_per_minute: Some(3),
            ..RateLimitUpdate::default()
        });

        assert!(limiter.check(now).is_err());
    }
}

//! Per-recipient minimum send interval
//!
//! The gate remembers when each recipient key last passed and refuses
//! another pass until the cooldown has elapsed. When an email type is
//! supplied it also defers to the monitor's hourly quotas. Keys are hashed
//! before they are stored, so the map never holds a raw address.

use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use courier_common::{EmailType, RecipientHash, RecipientHasher, SharedClock, tracing};
use courier_monitor::EventLog;
use dashmap::{DashMap, mapref::entry::Entry};
use serde::Deserialize;

use crate::DeliveryError;

/// Entries older than this are dropped by [`CooldownGate::cleanup`].
const ENTRY_TTL: TimeDelta = TimeDelta::hours(1);

/// Longest cooldown accepted. A sweep must never forget a key that is still
/// cooling down, so this matches the entry TTL.
pub const MAX_COOLDOWN_SECS: u64 = 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct CooldownConfig {
    /// Minimum interval between two passes for the same key. At most
    /// [`MAX_COOLDOWN_SECS`].
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::cooldown_secs")]
    pub cooldown_secs: u64,

    /// How often stale entries are swept.
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cooldown_secs: defaults::cooldown_secs(),
            sweep_interval_secs: defaults::sweep_interval_secs(),
        }
    }
}

impl CooldownConfig {
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] when `cooldown_secs` exceeds
    /// [`MAX_COOLDOWN_SECS`].
    pub fn validate(&self) -> Result<(), DeliveryError> {
        if self.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(DeliveryError::Configuration(format!(
                "cooldown_secs must be at most {MAX_COOLDOWN_SECS}, got {}",
                self.cooldown_secs
            )));
        }

        Ok(())
    }
}

mod defaults {
    pub const fn cooldown_secs() -> u64 {
        60
    }

    pub const fn sweep_interval_secs() -> u64 {
        300
    }
}

/// Outcome of a gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownDecision {
    Allowed,
    CoolingDown { remaining: Duration },
    UserQuotaExceeded,
    TypeQuotaExceeded,
}

impl CooldownDecision {
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

#[derive(Debug)]
pub struct CooldownGate {
    cooldown: TimeDelta,
    last_sent: DashMap<RecipientHash, DateTime<Utc>>,
    monitor: Arc<EventLog>,
    hasher: RecipientHasher,
    clock: SharedClock,
}

impl CooldownGate {
    #[must_use]
    pub fn new(
        config: &CooldownConfig,
        monitor: Arc<EventLog>,
        hasher: RecipientHasher,
        clock: SharedClock,
    ) -> Self {
        Self {
            cooldown: i64::try_from(config.cooldown_secs)
                .ok()
                .and_then(TimeDelta::try_seconds)
                .unwrap_or(TimeDelta::MAX),
            last_sent: DashMap::new(),
            monitor,
            hasher,
            clock,
        }
    }

    /// Check and, when permitted, record a pass for `key`.
    #[must_use]
    pub fn check(&self, key: &str, email_type: Option<EmailType>) -> bool {
        self.check_detailed(key, email_type).is_allowed()
    }

    /// As [`check`](Self::check), reporting why a pass was refused.
    ///
    /// A refused check leaves the stored timestamp untouched.
    pub fn check_detailed(&self, key: &str, email_type: Option<EmailType>) -> CooldownDecision {
        let hash = self.hasher.hash(key);
        let now = self.clock.now();

        if let Some(remaining) = self
            .last_sent
            .get(&hash)
            .and_then(|last| self.remaining_at(*last, now))
        {
            return CooldownDecision::CoolingDown { remaining };
        }

        if let Some(email_type) = email_type {
            if !self.monitor.can_send_to_user(&hash, email_type) {
                tracing::debug!(recipient_hash = %hash, %email_type, "Per-user hourly quota reached");
                return CooldownDecision::UserQuotaExceeded;
            }

            if !self.monitor.can_send_type(email_type) {
                tracing::debug!(%email_type, "Per-type hourly quota reached");
                return CooldownDecision::TypeQuotaExceeded;
            }
        }

        match self.last_sent.entry(hash) {
            Entry::Occupied(mut entry) => {
                if let Some(remaining) = self.remaining_at(*entry.get(), now) {
                    return CooldownDecision::CoolingDown { remaining };
                }
                entry.insert(now);
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
            }
        }

        CooldownDecision::Allowed
    }

    /// Whole seconds until `key` may pass again, rounded up. Zero if it may
    /// pass now.
    #[must_use]
    pub fn remaining_seconds(&self, key: &str) -> u64 {
        let hash = self.hasher.hash(key);
        let now = self.clock.now();

        self.last_sent
            .get(&hash)
            .and_then(|last| self.remaining_at(*last, now))
            .map_or(0, |remaining| {
                remaining
                    .as_secs()
                    .saturating_add(u64::from(remaining.subsec_nanos() > 0))
            })
    }

    /// Drop entries older than an hour. Returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let Some(cutoff) = self.clock.now().checked_sub_signed(ENTRY_TTL) else {
            return 0;
        };
        let before = self.last_sent.len();
        self.last_sent.retain(|_, last| *last > cutoff);
        let removed = before.saturating_sub(self.last_sent.len());

        if removed > 0 {
            tracing::debug!(removed, "Swept stale cooldown entries");
        }

        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_sent.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_sent.is_empty()
    }

    fn remaining_at(&self, last: DateTime<Utc>, now: DateTime<Utc>) -> Option<Duration> {
        let Some(until) = last.checked_add_signed(self.cooldown) else {
            return Some(Duration::from_secs(u64::MAX));
        };

        (until - now)
            .to_std()
            .ok()
            .filter(|remaining| !remaining.is_zero())
    }
}

//! Wall-clock abstraction.
//!
//! Every component that reads the time takes a [`SharedClock`] instead of
//! calling `Utc::now()` directly, so that tests can drive time explicitly.
//! See [`crate::mocks`] (behind the `test-helpers` feature) for controllable
//! clocks.

use std::{fmt::Debug, sync::Arc};

use chrono::{DateTime, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync + Debug {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock handle shared between the queue, the monitor and the cooldown gate.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Convenience constructor for the common `Arc<dyn Clock>` form.
    #[must_use]
    pub fn shared() -> SharedClock {
        Arc::new(Self)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//! Shared primitives for courier: time, recipient hashing, email kinds and
//! logging setup.

pub mod clock;
pub mod email_type;
pub mod hash;
pub mod logging;
#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;

pub use clock::{Clock, SharedClock, SystemClock};
pub use email_type::{EmailType, ParseEmailTypeError};
pub use hash::{HashingConfig, RecipientHash, RecipientHasher};
pub use tracing;

/// Process-wide lifecycle signal, broadcast to every long-running task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}

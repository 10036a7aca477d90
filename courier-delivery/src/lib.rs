//! Outbound delivery for transactional mail
//!
//! This crate provides:
//! - [`DeliveryQueue`]: a three-tier priority queue drained by a single
//!   worker, subject to minute/hour/day send limits, with bounded
//!   exponential-backoff retry and a dead-letter ring
//! - [`CooldownGate`]: per-recipient minimum send interval, cross-checked
//!   against the monitor's hourly quotas
//! - [`Transport`]: the seam to the email provider

mod config;
mod cooldown;
mod error;
mod item;
pub mod policy;
pub mod queue;
mod rate_limiter;
mod transport;

pub use config::DeliveryConfig;
pub use cooldown::{CooldownConfig, CooldownDecision, CooldownGate, MAX_COOLDOWN_SECS};
pub use error::{DeliveryError, TransportError};
pub use item::{DeadLetter, EnqueueOptions, Priority, QueueItem, QueueItemId};
pub use policy::RetryPolicy;
pub use queue::{DeliveryQueue, PendingItem, QueueStatus};
pub use rate_limiter::{RateLimitSnapshot, RateLimitUpdate, RateLimits, WindowCounter, WindowKind};
pub use transport::{LogTransport, OutgoingEmail, SendReceipt, Transport};

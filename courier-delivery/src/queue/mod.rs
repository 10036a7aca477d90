//! The delivery queue
//!
//! [`DeliveryQueue`] is a cheaply cloneable handle. Any number of callers
//! may enqueue, cancel and inspect concurrently; a single worker, started
//! with [`DeliveryQueue::serve`], drains it.

mod state;
mod worker;

use std::{
    collections::VecDeque,
    sync::{Arc, atomic::AtomicBool},
    time::Duration,
};

use chrono::{DateTime, Utc};
use courier_common::{EmailType, RecipientHash, RecipientHasher, SharedClock, tracing};
use courier_monitor::EventLog;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;

use self::state::QueueState;
use crate::{
    DeadLetter, DeliveryConfig, DeliveryError, EnqueueOptions, OutgoingEmail, Priority, QueueItem,
    QueueItemId, RateLimitSnapshot, RateLimitUpdate, RetryPolicy, Transport,
    rate_limiter::RateLimiter,
};

struct Inner {
    state: Mutex<QueueState>,
    wake: Notify,
    serving: AtomicBool,
    transport: Arc<dyn Transport>,
    monitor: Arc<EventLog>,
    hasher: RecipientHasher,
    clock: SharedClock,
    idle_poll: Duration,
}

/// Priority queue of outgoing email.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<Inner>,
}

impl core::fmt::Debug for DeliveryQueue {
    fn fmt(&self, fmt: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.inner.state.lock();
        fmt.debug_struct("DeliveryQueue")
            .field("pending", &state.pending.len())
            .field("is_processing", &state.is_processing)
            .field("dead_letters", &state.dead_letters.len())
            .finish_non_exhaustive()
    }
}

/// Snapshot of queue state for operators.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub is_processing: bool,
    pub in_flight: Option<QueueItemId>,
    pub rate_limits: RateLimitSnapshot,
    pub retry: RetryPolicy,
    pub dead_letters: usize,
}

/// A pending item as seen from outside the queue.
#[derive(Debug, Clone, Serialize)]
pub struct PendingItem {
    pub id: QueueItemId,
    pub email_type: EmailType,
    pub recipient_hash: RecipientHash,
    pub priority: Priority,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub scheduled_for: Option<DateTime<Utc>>,
}

impl From<&QueueItem> for PendingItem {
    fn from(item: &QueueItem) -> Self {
        Self {
            id: item.id(),
            email_type: item.email_type(),
            recipient_hash: item.recipient_hash().clone(),
            priority: item.priority(),
            attempts: item.attempts(),
            created_at: item.created_at(),
            last_attempt_at: item.last_attempt_at(),
            scheduled_for: item.scheduled_for(),
        }
    }
}

impl DeliveryQueue {
    /// Create an empty queue.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if `config` fails validation.
    pub fn new(
        config: &DeliveryConfig,
        transport: Arc<dyn Transport>,
        monitor: Arc<EventLog>,
        hasher: RecipientHasher,
        clock: SharedClock,
    ) -> Result<Self, DeliveryError> {
        config.validate()?;

        let state = QueueState {
            pending: VecDeque::new(),
            limiter: RateLimiter::new(config.rate_limits, clock.now()),
            retry: config.retry.clone(),
            is_processing: false,
            in_flight: None,
            dead_letters: VecDeque::new(),
            dead_letter_capacity: config.dead_letter_capacity,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                wake: Notify::new(),
                serving: AtomicBool::new(false),
                transport,
                monitor,
                hasher,
                clock,
                idle_poll: Duration::from_secs(config.idle_poll_secs),
            }),
        })
    }

    /// Add an email to the queue and wake the worker.
    ///
    /// Returns the new item's id. Never blocks on delivery.
    pub fn enqueue(&self, email: OutgoingEmail, options: EnqueueOptions) -> QueueItemId {
        let recipient_hash = self.inner.hasher.hash(&email.to);
        let item = QueueItem::new(email, recipient_hash, options, self.inner.clock.now());
        let id = item.id();

        tracing::debug!(
            item_id = %id,
            priority = %item.priority(),
            email_type = %item.email_type(),
            recipient_hash = %item.recipient_hash(),
            "Enqueued email"
        );

        let pending = {
            let mut state = self.inner.state.lock();
            state.insert(item);
            state.pending.len()
        };

        report_queue_size(pending);
        self.inner.wake.notify_one();
        id
    }

    /// Remove a pending item. Returns `false` if it is unknown, already
    /// sent, dead-lettered or currently being attempted.
    pub fn cancel(&self, id: QueueItemId) -> bool {
        let (cancelled, pending) = {
            let mut state = self.inner.state.lock();
            let cancelled = state.cancel(id);
            (cancelled, state.pending.len())
        };

        if cancelled {
            tracing::debug!(item_id = %id, "Cancelled queued email");
            report_queue_size(pending);
        }

        cancelled
    }

    #[must_use]
    pub fn status(&self) -> QueueStatus {
        let now = self.inner.clock.now();
        let mut state = self.inner.state.lock();

        QueueStatus {
            pending: state.pending.len(),
            is_processing: state.is_processing,
            in_flight: state.in_flight,
            rate_limits: state.limiter.snapshot(now),
            retry: state.retry.clone(),
            dead_letters: state.dead_letters.len(),
        }
    }

    /// Pending items in dispatch order.
    #[must_use]
    pub fn pending_items(&self) -> Vec<PendingItem> {
        self.inner
            .state
            .lock()
            .pending
            .iter()
            .map(PendingItem::from)
            .collect()
    }

    /// Retained dead letters, oldest first.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner
            .state
            .lock()
            .dead_letters
            .iter()
            .cloned()
            .collect()
    }

    /// Change some or all rate limits. Counters and window starts are kept.
    pub fn update_rate_limits(&self, update: RateLimitUpdate) {
        let limits = {
            let mut state = self.inner.state.lock();
            state.limiter.update(update);
            state.limiter.limits()
        };

        tracing::info!(
            max_per_minute = limits.max_per_minute,
            max_per_hour = limits.max_per_hour,
            max_per_day = limits.max_per_day,
            "Updated delivery rate limits"
        );
        self.inner.wake.notify_one();
    }

    /// Replace the retry policy. Applies from the next failed attempt.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Configuration`] if `policy` fails validation.
    pub fn update_retry_policy(&self, policy: RetryPolicy) -> Result<(), DeliveryError> {
        policy.validate()?;

        tracing::info!(
            max_retries = policy.max_retries,
            retry_delay_ms = policy.retry_delay_ms,
            "Updated delivery retry policy"
        );
        self.inner.state.lock().retry = policy;
        Ok(())
    }
}

fn report_queue_size(pending: usize) {
    if let Some(metrics) = courier_metrics::metrics() {
        metrics
            .delivery
            .set_queue_size(u64::try_from(pending).unwrap_or(u64::MAX));
    }
}

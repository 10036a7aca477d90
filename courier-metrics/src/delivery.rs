//! Delivery queue metrics
//!
//! Tracks outbound transactional mail including:
//! - Send attempts by outcome and email type
//! - Transport latency
//! - Retries, dead letters and rate-limit stalls
//! - Pending queue size

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

/// Delivery metrics collector
#[derive(Debug)]
pub struct DeliveryMetrics {
    /// Send attempts by status and email type
    attempts_total: Counter<u64>,

    /// Transport latency by email type
    duration_seconds: Histogram<f64>,

    /// Attempts that were followed by a backoff and retry
    retries_total: Counter<u64>,

    /// Items that exhausted their retries
    dead_letters_total: Counter<u64>,

    /// Times the worker stalled on a saturated rate-limit window
    rate_limited_total: Counter<u64>,

    /// Attempts taken by messages that were eventually delivered
    attempts_per_delivery: Histogram<u64>,

    // Shared with the observable gauge callback
    queue_pending: Arc<AtomicU64>,
}

impl DeliveryMetrics {
    /// Create a new delivery metrics collector against the global meter provider.
    #[must_use]
    pub fn new() -> Self {
        let meter = meter();

        let attempts_total = meter
            .u64_counter("courier.delivery.attempts.total")
            .with_description("Total number of send attempts by status")
            .build();

        let duration_seconds = meter
            .f64_histogram("courier.delivery.duration.seconds")
            .with_description("Distribution of transport latency by email type")
            .build();

        let retries_total = meter
            .u64_counter("courier.delivery.retries.total")
            .with_description("Total number of failed attempts scheduled for retry")
            .build();

        let dead_letters_total = meter
            .u64_counter("courier.delivery.dead_letters.total")
            .with_description("Total number of messages that exhausted their retries")
            .build();

        let rate_limited_total = meter
            .u64_counter("courier.delivery.rate_limited.total")
            .with_description("Total number of dispatch stalls on a saturated rate-limit window")
            .build();

        let attempts_per_delivery = meter
            .u64_histogram("courier.delivery.attempts_per_delivery")
            .with_description("Distribution of attempts needed for successful deliveries")
            .build();

        let queue_pending = Arc::new(AtomicU64::new(0));
        let pending = queue_pending.clone();

        // The meter keeps this alive internally via the callback
        meter
            .u64_observable_gauge("courier.delivery.queue.size")
            .with_description("Current number of pending queue items")
            .with_callback(move |observer| {
                observer.observe(pending.load(Ordering::Relaxed), &[]);
            })
            .build();

        Self {
            attempts_total,
            duration_seconds,
            retries_total,
            dead_letters_total,
            rate_limited_total,
            attempts_per_delivery,
            queue_pending,
        }
    }

    /// Record a successful send
    pub fn record_success(&self, email_type: &str, duration_secs: f64, attempts: u32) {
        let attributes = [KeyValue::new("email_type", email_type.to_string())];
        self.duration_seconds.record(duration_secs, &attributes);
        self.attempts_per_delivery.record(u64::from(attempts), &[]);
        self.record_attempt("success", email_type);
    }

    /// Record a failed send attempt
    pub fn record_failure(&self, email_type: &str, duration_secs: f64) {
        let attributes = [KeyValue::new("email_type", email_type.to_string())];
        self.duration_seconds.record(duration_secs, &attributes);
        self.record_attempt("failed", email_type);
    }

    fn record_attempt(&self, status: &'static str, email_type: &str) {
        let attributes = [
            KeyValue::new("status", status),
            KeyValue::new("email_type", email_type.to_string()),
        ];
        self.attempts_total.add(1, &attributes);
    }

    /// Record a failed attempt that will be retried
    pub fn record_retry(&self) {
        self.retries_total.add(1, &[]);
    }

    /// Record a message routed to the dead-letter sink
    pub fn record_dead_letter(&self, email_type: &str) {
        self.dead_letters_total
            .add(1, &[KeyValue::new("email_type", email_type.to_string())]);
    }

    /// Record a stall on a saturated rate-limit window
    pub fn record_rate_limited(&self, window: &'static str) {
        self.rate_limited_total
            .add(1, &[KeyValue::new("window", window)]);
    }

    /// Set the current pending queue size
    pub fn set_queue_size(&self, size: u64) {
        self.queue_pending.store(size, Ordering::Relaxed);
    }

    /// Get the last reported pending queue size
    #[must_use]
    pub fn queue_size(&self) -> u64 {
        self.queue_pending.load(Ordering::Relaxed)
    }
}

impl Default for DeliveryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Get the OpenTelemetry meter for delivery metrics
fn meter() -> Meter {
    opentelemetry::global::meter("courier.delivery")
}

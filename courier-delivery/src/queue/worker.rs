//! The worker that drains the queue.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use courier_common::{Signal, internal, tracing};
use courier_monitor::NewLogEntry;
use futures_util::FutureExt;
use tokio::sync::broadcast::{self, error::TryRecvError};

use super::{DeliveryQueue, report_queue_size, state::Step};
use crate::{DeadLetter, DeliveryError, QueueItem, SendReceipt, TransportError};

/// Shortest pause while a rate window is full.
const MIN_BACKPRESSURE_WAIT: Duration = Duration::from_millis(100);

enum Flow {
    Continue,
    Stop,
}

/// Clears the serving flag however `serve` exits.
struct ServingGuard<'a>(&'a AtomicBool);

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn shutdown_received(signal: &Result<Signal, broadcast::error::RecvError>) -> Flow {
    match signal {
        Ok(Signal::Shutdown) => internal!("Delivery worker received shutdown signal"),
        Err(e) => tracing::error!("Delivery worker shutdown channel error: {e}"),
    }
    Flow::Stop
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

impl DeliveryQueue {
    /// Drain the queue until a shutdown signal arrives.
    ///
    /// Items are sent one at a time, in queue order, subject to the rate
    /// limits. A send in progress when shutdown arrives is allowed to finish;
    /// an item waiting out a retry backoff is put back at the front of the
    /// queue.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::AlreadyRunning`] if another `serve` call is
    /// active on this queue.
    pub async fn serve(
        &self,
        mut shutdown: broadcast::Receiver<Signal>,
    ) -> Result<(), DeliveryError> {
        if self.inner.serving.swap(true, Ordering::AcqRel) {
            return Err(DeliveryError::AlreadyRunning);
        }
        let _serving = ServingGuard(&self.inner.serving);

        internal!("Delivery worker starting");

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(signal) => {
                    shutdown_received(&Ok(signal));
                    break;
                }
                Err(e) => {
                    tracing::error!("Delivery worker shutdown channel error: {e}");
                    break;
                }
            }

            let step = self.inner.state.lock().next_step(self.inner.clock.now());
            let flow = match step {
                Step::Idle => self.pause(None, &mut shutdown).await,
                Step::Saturated { window, wait } => {
                    if let Some(metrics) = courier_metrics::metrics() {
                        metrics.delivery.record_rate_limited(window.as_str());
                    }
                    self.pause(Some(wait.max(MIN_BACKPRESSURE_WAIT)), &mut shutdown)
                        .await
                }
                Step::Waiting { wait } => {
                    self.pause(Some(wait.min(self.inner.idle_poll)), &mut shutdown)
                        .await
                }
                Step::Dispatch(item) => self.dispatch(item, &mut shutdown).await,
            };

            if matches!(flow, Flow::Stop) {
                break;
            }
        }

        self.inner.state.lock().is_processing = false;
        internal!("Delivery worker stopped");

        Ok(())
    }

    /// Sleep until `timeout` elapses, new work is signalled, or shutdown.
    async fn pause(
        &self,
        timeout: Option<Duration>,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Flow {
        let timer = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            () = timer => Flow::Continue,
            () = self.inner.wake.notified() => Flow::Continue,
            signal = shutdown.recv() => shutdown_received(&signal),
        }
    }

    async fn dispatch(
        &self,
        item: QueueItem,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Flow {
        let item = item.attempted(self.inner.clock.now());
        report_queue_size(self.inner.state.lock().pending.len());

        tracing::debug!(
            item_id = %item.id(),
            recipient_hash = %item.recipient_hash(),
            attempt = item.attempts(),
            "Dispatching email"
        );

        let started = tokio::time::Instant::now();
        let result = AssertUnwindSafe(self.inner.transport.send(item.email()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(TransportError::Panicked(panic_message(&*panic))));
        let elapsed = started.elapsed();

        match result {
            Ok(receipt) => {
                self.delivered(&item, &receipt, elapsed);
                Flow::Continue
            }
            Err(error) => self.failed(item, &error, elapsed, shutdown).await,
        }
    }

    fn delivered(&self, item: &QueueItem, receipt: &SendReceipt, elapsed: Duration) {
        {
            let mut state = self.inner.state.lock();
            state.limiter.record_sent(self.inner.clock.now());
            state.in_flight = None;
        }

        self.inner.monitor.record(
            NewLogEntry::success(item.email_type(), item.recipient_hash().clone())
                .with_response_time(millis(elapsed))
                .with_metadata("attempts", item.attempts())
                .with_metadata("message_id", receipt.message_id.clone()),
        );

        if let Some(metrics) = courier_metrics::metrics() {
            metrics.delivery.record_success(
                item.email_type().as_str(),
                elapsed.as_secs_f64(),
                item.attempts(),
            );
        }

        tracing::info!(
            item_id = %item.id(),
            recipient_hash = %item.recipient_hash(),
            attempts = item.attempts(),
            message_id = %receipt.message_id,
            "Email delivered"
        );
    }

    async fn failed(
        &self,
        item: QueueItem,
        error: &TransportError,
        elapsed: Duration,
        shutdown: &mut broadcast::Receiver<Signal>,
    ) -> Flow {
        self.inner.monitor.record(
            NewLogEntry::failure(
                item.email_type(),
                item.recipient_hash().clone(),
                error.to_string(),
            )
            .with_response_time(millis(elapsed))
            .with_metadata("attempts", item.attempts()),
        );

        if let Some(metrics) = courier_metrics::metrics() {
            metrics
                .delivery
                .record_failure(item.email_type().as_str(), elapsed.as_secs_f64());
        }

        let (retry, backoff, remaining) = {
            let state = self.inner.state.lock();
            (
                state.retry.should_retry(item.attempts()),
                state.retry.backoff(item.attempts()),
                state.retry.remaining_attempts(item.attempts()),
            )
        };

        if !retry {
            self.exhausted(item, error);
            return Flow::Continue;
        }

        tracing::warn!(
            item_id = %item.id(),
            recipient_hash = %item.recipient_hash(),
            attempt = item.attempts(),
            remaining_attempts = remaining,
            retry_in_ms = millis(backoff),
            "Delivery failed, will retry: {error}"
        );

        if let Some(metrics) = courier_metrics::metrics() {
            metrics.delivery.record_retry();
        }

        let flow = tokio::select! {
            () = tokio::time::sleep(backoff) => Flow::Continue,
            signal = shutdown.recv() => shutdown_received(&signal),
        };

        let pending = {
            let mut state = self.inner.state.lock();
            state.in_flight = None;
            state.push_front(item);
            state.pending.len()
        };
        report_queue_size(pending);

        flow
    }

    fn exhausted(&self, item: QueueItem, error: &TransportError) {
        tracing::error!(
            item_id = %item.id(),
            recipient_hash = %item.recipient_hash(),
            attempts = item.attempts(),
            "Retries exhausted, email dead-lettered: {error}"
        );

        if let Some(metrics) = courier_metrics::metrics() {
            metrics
                .delivery
                .record_dead_letter(item.email_type().as_str());
        }

        let failed_at = self.inner.clock.now();
        let mut state = self.inner.state.lock();
        state.in_flight = None;
        state.dead_letter(DeadLetter {
            item,
            last_error: error.to_string(),
            failed_at,
        });
    }
}

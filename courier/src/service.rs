//! The wired-up subsystem.

use std::sync::Arc;

use courier_common::{Signal, tracing};
use courier_delivery::{CooldownGate, DeliveryQueue};
use courier_monitor::EventLog;
use tokio::sync::broadcast;

use crate::{
    maintenance::{self, Schedule},
    request::{SendRequest, Submission},
};

/// One queue, one gate and one event log sharing a hasher and a clock.
///
/// Built by [`Courier::build`](crate::Courier::build).
#[derive(Debug)]
pub struct Service {
    pub(crate) queue: DeliveryQueue,
    pub(crate) cooldown: Arc<CooldownGate>,
    pub(crate) monitor: Arc<EventLog>,
    pub(crate) schedule: Schedule,
}

impl Service {
    /// Gate a request on the recipient's cooldown and quotas, then queue it.
    ///
    /// Nothing is queued when the gate refuses.
    pub fn submit(&self, request: SendRequest) -> Submission {
        let decision = self
            .cooldown
            .check_detailed(&request.to, Some(request.email_type));

        if !decision.is_allowed() {
            tracing::debug!(
                email_type = %request.email_type,
                decision = ?decision,
                "Send request throttled"
            );
            return Submission::throttled(decision);
        }

        let (email, options) = request.into_parts();
        Submission::Queued {
            id: self.queue.enqueue(email, options),
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &DeliveryQueue {
        &self.queue
    }

    #[must_use]
    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    #[must_use]
    pub const fn monitor(&self) -> &Arc<EventLog> {
        &self.monitor
    }

    /// Run the delivery worker and the maintenance tasks until `shutdown`
    /// broadcasts.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker is already serving this queue, or if the
    /// maintenance task panics.
    pub async fn run(&self, shutdown: &broadcast::Sender<Signal>) -> anyhow::Result<()> {
        let maintenance = tokio::spawn(maintenance::run(
            self.monitor.clone(),
            self.cooldown.clone(),
            self.schedule,
            shutdown.subscribe(),
        ));

        if let Err(e) = self.queue.serve(shutdown.subscribe()).await {
            maintenance.abort();
            return Err(e.into());
        }

        maintenance.await?;

        Ok(())
    }
}

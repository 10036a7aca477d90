//! Periodic upkeep: alert sweeps, log retention and cooldown sweeps.

use std::{sync::Arc, time::Duration};

use courier_common::{Signal, internal, tracing};
use courier_delivery::CooldownGate;
use courier_monitor::EventLog;
use tokio::{sync::broadcast, time::MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub alert_check: Duration,
    pub log_cleanup: Duration,
    pub cooldown_sweep: Duration,
}

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Run the maintenance timers until shutdown.
pub async fn run(
    monitor: Arc<EventLog>,
    cooldown: Arc<CooldownGate>,
    schedule: Schedule,
    mut shutdown: broadcast::Receiver<Signal>,
) {
    let mut alert_timer = interval(schedule.alert_check);
    let mut cleanup_timer = interval(schedule.log_cleanup);
    let mut sweep_timer = interval(schedule.cooldown_sweep);

    // Skip the first tick to avoid immediate execution
    alert_timer.tick().await;
    cleanup_timer.tick().await;
    sweep_timer.tick().await;

    internal!("Maintenance tasks running");

    loop {
        tokio::select! {
            _ = alert_timer.tick() => {
                let alerts = monitor.check_alerts();
                if alerts.is_empty() {
                    tracing::trace!("Alert sweep found nothing to report");
                } else {
                    tracing::debug!(raised = alerts.len(), "Alert sweep raised alerts");
                }
            }
            _ = cleanup_timer.tick() => {
                let removed = monitor.cleanup();
                tracing::debug!(removed, remaining = monitor.len(), "Event log retention sweep");
            }
            _ = sweep_timer.tick() => {
                cooldown.cleanup();
            }
            sig = shutdown.recv() => {
                match sig {
                    Ok(Signal::Shutdown) => internal!("Maintenance received shutdown signal"),
                    Err(e) => tracing::error!("Maintenance shutdown channel error: {e}"),
                }
                break;
            }
        }
    }
}

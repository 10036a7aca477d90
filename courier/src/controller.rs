use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use courier_common::{
    HashingConfig, RecipientHasher, SharedClock, Signal, SystemClock, internal, logging, tracing,
};
use courier_delivery::{
    CooldownConfig, CooldownGate, DeliveryConfig, DeliveryQueue, LogTransport, Transport,
};
use courier_metrics::MetricsConfig;
use courier_monitor::{EventLog, LogAlertSink, MonitorConfig};
use serde::Deserialize;
use tokio::{io::BufReader, sync::broadcast};

use crate::{Service, intake, maintenance::Schedule};

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// How often the alert rules are swept.
    ///
    /// Default: 300 seconds
    #[serde(default = "defaults::alert_check_interval_secs")]
    pub alert_check_interval_secs: u64,

    /// How often expired event log entries are dropped.
    ///
    /// Default: 3600 seconds
    #[serde(default = "defaults::log_cleanup_interval_secs")]
    pub log_cleanup_interval_secs: u64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            alert_check_interval_secs: defaults::alert_check_interval_secs(),
            log_cleanup_interval_secs: defaults::log_cleanup_interval_secs(),
        }
    }
}

mod defaults {
    pub const fn alert_check_interval_secs() -> u64 {
        300
    }

    pub const fn log_cleanup_interval_secs() -> u64 {
        3600
    }
}

/// Top-level configuration, as read from `courier.config.ron`.
#[derive(Debug, Default, Deserialize)]
pub struct Courier {
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub cooldown: CooldownConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
}

fn non_zero_secs(name: &str, secs: u64) -> anyhow::Result<Duration> {
    if secs == 0 {
        anyhow::bail!("{name} must be at least 1 second");
    }
    Ok(Duration::from_secs(secs))
}

async fn shutdown() -> anyhow::Result<()> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!("CTRL+C entered -- Enter it again to force shutdown");
        }
        _ = terminate.recv() => {
            internal!("Terminate Signal received, shutting down");
        }
    };

    SHUTDOWN_BROADCAST
        .send(Signal::Shutdown)
        .map_err(|e| anyhow::anyhow!("Failed to broadcast shutdown: {e}"))?;

    tokio::signal::ctrl_c().await?;
    internal!(level = WARN, "Forced shutdown, in-flight work is abandoned");

    Ok(())
}

impl Courier {
    /// Wire the subsystem around `transport` and `clock`.
    ///
    /// # Errors
    ///
    /// Returns an error if any section of the configuration is invalid.
    pub fn build(
        self,
        transport: Arc<dyn Transport>,
        clock: SharedClock,
    ) -> anyhow::Result<Service> {
        self.cooldown.validate()?;

        let schedule = Schedule {
            alert_check: non_zero_secs(
                "maintenance.alert_check_interval_secs",
                self.maintenance.alert_check_interval_secs,
            )?,
            log_cleanup: non_zero_secs(
                "maintenance.log_cleanup_interval_secs",
                self.maintenance.log_cleanup_interval_secs,
            )?,
            cooldown_sweep: non_zero_secs(
                "cooldown.sweep_interval_secs",
                self.cooldown.sweep_interval_secs,
            )?,
        };

        let hasher = RecipientHasher::from_config(&self.hashing);
        let monitor = Arc::new(EventLog::new(self.monitor, clock.clone())?);
        let cooldown = Arc::new(CooldownGate::new(
            &self.cooldown,
            monitor.clone(),
            hasher.clone(),
            clock.clone(),
        ));
        let queue = DeliveryQueue::new(&self.delivery, transport, monitor.clone(), hasher, clock)?;

        Ok(Service {
            queue,
            cooldown,
            monitor,
            schedule,
        })
    }

    /// Run this controller, and everything it controls
    ///
    /// Requests are read from stdin and delivered through [`LogTransport`].
    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// This function will return an error if the configuration is invalid,
    /// metrics cannot be initialised, or stdin/stdout fail.
    pub async fn run(self) -> anyhow::Result<()> {
        logging::init();
        courier_metrics::init_metrics(&self.metrics)?;

        let service = self.build(Arc::new(LogTransport), SystemClock::shared())?;
        service.monitor().on_alert(LogAlertSink);

        internal!("Controller running");

        let intake = async {
            let submitted = intake::run(
                &service,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
            internal!("Input closed after {submitted} requests, still delivering");
            std::future::pending::<anyhow::Result<()>>().await
        };

        let ret = tokio::select! {
            r = service.run(&SHUTDOWN_BROADCAST) => {
                r
            }
            r = intake => {
                r
            }
            r = shutdown() => {
                r
            }
        };

        let status = service.queue().status();
        if status.pending > 0 {
            tracing::warn!(pending = status.pending, "Exiting with undelivered email");
        }
        internal!("Shutting down...");

        ret
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_partial_ron_config() {
        let courier: Courier = ron::from_str(
            r#"(
                delivery: (
                    rate_limits: (max_per_minute: 2),
                    retry: (max_retries: 5, retry_delay_ms: 1000),
                ),
                cooldown: (cooldown_secs: 30),
                monitor: (max_emails_per_user_per_hour: 3),
                hashing: (salt: "pepper"),
            )"#,
        )
        .unwrap_or_else(|e| panic!("{e}"));

        assert_eq!(courier.delivery.rate_limits.max_per_minute, 2);
        assert_eq!(courier.delivery.rate_limits.max_per_hour, 100);
        assert_eq!(courier.delivery.retry.max_retries, 5);
        assert_eq!(courier.delivery.retry.retry_delay_ms, 1000);
        assert_eq!(courier.cooldown.cooldown_secs, 30);
        assert_eq!(courier.cooldown.sweep_interval_secs, 300);
        assert_eq!(courier.monitor.max_emails_per_user_per_hour, 3);
        assert_eq!(courier.maintenance.alert_check_interval_secs, 300);
        assert!(!courier.metrics.enabled);
    }

    #[test]
    fn test_empty_config_is_all_defaults() {
        let courier: Courier = ron::from_str("()").unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(courier.delivery.idle_poll_secs, 10);
        assert_eq!(courier.maintenance.log_cleanup_interval_secs, 3600);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let courier = Courier {
            maintenance: MaintenanceConfig {
                alert_check_interval_secs: 0,
                ..MaintenanceConfig::default()
            },
            ..Courier::default()
        };

        let error = courier
            .build(Arc::new(LogTransport), SystemClock::shared())
            .err()
            .map(|e| e.to_string());
        assert_eq!(
            error.as_deref(),
            Some("maintenance.alert_check_interval_secs must be at least 1 second")
        );
    }

    #[test]
    fn test_invalid_monitor_config_rejected() {
        let courier = Courier {
            monitor: MonitorConfig {
                error_rate_threshold: 1.5,
                ..MonitorConfig::default()
            },
            ..Courier::default()
        };

        assert!(
            courier
                .build(Arc::new(LogTransport), SystemClock::shared())
                .is_err()
        );
    }

    #[test]
    fn test_oversized_cooldown_rejected() {
        let courier: Courier = ron::from_str("(cooldown: (cooldown_secs: 18446744073709551615))")
            .unwrap_or_else(|e| panic!("{e}"));

        assert!(
            courier
                .build(Arc::new(LogTransport), SystemClock::shared())
                .is_err()
        );
    }

    #[test]
    fn test_oversized_retention_rejected() {
        let courier = Courier {
            monitor: MonitorConfig {
                retention_hours: u32::MAX,
                ..MonitorConfig::default()
            },
            ..Courier::default()
        };

        assert!(
            courier
                .build(Arc::new(LogTransport), SystemClock::shared())
                .is_err()
        );
    }
}

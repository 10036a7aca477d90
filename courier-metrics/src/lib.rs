//! OpenTelemetry metrics for courier
//!
//! Delivery counters and the queue-size gauge are pushed via OTLP to an
//! OpenTelemetry Collector, which can expose them for Prometheus to scrape.
//!
//! # Usage
//!
//! ```rust,no_run
//! use courier_metrics::{init_metrics, MetricsConfig};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! init_metrics(&MetricsConfig::default())?;
//!
//! if let Some(metrics) = courier_metrics::metrics() {
//!     metrics.delivery.set_queue_size(3);
//! }
//! # Ok(())
//! # }
//! ```

mod config;
mod delivery;
mod error;
mod exporter;

pub use config::MetricsConfig;
pub use delivery::DeliveryMetrics;
pub use error::MetricsError;
use once_cell::sync::OnceCell;

/// Global metrics instance
static METRICS_INSTANCE: OnceCell<Metrics> = OnceCell::new();

/// Root metrics container
#[derive(Debug)]
pub struct Metrics {
    pub delivery: DeliveryMetrics,
}

/// Initialize the metrics system
///
/// Call once at startup. If metrics are disabled in the config this is a
/// no-op and [`metrics`] keeps returning `None`.
///
/// # Errors
///
/// Returns an error if the exporter cannot be built or if called twice.
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        tracing::info!("Metrics collection is disabled");
        return Ok(());
    }

    tracing::info!(
        endpoint = %config.endpoint,
        "Initializing OpenTelemetry metrics with OTLP exporter"
    );

    let provider = exporter::init_otlp_exporter(config)?;
    opentelemetry::global::set_meter_provider(provider);

    METRICS_INSTANCE
        .set(Metrics {
            delivery: DeliveryMetrics::new(),
        })
        .map_err(|_| MetricsError::AlreadyInitialized)?;

    tracing::info!("Metrics collection initialized successfully");

    Ok(())
}

/// The global metrics instance, if [`init_metrics`] enabled one.
#[must_use]
pub fn metrics() -> Option<&'static Metrics> {
    METRICS_INSTANCE.get()
}

//! OTLP metrics exporter

use std::time::Duration;

use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};

use crate::{MetricsConfig, MetricsError};

/// Build a meter provider that pushes to `config.endpoint` every
/// `config.export_interval_secs`.
///
/// # Errors
///
/// Returns an error if the endpoint is not an http(s) URL, the interval is
/// zero, or the exporter cannot be built.
pub fn init_otlp_exporter(config: &MetricsConfig) -> Result<SdkMeterProvider, MetricsError> {
    if !(config.endpoint.starts_with("http://") || config.endpoint.starts_with("https://")) {
        return Err(MetricsError::InvalidConfiguration(format!(
            "endpoint must be an http(s) URL, got {:?}",
            config.endpoint
        )));
    }

    if config.export_interval_secs == 0 {
        return Err(MetricsError::InvalidConfiguration(
            "export_interval_secs must be at least 1".to_string(),
        ));
    }

    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_http()
        .with_endpoint(config.endpoint.clone())
        .build()
        .map_err(|e| MetricsError::OpenTelemetry(e.to_string()))?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(Duration::from_secs(config.export_interval_secs))
        .build();

    Ok(SdkMeterProvider::builder().with_reader(reader).build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_endpoint() {
        let config = MetricsConfig {
            endpoint: "localhost:4318".to_string(),
            ..MetricsConfig::default()
        };

        assert!(matches!(
            init_otlp_exporter(&config),
            Err(MetricsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_zero_interval() {
        let config = MetricsConfig {
            export_interval_secs: 0,
            ..MetricsConfig::default()
        };

        assert!(init_otlp_exporter(&config).is_err());
    }
}

use serde::Deserialize;

/// Where and how often delivery metrics are pushed.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Off by default; recording sites skip the instruments while off.
    #[serde(default)]
    pub enabled: bool,

    /// OTLP/HTTP metrics endpoint, e.g. `http://otel-collector:4318/v1/metrics`.
    #[serde(default = "defaults::endpoint")]
    pub endpoint: String,

    /// Push interval.
    ///
    /// Default: 60 seconds
    #[serde(default = "defaults::export_interval_secs")]
    pub export_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: defaults::endpoint(),
            export_interval_secs: defaults::export_interval_secs(),
        }
    }
}

mod defaults {
    pub fn endpoint() -> String {
        "http://localhost:4318/v1/metrics".to_string()
    }

    pub const fn export_interval_secs() -> u64 {
        60
    }
}

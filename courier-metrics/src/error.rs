use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Metrics already initialized for this process")]
    AlreadyInitialized,

    #[error("Invalid metrics configuration: {0}")]
    InvalidConfiguration(String),

    #[error("OpenTelemetry error: {0}")]
    OpenTelemetry(String),
}

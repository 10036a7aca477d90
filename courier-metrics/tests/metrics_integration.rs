//! Integration tests for metrics collection
//!
//! Without an installed provider the global meter is a no-op, so these tests
//! verify the recording API and the locally tracked queue gauge.

use courier_metrics::{DeliveryMetrics, MetricsConfig};

#[test]
fn test_queue_size_gauge_tracks_latest_value() {
    let metrics = DeliveryMetrics::new();

    assert_eq!(metrics.queue_size(), 0);
    metrics.set_queue_size(12);
    assert_eq!(metrics.queue_size(), 12);
    metrics.set_queue_size(3);
    assert_eq!(metrics.queue_size(), 3);
}

#[test]
fn test_delivery_recording_does_not_panic() {
    let metrics = DeliveryMetrics::new();

    metrics.record_failure("reset", 0.2);
    metrics.record_retry();
    metrics.record_success("reset", 0.1, 2);
    metrics.record_dead_letter("invite");
    metrics.record_rate_limited("minute");
}

#[test]
fn test_disabled_metrics_are_a_noop() {
    let config = MetricsConfig::default();
    assert!(!config.enabled);

    assert!(courier_metrics::init_metrics(&config).is_ok());
    assert!(courier_metrics::metrics().is_none());
}

//! Log subscriber and Prometheus exporter setup.

use std::net::SocketAddr;

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{Config, LogFormat};
use crate::error::AppError;

/// Installs the global tracing subscriber.
pub fn init_tracing(config: &Config) -> Result<(), AppError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
    .map_err(|e| AppError::Telemetry(e.to_string()))
}

/// Installs the Prometheus recorder and serves it over HTTP on `addr`.
pub fn install_metrics(addr: SocketAddr) -> Result<(), AppError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5],
        )
        .map_err(|e| AppError::Telemetry(e.to_string()))?
        .install()
        .map_err(|e| AppError::Telemetry(e.to_string()))?;

    describe_metrics();
    tracing::info!(%addr, "metrics exporter listening");
    Ok(())
}

fn describe_metrics() {
    // Engine
    describe_histogram!(
        "lending_operation_duration_seconds",
        "Time taken by a lifecycle operation, including its unit of work"
    );
    describe_counter!(
        "lending_operation_failures_total",
        "Lifecycle operations that returned an error, by kind"
    );
    describe_counter!(
        "lending_borrow_requests_created_total",
        "Borrow requests opened"
    );
    describe_counter!(
        "lending_borrow_requests_approved_total",
        "Borrow requests approved and issued"
    );
    describe_counter!(
        "lending_borrow_requests_rejected_total",
        "Borrow requests rejected"
    );
    describe_counter!(
        "lending_return_requests_created_total",
        "Return requests opened"
    );
    describe_counter!("lending_returns_approved_total", "Returns approved");
    describe_counter!(
        "lending_account_changes_total",
        "Account changes made by staff"
    );
    describe_counter!("lending_returns_rejected_total", "Returns rejected");
    describe_counter!("lending_copies_reserved_total", "Copies taken off the shelf");
    describe_counter!("lending_copies_released_total", "Copies put back on the shelf");
    describe_counter!(
        "lending_inventory_invariant_violations_total",
        "Releases refused because availability would exceed the total"
    );
    describe_counter!(
        "lending_inventory_audit_mismatches_total",
        "Inventory audits whose stored availability disagreed with active loans"
    );
    describe_counter!(
        "lending_events_published_total",
        "Lifecycle events handed to the notifier"
    );
    describe_counter!(
        "lending_event_publish_failures_total",
        "Lifecycle events dropped because the notifier channel was full or closed"
    );

    // Notifier
    describe_counter!(
        "notifier_notifications_created_total",
        "Notifications stored, by kind"
    );
    describe_counter!(
        "notifier_notifications_skipped_total",
        "Notify calls that found an existing notification"
    );
    describe_counter!("notifier_email_failures_total", "Emails that failed to send");
    describe_counter!(
        "notifier_dispatch_failures_total",
        "Events the notifier could not turn into a notification"
    );
}

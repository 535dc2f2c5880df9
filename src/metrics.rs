use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter, serving the scrape payload on `addr`,
/// and register all application metrics. Must be called from within the
/// tokio runtime. Without a call, every metric macro is a no-op.
pub fn init_metrics(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus exporter: {e}"))?;

    // Pre-register counters so they appear even before the first increment.
    counter!("poll_cycles_total").absolute(0);
    counter!("user_cycle_failures_total").absolute(0);
    counter!("positions_fetched_total").absolute(0);
    counter!("notifications_sent_total").absolute(0);
    counter!("notifications_failed_total").absolute(0);
    for event_type in ["new_position", "position_increased", "position_closed"] {
        counter!("change_events_total", "event_type" => event_type).absolute(0);
    }

    gauge!("monitored_users").set(0.0);

    tracing::info!(%addr, "Prometheus exporter listening");
    Ok(())
}

use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once; only the
/// first call installs (tests spawn several applications per process).
pub fn init_metrics() {
    if METRICS_HANDLE.get().is_some() {
        return;
    }
    if let Ok(handle) = PrometheusBuilder::new().install_recorder() {
        let _ = METRICS_HANDLE.set(handle);
    }
}

pub fn render_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

pub fn record_order_created() {
    counter!("orders_created_total").increment(1);
}

pub fn record_intent_created(currency: &str, amount_minor: u64) {
    counter!("payment_intents_created_total", "currency" => currency.to_string()).increment(1);
    counter!("payment_amount_total", "currency" => currency.to_string()).increment(amount_minor);
}

pub fn record_webhook_event(event_type: &str) {
    counter!("webhook_events_total", "event_type" => event_type.to_string()).increment(1);
}

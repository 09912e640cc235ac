use prometheus::{Encoder, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

// Global registry
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

// Metrics
pub static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
pub static GUARD_DECISIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static API_CLIENT_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() -> Result<(), prometheus::Error> {
    let registry = Registry::new();

    let requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;

    let request_duration = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path", "status"],
    )?;

    let guard_decisions = IntCounterVec::new(
        Opts::new("guard_decisions_total", "Access guard decisions"),
        &["guard", "outcome"],
    )?;

    let api_requests = IntCounterVec::new(
        Opts::new(
            "api_client_requests_total",
            "Organization-scoped CRM API calls",
        ),
        &["method", "outcome"],
    )?;

    registry.register(Box::new(requests_total.clone()))?;
    registry.register(Box::new(request_duration.clone()))?;
    registry.register(Box::new(guard_decisions.clone()))?;
    registry.register(Box::new(api_requests.clone()))?;

    // Initialize globals
    let _ = REGISTRY.set(registry);
    let _ = HTTP_REQUESTS_TOTAL.set(requests_total);
    let _ = HTTP_REQUEST_DURATION_SECONDS.set(request_duration);
    let _ = GUARD_DECISIONS_TOTAL.set(guard_decisions);
    let _ = API_CLIENT_REQUESTS_TOTAL.set(api_requests);

    Ok(())
}

// Recorders are no-ops until init_metrics has run (unit tests, library use).

pub fn record_http_request(method: &str, path: &str, status: &str, seconds: f64) {
    if let Some(counter) = HTTP_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, path, status]).inc();
    }
    if let Some(histogram) = HTTP_REQUEST_DURATION_SECONDS.get() {
        histogram
            .with_label_values(&[method, path, status])
            .observe(seconds);
    }
}

pub fn record_guard_decision(guard: &str, outcome: &str) {
    if let Some(counter) = GUARD_DECISIONS_TOTAL.get() {
        counter.with_label_values(&[guard, outcome]).inc();
    }
}

pub fn record_api_request(method: &str, outcome: &str) {
    if let Some(counter) = API_CLIENT_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[method, outcome]).inc();
    }
}

pub fn get_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return String::new();
    };

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

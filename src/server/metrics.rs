use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all Promemoria metrics
const PREFIX: &str = "promemoria";

lazy_static! {
    // Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Authentication Metrics
    pub static ref AUTH_LOGIN_ATTEMPTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_auth_login_attempts_total"), "Total login attempts"),
        &["status"]
    ).expect("Failed to create auth_login_attempts_total metric");

    pub static ref AUTH_LOGIN_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_auth_login_duration_seconds"),
            "Login request duration in seconds"
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0])
    ).expect("Failed to create auth_login_duration_seconds metric");

    // Notification Metrics
    pub static ref NOTIFICATIONS_CREATED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_created_total"), "Notifications created"),
        &["type"]
    ).expect("Failed to create notifications_created_total metric");

    pub static ref NOTIFICATIONS_DELIVERED_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_notifications_delivered_total"), "Notifications delivered to connections"),
        &["mode"]
    ).expect("Failed to create notifications_delivered_total metric");

    pub static ref NOTIFICATIONS_CANCELLED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_notifications_cancelled_total"),
        "Scheduled notifications cancelled before firing"
    ).expect("Failed to create notifications_cancelled_total metric");

    pub static ref SCHEDULED_TIMERS: Gauge = Gauge::new(
        format!("{PREFIX}_scheduled_timers"),
        "Armed delivery timers"
    ).expect("Failed to create scheduled_timers metric");

    // WebSocket Metrics
    pub static ref WS_CONNECTIONS: Gauge = Gauge::new(
        format!("{PREFIX}_ws_connections"),
        "Live WebSocket connections"
    ).expect("Failed to create ws_connections metric");

    // Error Metrics
    pub static ref ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_errors_total"), "Total errors by type and endpoint"),
        &["error_type", "endpoint"]
    ).expect("Failed to create errors_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Register all metrics - ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_ATTEMPTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(AUTH_LOGIN_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_CREATED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_DELIVERED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(NOTIFICATIONS_CANCELLED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(SCHEDULED_TIMERS.clone()));
    let _ = REGISTRY.register(Box::new(WS_CONNECTIONS.clone()));
    let _ = REGISTRY.register(Box::new(ERRORS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

/// Record a login attempt
pub fn record_login_attempt(status: &str, duration: Duration) {
    AUTH_LOGIN_ATTEMPTS_TOTAL
        .with_label_values(&[status])
        .inc();

    AUTH_LOGIN_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// Record a created notification
pub fn record_notification_created(notification_type: &str) {
    NOTIFICATIONS_CREATED_TOTAL
        .with_label_values(&[notification_type])
        .inc();
}

/// Record a delivery push; `mode` is "immediate" or "scheduled"
pub fn record_notification_delivered(mode: &str) {
    NOTIFICATIONS_DELIVERED_TOTAL.with_label_values(&[mode]).inc();
}

/// Record a cancelled scheduled notification
pub fn record_notification_cancelled() {
    NOTIFICATIONS_CANCELLED_TOTAL.inc();
}

/// Update the armed-timers gauge
pub fn set_scheduled_timers(count: usize) {
    SCHEDULED_TIMERS.set(count as f64);
}

/// Update the live WebSocket connections gauge
pub fn set_ws_connections(count: usize) {
    WS_CONNECTIONS.set(count as f64);
}

/// Record an error
pub fn record_error(error_type: &str, endpoint: &str) {
    ERRORS_TOTAL
        .with_label_values(&[error_type, endpoint])
        .inc();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_else(|_| String::from(""));
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

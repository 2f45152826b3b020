/// Prometheus metrics for the inventory server
///
/// Counters and gauges live in a process-wide registry and are
/// rendered by the `/metrics` endpoint. Allocation outcomes are the
/// ones worth alerting on; the rest exist for capacity dashboards.
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, register_int_gauge_vec, Encoder, Gauge, HistogramVec, IntCounter,
    IntCounterVec, IntGauge, IntGaugeVec, TextEncoder,
};

lazy_static! {
    // ========== Allocation Metrics ==========

    /// Claim attempts by outcome
    pub static ref CLAIMS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "claims_total",
        "Claim attempts by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Accounts stocked via batch add
    pub static ref ACCOUNTS_ADDED_TOTAL: IntCounter = register_int_counter!(
        "accounts_added_total",
        "Accounts added to stock"
    )
    .unwrap();

    /// Accounts retired by the expiry sweep
    pub static ref ACCOUNTS_EXPIRED_TOTAL: IntCounter = register_int_counter!(
        "accounts_expired_total",
        "Accounts marked expired by the sweep"
    )
    .unwrap();

    /// Available stock per category
    pub static ref STOCK_AVAILABLE: IntGaugeVec = register_int_gauge_vec!(
        "stock_available",
        "Claimable accounts per category",
        &["category"]
    )
    .unwrap();

    // ========== Bot Metrics ==========

    /// Chat commands dispatched by command name
    pub static ref COMMANDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "commands_total",
        "Chat commands dispatched",
        &["command"]
    )
    .unwrap();

    // ========== HTTP Metrics ==========

    /// Requests served, by method, path and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "HTTP requests served",
        &["method", "path", "status"]
    )
    .unwrap();

    /// Request latency histogram
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latency in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // ========== Session Metrics ==========

    /// Dashboard sessions currently valid
    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Dashboard sessions currently valid"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Job runs by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Background job runs",
        &["job_type", "status"]
    )
    .unwrap();

    /// Job runtime histogram
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job runtime in seconds",
        &["job_type"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .unwrap();

    // ========== System Metrics ==========

    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Seconds since the server started"
    )
    .unwrap();
}

/// Encode the whole registry in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a claim attempt outcome
pub fn record_claim(outcome: &str) {
    CLAIMS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record accounts added to stock
pub fn record_accounts_added(count: u64) {
    ACCOUNTS_ADDED_TOTAL.inc_by(count);
}

/// Record accounts retired by the expiry sweep
pub fn record_accounts_expired(count: u64) {
    ACCOUNTS_EXPIRED_TOTAL.inc_by(count);
}

/// Update the available-stock gauge for a category
pub fn set_stock_available(category: &str, count: i64) {
    STOCK_AVAILABLE.with_label_values(&[category]).set(count);
}

/// Record a chat command dispatch
pub fn record_command(command: &str) {
    COMMANDS_TOTAL.with_label_values(&[command]).inc();
}

/// Record one served HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record one background job run
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_claim_outcomes() {
        record_claim("success");
        record_claim("exhausted");
        record_claim("cooldown");
        let metrics = render_metrics();
        assert!(metrics.contains("claims_total"));
        assert!(metrics.contains("outcome=\"success\""));
        assert!(metrics.contains("outcome=\"exhausted\""));
    }

    #[test]
    fn test_record_accounts_added() {
        record_accounts_added(25);
        let metrics = render_metrics();
        assert!(metrics.contains("accounts_added_total"));
    }

    #[test]
    fn test_stock_gauge_tracks_latest_value() {
        set_stock_available("netflix", 42);
        set_stock_available("netflix", 41);
        assert_eq!(STOCK_AVAILABLE.with_label_values(&["netflix"]).get(), 41);
    }

    #[test]
    fn test_record_command() {
        record_command("gen");
        record_command("stock");
        let metrics = render_metrics();
        assert!(metrics.contains("commands_total"));
        assert!(metrics.contains("command=\"gen\""));
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/api/categories", 200, 0.05);
        let metrics = render_metrics();
        assert!(metrics.contains("http_requests_total"));
        assert!(metrics.contains("http_request_duration_seconds"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("expiry_sweep", "success", 1.5);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }

    #[test]
    fn test_rendered_output_is_prometheus_text() {
        record_claim("success");
        let metrics = render_metrics();
        assert!(metrics.contains("# HELP"));
        assert!(metrics.contains("# TYPE"));
        assert!(metrics.contains("claims_total"));
    }
}

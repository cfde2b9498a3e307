use prometheus::{
    register_counter, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Counter, Encoder, Histogram, HistogramOpts, HistogramVec,
    IntCounter, IntCounterVec, TextEncoder,
};
use std::time::Duration;

lazy_static::lazy_static! {
    // Request metrics
    static ref HTTP_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of requests by method, status and handler.",
        &["method", "status", "handler"]
    ).expect("http_requests_total is registered once");

    static ref HTTP_LATENCY: HistogramVec = register_histogram_vec!(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "Latency of HTTP requests by method and handler."
        ).buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["method", "handler"]
    ).expect("http_request_duration_seconds is registered once");

    // Model metrics
    static ref INFERENCE_TIME: Histogram = register_histogram!(
        HistogramOpts::new("inference_time_seconds", "Time taken for inference")
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5])
    ).expect("inference_time_seconds is registered once");

    static ref CONFIDENCE_SCORE_SUM: Counter = register_counter!(
        "confidence_score_sum",
        "Sum of confidence scores"
    ).expect("confidence_score_sum is registered once");

    static ref CONFIDENCE_SCORE_COUNT: IntCounter = register_int_counter!(
        "confidence_score_count",
        "Count of confidence scores"
    ).expect("confidence_score_count is registered once");
}

/// Records one served HTTP request. Statuses are grouped by class (`2xx`).
pub fn observe_request(method: &str, handler: &str, status: u16, elapsed: Duration) {
    let status_class = format!("{}xx", status / 100);
    HTTP_REQUESTS
        .with_label_values(&[method, status_class.as_str(), handler])
        .inc();
    HTTP_LATENCY
        .with_label_values(&[method, handler])
        .observe(elapsed.as_secs_f64());
}

/// Records one successful model call.
pub fn observe_inference(elapsed: Duration, confidence: f64) {
    INFERENCE_TIME.observe(elapsed.as_secs_f64());
    CONFIDENCE_SCORE_SUM.inc_by(confidence);
    CONFIDENCE_SCORE_COUNT.inc();
}

// Export metrics in Prometheus text format
pub fn export() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}

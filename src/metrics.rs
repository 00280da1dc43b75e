use std::time::Duration;

use prometheus::{
    opts, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

use crate::models::{AdapterKind, BackendResult};

#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    request_total: IntCounterVec,
    request_duration_seconds: HistogramVec,
    inflight_requests: IntGauge,
    backend_attempts_total: IntCounterVec,
    resolutions_total: IntCounterVec,
    tokens_generated_total: IntCounter,
}

pub struct InflightGuard<'a> {
    metrics: &'a AppMetrics,
}

impl AppMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let request_total = IntCounterVec::new(
            opts!(
                "webllm_http_requests_total",
                "Total HTTP requests processed"
            ),
            &["path", "method", "status"],
        )
        .expect("valid request_total metric");

        let request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "webllm_http_request_duration_seconds",
                "HTTP request latency in seconds",
            ),
            &["path", "method"],
        )
        .expect("valid request_duration_seconds metric");

        let inflight_requests =
            IntGauge::new("webllm_inflight_requests", "Current in-flight requests")
                .expect("valid inflight_requests metric");

        let backend_attempts_total = IntCounterVec::new(
            opts!(
                "webllm_backend_attempts_total",
                "Adapter attempts by adapter and outcome"
            ),
            &["adapter", "outcome"],
        )
        .expect("valid backend_attempts_total metric");

        let resolutions_total = IntCounterVec::new(
            opts!(
                "webllm_resolutions_total",
                "Resolved inferences by the adapter that answered"
            ),
            &["served_by"],
        )
        .expect("valid resolutions_total metric");

        let tokens_generated_total = IntCounter::new(
            "webllm_tokens_generated_total",
            "Approximate generated tokens (word-count estimate)",
        )
        .expect("valid tokens_generated_total metric");

        registry
            .register(Box::new(request_total.clone()))
            .expect("register request_total");
        registry
            .register(Box::new(request_duration_seconds.clone()))
            .expect("register request_duration_seconds");
        registry
            .register(Box::new(inflight_requests.clone()))
            .expect("register inflight_requests");
        registry
            .register(Box::new(backend_attempts_total.clone()))
            .expect("register backend_attempts_total");
        registry
            .register(Box::new(resolutions_total.clone()))
            .expect("register resolutions_total");
        registry
            .register(Box::new(tokens_generated_total.clone()))
            .expect("register tokens_generated_total");

        Self {
            registry,
            request_total,
            request_duration_seconds,
            inflight_requests,
            backend_attempts_total,
            resolutions_total,
            tokens_generated_total,
        }
    }

    pub fn inflight_guard(&self) -> InflightGuard<'_> {
        self.inflight_requests.inc();
        InflightGuard { metrics: self }
    }

    pub fn observe_request(&self, path: &str, method: &str, status: u16, duration: Duration) {
        let status_label = status.to_string();
        self.request_total
            .with_label_values(&[path, method, &status_label])
            .inc();
        self.request_duration_seconds
            .with_label_values(&[path, method])
            .observe(duration.as_secs_f64());
    }

    pub fn observe_attempt(&self, adapter: AdapterKind, result: &BackendResult) {
        let outcome = result.failure_kind().map_or("success", |kind| kind.as_str());
        self.backend_attempts_total
            .with_label_values(&[adapter.as_str(), outcome])
            .inc();
    }

    pub fn observe_resolution(&self, served_by: AdapterKind, tokens: u32) {
        self.resolutions_total
            .with_label_values(&[served_by.as_str()])
            .inc();
        self.tokens_generated_total.inc_by(tokens as u64);
    }

    pub fn render(&self) -> Result<String, String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|error| error.to_string())?;
        String::from_utf8(buffer).map_err(|error| error.to_string())
    }
}

impl Default for AppMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        self.metrics.inflight_requests.dec();
    }
}

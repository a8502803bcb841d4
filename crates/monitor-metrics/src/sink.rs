//! Probe metrics sink backed by a private Prometheus registry.

use prometheus::proto::{Metric, MetricFamily};
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tracing::debug;

use crate::error::MetricsResult;

pub const LABEL_CODE: &str = "code";
pub const LABEL_ENDPOINT: &str = "endpoint";

const NUM_REQUESTS: &str = "num_requests";
const RESPONSE_TIME: &str = "response_time";
const NUM_ACTIVE_REQUESTS: &str = "num_active_requests";

/// Counters, latency histogram, and in-flight gauge for endpoint probes.
///
/// Construct once at startup and share behind an `Arc` between the probe
/// loop (writer) and the scrape handler (reader).
#[derive(Clone)]
pub struct ProbeMetrics {
    registry: Registry,
    num_requests: IntCounterVec,
    response_time: HistogramVec,
    num_active_requests: IntGaugeVec,
}

impl ProbeMetrics {
    pub fn new() -> MetricsResult<Self> {
        let registry = Registry::new();

        let num_requests = IntCounterVec::new(
            Opts::new(
                NUM_REQUESTS,
                "Total number of HTTP requests by status code and endpoint.",
            ),
            &[LABEL_CODE, LABEL_ENDPOINT],
        )?;
        registry.register(Box::new(num_requests.clone()))?;

        let response_time = HistogramVec::new(
            HistogramOpts::new(
                RESPONSE_TIME,
                "A histogram based on the response time by status code and endpoint.",
            ),
            &[LABEL_CODE, LABEL_ENDPOINT],
        )?;
        registry.register(Box::new(response_time.clone()))?;

        let num_active_requests = IntGaugeVec::new(
            Opts::new(
                NUM_ACTIVE_REQUESTS,
                "Total number of active HTTP requests by endpoint.",
            ),
            &[LABEL_ENDPOINT],
        )?;
        registry.register(Box::new(num_active_requests.clone()))?;

        Ok(Self {
            registry,
            num_requests,
            response_time,
            num_active_requests,
        })
    }

    pub fn inc_requests(&self, code: &str, endpoint: &str) {
        self.num_requests
            .with_label_values(&[code, endpoint])
            .inc();
    }

    pub fn observe_response_time(&self, code: &str, endpoint: &str, seconds: f64) {
        self.response_time
            .with_label_values(&[code, endpoint])
            .observe(seconds);
    }

    pub fn inc_active(&self, endpoint: &str) {
        self.num_active_requests.with_label_values(&[endpoint]).inc();
    }

    pub fn dec_active(&self, endpoint: &str) {
        self.num_active_requests.with_label_values(&[endpoint]).dec();
    }

    /// Increment the in-flight gauge and return a guard that decrements
    /// it when dropped, on every exit path.
    pub fn active_guard(&self, endpoint: &str) -> ActiveProbeGuard {
        let gauge = self.num_active_requests.with_label_values(&[endpoint]);
        gauge.inc();
        ActiveProbeGuard { gauge }
    }

    /// Render every family in the Prometheus text exposition format.
    pub fn render(&self) -> MetricsResult<String> {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        debug!(families = families.len(), bytes = buffer.len(), "metrics rendered");
        Ok(String::from_utf8(buffer)?)
    }

    /// Number of probes counted under `(code, endpoint)`. Zero if unseen.
    pub fn request_count(&self, code: &str, endpoint: &str) -> u64 {
        self.find(NUM_REQUESTS, &[(LABEL_CODE, code), (LABEL_ENDPOINT, endpoint)])
            .map(|m| m.get_counter().get_value() as u64)
            .unwrap_or(0)
    }

    /// Number of response-time samples under `(code, endpoint)`.
    pub fn response_time_count(&self, code: &str, endpoint: &str) -> u64 {
        self.find(RESPONSE_TIME, &[(LABEL_CODE, code), (LABEL_ENDPOINT, endpoint)])
            .map(|m| m.get_histogram().get_sample_count())
            .unwrap_or(0)
    }

    /// Sum of response-time samples (seconds) under `(code, endpoint)`.
    pub fn response_time_sum(&self, code: &str, endpoint: &str) -> f64 {
        self.find(RESPONSE_TIME, &[(LABEL_CODE, code), (LABEL_ENDPOINT, endpoint)])
            .map(|m| m.get_histogram().get_sample_sum())
            .unwrap_or(0.0)
    }

    /// Current in-flight probes for an endpoint.
    pub fn active_requests(&self, endpoint: &str) -> i64 {
        self.find(NUM_ACTIVE_REQUESTS, &[(LABEL_ENDPOINT, endpoint)])
            .map(|m| m.get_gauge().get_value() as i64)
            .unwrap_or(0)
    }

    /// Every code label that has been counted for an endpoint, sorted.
    pub fn request_codes(&self, endpoint: &str) -> Vec<String> {
        let mut codes: Vec<String> = self
            .family(NUM_REQUESTS)
            .map(|family| {
                family
                    .get_metric()
                    .iter()
                    .filter(|m| label_value(m, LABEL_ENDPOINT) == Some(endpoint))
                    .filter_map(|m| label_value(m, LABEL_CODE).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        codes.sort();
        codes
    }

    fn family(&self, name: &str) -> Option<MetricFamily> {
        self.registry
            .gather()
            .into_iter()
            .find(|family| family.get_name() == name)
    }

    fn find(&self, name: &str, labels: &[(&str, &str)]) -> Option<Metric> {
        let family = self.family(name)?;
        family
            .get_metric()
            .iter()
            .find(|m| {
                labels
                    .iter()
                    .all(|(key, value)| label_value(m, key) == Some(*value))
            })
            .cloned()
    }
}

fn label_value<'a>(metric: &'a Metric, name: &str) -> Option<&'a str> {
    metric
        .get_label()
        .iter()
        .find(|pair| pair.get_name() == name)
        .map(|pair| pair.get_value())
}

/// Decrements the endpoint's in-flight gauge when dropped.
#[must_use = "the in-flight gauge is decremented as soon as the guard is dropped"]
pub struct ActiveProbeGuard {
    gauge: IntGauge,
}

impl Drop for ActiveProbeGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

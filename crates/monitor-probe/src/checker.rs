//! Probe execution and status classification.
//!
//! `ProbeService::check_status` performs one bounded GET against the
//! target, resolves the outcome to a status label, and records exactly one
//! sample in the metrics sink. It never fails: every error is logged and
//! folded into the classification.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use monitor_annotations::{Annotation, AnnotationSink};
use monitor_metrics::ProbeMetrics;

use crate::scheduler::instant_after;

/// Synthetic status recorded when the probe's own deadline expires
/// (the "client closed request" convention).
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Label recorded when the transaction failed without any HTTP status.
pub const NO_STATUS_CODE: &str = "no status code";

/// Monotonic "now", injected so elapsed-time measurement is testable.
pub type TimeProvider = Arc<dyn Fn() -> std::time::Instant + Send + Sync>;

/// The real monotonic clock.
pub fn system_time_provider() -> TimeProvider {
    Arc::new(std::time::Instant::now)
}

/// Resolved outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A response head was received with this status.
    Response(u16),
    /// The probe deadline expired before a response arrived.
    ClientTimeout,
    /// The transaction failed (DNS, refused, TLS, bad URL) with no response.
    NoStatus,
}

impl ProbeOutcome {
    /// Apply the classification precedence: an expired deadline wins over
    /// everything, then a received status, then the sentinel.
    pub fn resolve(deadline_exceeded: bool, status: Option<u16>) -> Self {
        if deadline_exceeded {
            return Self::ClientTimeout;
        }
        match status {
            Some(code) => Self::Response(code),
            None => Self::NoStatus,
        }
    }

    /// Value of the `code` metric label.
    pub fn label(&self) -> String {
        self.to_string()
    }

    /// 2xx and 3xx responses count as success.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Response(code) if (200..400).contains(code))
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response(code) => write!(f, "{code}"),
            Self::ClientTimeout => write!(f, "{CLIENT_CLOSED_REQUEST}"),
            Self::NoStatus => f.write_str(NO_STATUS_CODE),
        }
    }
}

/// Runs probes against a target and records them in the metrics sink.
pub struct ProbeService {
    metrics: Arc<ProbeMetrics>,
    client: reqwest::Client,
    timeout: Duration,
    time_provider: TimeProvider,
    annotations: Option<Arc<dyn AnnotationSink>>,
}

impl ProbeService {
    pub fn new(
        metrics: Arc<ProbeMetrics>,
        client: reqwest::Client,
        timeout: Duration,
        time_provider: TimeProvider,
    ) -> Self {
        Self {
            metrics,
            client,
            timeout,
            time_provider,
            annotations: None,
        }
    }

    /// Post a timeline annotation for every failed probe.
    pub fn with_annotations(mut self, sink: Arc<dyn AnnotationSink>) -> Self {
        self.annotations = Some(sink);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Probe `url` once, bounded by the configured timeout and by
    /// `parent_deadline` if one is given.
    pub async fn check_status(&self, parent_deadline: Option<Instant>, url: &str) -> ProbeOutcome {
        let issued = Instant::now();
        let deadline = bounded_deadline(parent_deadline, self.timeout);
        let active = self.metrics.active_guard(url);

        let start = (self.time_provider)();
        let result = tokio::time::timeout_at(deadline, self.client.get(url).send()).await;

        let (outcome, response) = match result {
            Err(_elapsed) => {
                error!(
                    endpoint = %url,
                    deadline_ms = millis(deadline.saturating_duration_since(issued)),
                    parent_deadline_fired = parent_deadline.is_some_and(|p| p == deadline),
                    "timeout, client closed request"
                );
                (ProbeOutcome::resolve(true, None), None)
            }
            Ok(Err(e)) => {
                if e.is_timeout() {
                    error!(endpoint = %url, error = %e, "timeout, client closed request");
                } else {
                    error!(endpoint = %url, error = %e, "probe request failed");
                }
                (ProbeOutcome::resolve(e.is_timeout(), None), None)
            }
            Ok(Ok(resp)) => {
                let status = resp.status().as_u16();
                (ProbeOutcome::resolve(false, Some(status)), Some(resp))
            }
        };

        let elapsed = (self.time_provider)().saturating_duration_since(start);
        let label = outcome.label();
        self.metrics
            .observe_response_time(&label, url, elapsed.as_secs_f64());
        self.metrics.inc_requests(&label, url);

        debug!(
            endpoint = %url,
            code = %label,
            elapsed_ms = millis(elapsed),
            "probe completed"
        );

        // Gauge first, then release the connection.
        drop(active);
        drop(response);

        if !outcome.is_success() {
            self.annotate_failure(url, &label);
        }

        outcome
    }

    fn annotate_failure(&self, url: &str, label: &str) {
        let Some(sink) = self.annotations.clone() else {
            return;
        };
        let annotation = Annotation::new(
            format!("probe {url} failed: {label}"),
            vec!["probe".to_string(), label.to_string()],
        );
        let endpoint = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = sink.create_annotation(annotation).await {
                warn!(%endpoint, error = %e, "failed to annotate probe failure");
            }
        });
    }
}

/// The earlier of `now + timeout` and the parent's deadline.
fn bounded_deadline(parent_deadline: Option<Instant>, timeout: Duration) -> Instant {
    let own = instant_after(timeout);
    match parent_deadline {
        Some(parent) if parent < own => parent,
        _ => own,
    }
}

/// Whole milliseconds for log fields, saturating.
pub(crate) fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::get;
    use monitor_annotations::InMemoryAnnotations;

    /// `GET /?statusCode=xyz` answers with status xyz.
    async fn echo_status(Query(params): Query<HashMap<String, String>>) -> (StatusCode, &'static str) {
        let code = params
            .get("statusCode")
            .and_then(|c| c.parse::<u16>().ok())
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::BAD_REQUEST);
        (code, "Hello, client\n")
    }

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_millis(50)).await;
        "Hello, I'm slow\n"
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn echo_server() -> String {
        serve(Router::new().route("/", get(echo_status))).await
    }

    async fn slow_server() -> String {
        serve(Router::new().route("/", get(slow))).await
    }

    /// An address nothing listens on.
    async fn closed_port() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/")
    }

    fn service(metrics: &Arc<ProbeMetrics>, timeout: Duration) -> ProbeService {
        ProbeService::new(
            metrics.clone(),
            reqwest::Client::new(),
            timeout,
            system_time_provider(),
        )
    }

    /// Each call advances the clock by `step`.
    fn stepping_clock(step: Duration) -> TimeProvider {
        let base = std::time::Instant::now();
        let calls = Arc::new(AtomicU64::new(0));
        Arc::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) as u32;
            base + step * n
        })
    }

    #[test]
    fn labels() {
        assert_eq!(ProbeOutcome::Response(200).label(), "200");
        assert_eq!(ProbeOutcome::Response(503).label(), "503");
        assert_eq!(ProbeOutcome::ClientTimeout.label(), "499");
        assert_eq!(ProbeOutcome::NoStatus.label(), "no status code");
    }

    #[test]
    fn resolve_precedence() {
        assert_eq!(ProbeOutcome::resolve(true, Some(200)), ProbeOutcome::ClientTimeout);
        assert_eq!(ProbeOutcome::resolve(true, None), ProbeOutcome::ClientTimeout);
        assert_eq!(ProbeOutcome::resolve(false, Some(404)), ProbeOutcome::Response(404));
        assert_eq!(ProbeOutcome::resolve(false, None), ProbeOutcome::NoStatus);
    }

    #[test]
    fn success_is_2xx_and_3xx() {
        assert!(ProbeOutcome::Response(200).is_success());
        assert!(ProbeOutcome::Response(301).is_success());
        assert!(!ProbeOutcome::Response(404).is_success());
        assert!(!ProbeOutcome::Response(500).is_success());
        assert!(!ProbeOutcome::ClientTimeout.is_success());
        assert!(!ProbeOutcome::NoStatus.is_success());
    }

    #[tokio::test]
    async fn bounded_deadline_prefers_earlier_parent() {
        let parent = Instant::now() + Duration::from_millis(5);
        assert_eq!(bounded_deadline(Some(parent), Duration::from_secs(60)), parent);

        let late_parent = Instant::now() + Duration::from_secs(3600);
        assert!(bounded_deadline(Some(late_parent), Duration::from_secs(1)) < late_parent);
    }

    #[tokio::test]
    async fn bounded_deadline_tolerates_huge_timeout() {
        let own = bounded_deadline(None, Duration::from_secs(u64::MAX));
        assert!(own > Instant::now() + Duration::from_secs(86_400 * 365));

        let parent = Instant::now() + Duration::from_millis(5);
        assert_eq!(bounded_deadline(Some(parent), Duration::MAX), parent);
    }

    #[tokio::test]
    async fn huge_timeout_still_records_response() {
        let base = echo_server().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = service(&metrics, Duration::from_secs(u64::MAX));

        let url = format!("{base}/?statusCode=204");
        assert_eq!(svc.check_status(None, &url).await, ProbeOutcome::Response(204));
        assert_eq!(metrics.request_count("204", &url), 1);
        assert_eq!(metrics.active_requests(&url), 0);
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn aggregates_metrics_by_status_code() {
        let base = echo_server().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = service(&metrics, Duration::from_secs(60));

        let ok_url = format!("{base}/?statusCode=200");
        for _ in 0..4 {
            assert_eq!(svc.check_status(None, &ok_url).await, ProbeOutcome::Response(200));
        }

        let err_url = format!("{base}/?statusCode=500");
        for _ in 0..2 {
            assert_eq!(svc.check_status(None, &err_url).await, ProbeOutcome::Response(500));
        }

        assert_eq!(metrics.request_count("200", &ok_url), 4);
        assert_eq!(metrics.request_codes(&ok_url), vec!["200"]);
        assert_eq!(metrics.request_count("500", &err_url), 2);
        assert_eq!(metrics.request_codes(&err_url), vec!["500"]);
        assert_eq!(metrics.response_time_count("200", &ok_url), 4);
    }

    #[tokio::test]
    async fn records_499_when_client_times_out() {
        let url = slow_server().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        // 10ms timeout against a 50ms handler.
        let svc = service(&metrics, Duration::from_millis(10));

        let outcome = svc.check_status(None, &url).await;
        assert_eq!(outcome, ProbeOutcome::ClientTimeout);
        assert_eq!(metrics.request_count("499", &url), 1);
        assert_eq!(metrics.response_time_count("499", &url), 1);
        assert_eq!(metrics.request_codes(&url), vec!["499"]);
    }

    #[tokio::test]
    async fn parent_deadline_bounds_the_probe() {
        let url = slow_server().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = service(&metrics, Duration::from_secs(60));

        let parent = Instant::now() + Duration::from_millis(10);
        assert_eq!(svc.check_status(Some(parent), &url).await, ProbeOutcome::ClientTimeout);
        assert_eq!(metrics.request_count("499", &url), 1);
    }

    #[tokio::test]
    async fn connection_refused_records_sentinel() {
        let url = closed_port().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = service(&metrics, Duration::from_secs(5));

        assert_eq!(svc.check_status(None, &url).await, ProbeOutcome::NoStatus);
        assert_eq!(metrics.request_count("no status code", &url), 1);
        assert_eq!(metrics.request_codes(&url), vec!["no status code"]);
    }

    #[tokio::test]
    async fn invalid_url_is_counted_once() {
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = service(&metrics, Duration::from_secs(5));

        assert_eq!(svc.check_status(None, "not a url").await, ProbeOutcome::NoStatus);
        assert_eq!(metrics.request_count("no status code", "not a url"), 1);
        assert_eq!(metrics.active_requests("not a url"), 0);
    }

    #[tokio::test]
    async fn active_gauge_returns_to_zero_for_every_outcome() {
        let base = echo_server().await;
        let slow = slow_server().await;
        let refused = closed_port().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = service(&metrics, Duration::from_millis(20));

        for url in [format!("{base}/?statusCode=204"), slow, refused] {
            svc.check_status(None, &url).await;
            assert_eq!(metrics.active_requests(&url), 0, "gauge leaked for {url}");
        }
    }

    #[tokio::test]
    async fn elapsed_time_comes_from_time_provider() {
        let base = echo_server().await;
        let url = format!("{base}/?statusCode=200");
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let svc = ProbeService::new(
            metrics.clone(),
            reqwest::Client::new(),
            Duration::from_secs(5),
            stepping_clock(Duration::from_millis(250)),
        );

        svc.check_status(None, &url).await;
        let sum = metrics.response_time_sum("200", &url);
        assert!((sum - 0.25).abs() < 1e-9, "sum was {sum}");
    }

    #[tokio::test]
    async fn failed_probe_posts_annotation() {
        let base = echo_server().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let sink = Arc::new(InMemoryAnnotations::new());
        let svc = service(&metrics, Duration::from_secs(5)).with_annotations(sink.clone());

        svc.check_status(None, &format!("{base}/?statusCode=200")).await;
        let failing = format!("{base}/?statusCode=503");
        svc.check_status(None, &failing).await;

        tokio::time::timeout(Duration::from_secs(5), sink.wait_for(1))
            .await
            .expect("annotation never posted");
        let annotations = sink.annotations();
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].text, format!("probe {failing} failed: 503"));
        assert_eq!(annotations[0].tags, vec!["probe", "503"]);
    }

    #[tokio::test]
    async fn annotation_failure_does_not_touch_metrics() {
        let url = closed_port().await;
        let metrics = Arc::new(ProbeMetrics::new().unwrap());
        let sink = Arc::new(InMemoryAnnotations::failing(500));
        let svc = service(&metrics, Duration::from_secs(5)).with_annotations(sink.clone());

        assert_eq!(svc.check_status(None, &url).await, ProbeOutcome::NoStatus);
        tokio::time::timeout(Duration::from_secs(5), sink.wait_for(1))
            .await
            .expect("annotation never attempted");

        assert_eq!(metrics.request_codes(&url), vec!["no status code"]);
        assert_eq!(metrics.request_count("no status code", &url), 1);
    }
}

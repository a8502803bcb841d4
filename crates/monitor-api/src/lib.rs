//! monitor-api — HTTP surface of the endpoint monitor.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/metrics` | Prometheus exposition of probe metrics |
//! | POST | `/exec` | Run an allow-listed command and annotate it |

pub mod handlers;

use std::collections::HashSet;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use monitor_annotations::AnnotationSink;
use monitor_metrics::ProbeMetrics;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub metrics: Arc<ProbeMetrics>,
    pub annotations: Arc<dyn AnnotationSink>,
    /// Programs `/exec` may run. Empty rejects every request.
    pub exec_allowed: Arc<HashSet<String>>,
}

impl ApiState {
    pub fn new(
        metrics: Arc<ProbeMetrics>,
        annotations: Arc<dyn AnnotationSink>,
        exec_allowed: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            metrics,
            annotations,
            exec_allowed: Arc::new(exec_allowed.into_iter().collect()),
        }
    }
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/exec", post(handlers::exec_command))
        .with_state(state)
}

//! HTTP handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tokio::process::Command;
use tracing::{error, info, warn};

use monitor_annotations::Annotation;

use crate::ApiState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const PROMETHEUS_TEXT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Error body for consistent API format.
#[derive(serde::Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorBody {
            success: false,
            error: msg.to_string(),
        }),
    )
        .into_response()
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, [("content-type", PROMETHEUS_TEXT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "failed to render metrics");
            error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

// ── Exec ───────────────────────────────────────────────────────

/// Exec request body.
#[derive(Debug, serde::Deserialize)]
pub struct ExecRequest {
    /// Program to run, without arguments.
    pub command: String,
}

/// POST /exec
///
/// Runs an allow-listed program, records an annotation, and returns the
/// program's stdout followed by its stderr.
pub async fn exec_command(State(state): State<ApiState>, body: Bytes) -> Response {
    let req: ExecRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => return error_response(&e.to_string(), StatusCode::BAD_REQUEST),
    };

    if !state.exec_allowed.contains(&req.command) {
        warn!(command = %req.command, "exec rejected, command not allowed");
        return error_response("command not allowed", StatusCode::FORBIDDEN);
    }

    let output = match Command::new(&req.command).kill_on_drop(true).output().await {
        Ok(output) => output,
        Err(e) => {
            error!(command = %req.command, error = %e, "exec failed to start");
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    if !output.status.success() {
        warn!(command = %req.command, status = %output.status, "exec exited unsuccessfully");
        return error_response(&output.status.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    let annotation = Annotation::new(
        format!("executed command {}", req.command),
        vec!["exec".to_string(), req.command.clone()],
    );
    if let Err(e) = state.annotations.create_annotation(annotation).await {
        error!(command = %req.command, error = %e, "failed to annotate exec");
        return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    info!(command = %req.command, "exec completed");

    let mut combined = output.stdout;
    combined.extend_from_slice(&output.stderr);
    (StatusCode::OK, [("content-type", TEXT_PLAIN)], combined).into_response()
}

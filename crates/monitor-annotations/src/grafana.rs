//! Grafana HTTP annotations client.
//!
//! Posts to `POST <host>/api/annotations` with a bearer token. Anything
//! other than `200 OK` is reported as `AnnotationError::InvalidStatus`.

use std::time::UNIX_EPOCH;

use serde::Serialize;
use tracing::{debug, info};

use monitor_core::GrafanaConfig;

use crate::annotation::{Annotation, AnnotationSink, BoxFuture};
use crate::error::{AnnotationError, AnnotationResult};

/// Wire body of a Grafana create-annotation request.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CreateAnnotationRequest {
    /// Unix epoch in milliseconds.
    pub time: i64,
    pub tags: Vec<String>,
    pub text: String,
}

impl From<&Annotation> for CreateAnnotationRequest {
    fn from(annotation: &Annotation) -> Self {
        let millis = annotation
            .time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            time: i64::try_from(millis).unwrap_or(i64::MAX),
            tags: annotation.tags.clone(),
            text: annotation.text.clone(),
        }
    }
}

pub struct GrafanaAnnotations {
    config: GrafanaConfig,
    client: reqwest::Client,
}

impl GrafanaAnnotations {
    pub fn new(config: GrafanaConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    fn endpoint(&self) -> String {
        format!("{}/api/annotations", self.config.host.trim_end_matches('/'))
    }

    async fn post(&self, annotation: Annotation) -> AnnotationResult<()> {
        info!(text = %annotation.text, "creating annotation in grafana");

        let body = CreateAnnotationRequest::from(&annotation);
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AnnotationError::InvalidStatus(status.as_u16()));
        }

        debug!(tags = ?body.tags, "annotation created");
        Ok(())
    }
}

impl AnnotationSink for GrafanaAnnotations {
    fn create_annotation(&self, annotation: Annotation) -> BoxFuture<'_, AnnotationResult<()>> {
        Box::pin(self.post(annotation))
    }
}

//! Annotation model and the sink abstraction.

use std::sync::Mutex;
use std::time::SystemTime;

use tokio::sync::Notify;

use crate::error::{AnnotationError, AnnotationResult};

pub type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// A point-in-time event on the dashboard timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub text: String,
    pub time: SystemTime,
    pub tags: Vec<String>,
}

impl Annotation {
    pub fn new(text: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            text: text.into(),
            time: SystemTime::now(),
            tags,
        }
    }
}

/// Destination for annotations.
pub trait AnnotationSink: Send + Sync {
    fn create_annotation(&self, annotation: Annotation) -> BoxFuture<'_, AnnotationResult<()>>;
}

/// Keeps annotations in memory. Optionally rejects every call.
#[derive(Debug, Default)]
pub struct InMemoryAnnotations {
    annotations: Mutex<Vec<Annotation>>,
    fail_with: Option<u16>,
    notify: Notify,
}

impl InMemoryAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that answers every call with `InvalidStatus(status)`.
    /// Rejected annotations are still recorded.
    pub fn failing(status: u16) -> Self {
        Self {
            fail_with: Some(status),
            ..Self::default()
        }
    }

    pub fn annotations(&self) -> Vec<Annotation> {
        self.lock().clone()
    }

    /// Wait until at least `count` annotations have arrived.
    pub async fn wait_for(&self, count: usize) {
        loop {
            let notified = self.notify.notified();
            if self.lock().len() >= count {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Annotation>> {
        self.annotations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl AnnotationSink for InMemoryAnnotations {
    fn create_annotation(&self, annotation: Annotation) -> BoxFuture<'_, AnnotationResult<()>> {
        Box::pin(async move {
            self.lock().push(annotation);
            self.notify.notify_waiters();
            match self.fail_with {
                Some(status) => Err(AnnotationError::InvalidStatus(status)),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn in_memory_records_annotations() {
        let sink = InMemoryAnnotations::new();
        sink.create_annotation(Annotation::new("deploy", vec!["release".to_string()]))
            .await
            .unwrap();

        let stored = sink.annotations();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].text, "deploy");
        assert_eq!(stored[0].tags, vec!["release"]);
    }

    #[tokio::test]
    async fn failing_sink_returns_status() {
        let sink = InMemoryAnnotations::failing(503);
        let err = sink
            .create_annotation(Annotation::new("x", Vec::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidStatus(503)));
        assert_eq!(sink.annotations().len(), 1);
    }

    #[tokio::test]
    async fn wait_for_wakes_on_arrival() {
        let sink = Arc::new(InMemoryAnnotations::new());
        let writer = sink.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let _ = writer
                .create_annotation(Annotation::new("late", Vec::new()))
                .await;
        });

        tokio::time::timeout(Duration::from_secs(5), sink.wait_for(1))
            .await
            .expect("annotation never arrived");
    }
}

//! monitor-annotations — timeline annotations for probe failures and
//! administrative actions.
//!
//! Callers hold an `Arc<dyn AnnotationSink>`; the daemon wires in
//! `GrafanaAnnotations`, tests use `InMemoryAnnotations`.

pub mod annotation;
pub mod error;
pub mod grafana;

pub use annotation::{Annotation, AnnotationSink, BoxFuture, InMemoryAnnotations};
pub use error::{AnnotationError, AnnotationResult};
pub use grafana::GrafanaAnnotations;

//! Annotation error types.

use thiserror::Error;

pub type AnnotationResult<T> = Result<T, AnnotationError>;

#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("annotation request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),
}

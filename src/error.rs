use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Request-level error taxonomy.
///
/// Only validation and backend-class failures reach the caller as HTTP
/// statuses. Enrichment-stage failures (live-data fetch, validation
/// expression, template render) are absorbed where they occur and show up
/// as absent fields or filtered-out candidates, never as an error response.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required request field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The embedding backend returned no vector for an interactive query.
    #[error("Failed to generate embedding(s)")]
    EmbeddingUnavailable,

    /// A backend was selected that has no configuration (e.g. fine-tuned
    /// embeddings requested while the fine-tuned endpoint is unset).
    #[error("embedding backend not configured: {0}")]
    EmbeddingNotConfigured(&'static str),

    /// The search index was unreachable or rejected the query.
    #[error("search backend failure: {0}")]
    Backend(String),

    /// PCA refinement was requested with fewer than two usable vectors.
    #[error("Insufficient embedding vectors for PCA")]
    InsufficientSamples,

    #[error("not found")]
    NotFound,

    /// Programming-level faults (vector dimension mismatches and the
    /// like); should not occur with a consistent index schema.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::InsufficientSamples => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EmbeddingUnavailable
            | ApiError::EmbeddingNotConfigured(_)
            | ApiError::Backend(_)
            | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed: {self}");
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ApiError::Validation("Query cannot be empty".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::InsufficientSamples.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::EmbeddingUnavailable.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Backend("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_insufficient_samples_message_is_stable() {
        // Clients match on this text.
        assert_eq!(
            ApiError::InsufficientSamples.to_string(),
            "Insufficient embedding vectors for PCA"
        );
    }
}

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use decision_qa::QaError;

/// A stage error on its way out of the server. Only validation messages are
/// echoed; everything else is reduced to its kind.
pub struct ApiError(pub QaError);

impl From<QaError> for ApiError {
    fn from(err: QaError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            QaError::UpstreamTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            QaError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            QaError::Validation(_) | QaError::AmbiguousInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            QaError::Validation(msg) | QaError::AmbiguousInput(msg) => msg.clone(),
            QaError::UpstreamTimeout { stage, .. } => format!("stage '{}' timed out", stage),
            QaError::UpstreamUnavailable { stage, .. } => format!("stage '{}' is unavailable", stage),
            _ => "internal error".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::warn!(error = %self.0, "Request rejected");
        }

        let body = serde_json::json!({
            "error": self.0.kind(),
            "message": self.message(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_matches_http_stage_client() {
        assert_eq!(
            ApiError(QaError::timeout("compiler", 100)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            ApiError(QaError::unavailable("ranker", "down")).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError(QaError::Validation("empty".into())).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ApiError(QaError::Store("pool closed".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_internal_detail_is_not_echoed() {
        let err = ApiError(QaError::Execution("relation \"secret_table\" does not exist".into()));
        assert_eq!(err.message(), "internal error");

        let err = ApiError(QaError::unavailable("compiler", "connection refused to 10.0.0.4"));
        assert!(!err.message().contains("10.0.0.4"));
    }
}

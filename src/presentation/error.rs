// API errors and their HTTP mapping
use crate::application::chart_service::ChartError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ChartError> for ApiError {
    fn from(err: ChartError) -> Self {
        match err {
            ChartError::UnknownMetric(name) => ApiError::UnknownMetric(name),
            ChartError::Series(e) => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownMetric(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::series::{SeriesError, SeriesKind};

    #[test]
    fn test_status_mapping() {
        let unknown: ApiError = ChartError::UnknownMetric("x".to_string()).into();
        assert_eq!(unknown.into_response().status(), StatusCode::NOT_FOUND);

        let mismatch: ApiError = ChartError::Series(SeriesError::AccumulatorMismatch {
            expected: SeriesKind::Cumulative,
            found: SeriesKind::Simple,
        })
        .into();
        assert_eq!(mismatch.into_response().status(), StatusCode::BAD_REQUEST);

        let internal = ApiError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(
            internal.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

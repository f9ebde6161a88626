use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, FromRequestParts,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use crate::Error;

/// Maps engine errors onto HTTP responses
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

/// JSON body extractor whose failures use the API error body
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Query string extractor whose failures use the API error body
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) | Error::AlreadyWithdrawn(_) | Error::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            e if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        }

        let body = json!({
            "success": false,
            "error": self.0.to_string(),
            "retryable": self.0.is_retryable(),
        });
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError(Error::Validation("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError(Error::Unauthorized("x".into())).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError(Error::forbidden("x")).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError(Error::not_found("x")).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(Error::AlreadyWithdrawn("x".into())).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError(Error::StoreUnavailable(sqlx::Error::PoolTimedOut)).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(ApiError(Error::internal("x")).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

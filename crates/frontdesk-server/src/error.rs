//! API error types with structured JSON responses.
//!
//! Function-call outcomes carry their own bodies. These errors cover the
//! session endpoints and malformed requests.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use frontdesk_core::call::SystemFailureBody;
use frontdesk_core::error::FrontdeskError;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: bool,
    pub code: &'static str,
    pub message: String,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail),
            ApiError::NotFound(detail) => (StatusCode::NOT_FOUND, "NOT_FOUND", detail),
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "[Api] internal error");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(SystemFailureBody::default()),
                )
                    .into_response();
            }
        };

        (
            status,
            Json(ErrorBody {
                error: true,
                code,
                message,
            }),
        )
            .into_response()
    }
}

impl From<FrontdeskError> for ApiError {
    fn from(err: FrontdeskError) -> Self {
        match err {
            FrontdeskError::InvalidInput(message) => ApiError::BadRequest(message),
            FrontdeskError::NotFound { entity_type, id } => {
                ApiError::NotFound(format!("{entity_type} '{id}'"))
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn invalid_input_returns_400() {
        let error: ApiError = FrontdeskError::invalid_input("message content must not be empty").into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["code"], "BAD_REQUEST");
        assert_eq!(json["message"], "message content must not be empty");
    }

    #[tokio::test]
    async fn not_found_returns_404() {
        let error: ApiError = FrontdeskError::not_found("session", "call-1").into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["message"], "session 'call-1'");
    }

    #[tokio::test]
    async fn internal_hides_details() {
        let error: ApiError = FrontdeskError::system("store poisoned").into();
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = json_body(response).await;
        assert_eq!(json["systemError"], true);
        assert!(!json["message"].as_str().unwrap().contains("poisoned"));
    }
}

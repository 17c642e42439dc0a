//! HTTP routes.
//!
//! - `POST /api/function-call`
//! - `POST /api/sessions/:id/messages`
//! - `GET /api/sessions/:id`
//! - `GET /api/health`

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use frontdesk_application::{FunctionCallResponse, InboundMessage, IngestionReport};
use frontdesk_core::call::FunctionCallRequest;
use frontdesk_core::error::FrontdeskError;
use frontdesk_core::session::ConversationState;
use serde::Serialize;

pub const AUTOFILLED_HEADER: &str = "x-frontdesk-autofilled";
pub const EXTRACTED_HEADER: &str = "x-frontdesk-extracted";

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/function-call", post(function_call))
        .route("/sessions/:id", get(session))
        .route("/sessions/:id/messages", post(ingest_message))
        .with_state(state);

    Router::new().nest("/api", api)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
}

/// `GET /api/health`
async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let sessions = state.store.session_ids().await?.len();
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions,
    }))
}

/// `POST /api/function-call`
///
/// 200 with the handler's raw result, 422 for a validation failure, 502 when
/// the handler failed and 500 for anything else.
async fn function_call(
    State(state): State<AppState>,
    payload: Result<Json<FunctionCallRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let cancel = state.shutdown.child_token();
    let response = state.function_calls.execute(request, cancel).await;
    Ok(render(response))
}

fn render(response: FunctionCallResponse) -> Response {
    match response {
        FunctionCallResponse::Success {
            result,
            auto_filled,
            extraction,
        } => {
            let mut headers = HeaderMap::new();
            insert_list(&mut headers, AUTOFILLED_HEADER, &auto_filled);
            if let Some(report) = &extraction {
                insert_list(&mut headers, EXTRACTED_HEADER, &report.filled);
            }
            (StatusCode::OK, headers, Json(result)).into_response()
        }
        FunctionCallResponse::ValidationFailed(body) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(body)).into_response()
        }
        FunctionCallResponse::HandlerFailed(body) => {
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
        FunctionCallResponse::SystemFailed(body) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn insert_list(headers: &mut HeaderMap, name: &'static str, values: &[String]) {
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join(",")) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

/// `POST /api/sessions/:id/messages`
async fn ingest_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<InboundMessage>, JsonRejection>,
) -> Result<Json<IngestionReport>, ApiError> {
    let Json(message) = payload?;
    let report = state.ingestion.ingest(&session_id, message).await?;
    Ok(Json(report))
}

/// `GET /api/sessions/:id`
///
/// Unknown sessions are a 404; reading never creates one.
async fn session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ConversationState>, ApiError> {
    let found = state
        .store
        .find(&session_id)
        .await?
        .ok_or_else(|| FrontdeskError::not_found("session", session_id.as_str()))?;
    Ok(Json(found))
}

//! REST API
//!
//! JSON in and out, camelCase field names. The caller is identified by the
//! [`CALLER_HEADER`](crate::access::CALLER_HEADER) set by the upstream
//! identity provider.

mod admin;
mod agents;
mod error;
mod requests;
mod security_headers;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::access::CALLER_HEADER;
use crate::service::{LeadService, SyncUser};

pub use error::{ApiError, ApiJson, ApiQuery, ApiResult};
pub use security_headers::security_headers_middleware;

/// Shared handler state
#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<LeadService>,
}

/// Create the REST API router
pub fn create_router(service: Arc<LeadService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(CALLER_HEADER)]);

    Router::new()
        .route("/health", get(health))
        .route("/api/users", post(sync_user))
        .route(
            "/api/service-requests",
            post(requests::create_request).get(requests::my_requests),
        )
        .route("/api/service-requests/assign", post(requests::assign))
        .route("/api/service-requests/:id/withdraw", post(requests::withdraw))
        .route("/api/service-requests/:id/complete", post(requests::complete))
        .route("/api/service-requests/:id/contacted", post(requests::contacted))
        .route("/api/service-requests/:id/comment", post(requests::comment))
        .route("/api/agents", post(agents::register))
        .route("/api/agents/verified", get(agents::verified))
        .route("/api/agent/requests", get(agents::requests))
        .route("/api/agent/notifications", get(agents::notifications))
        .route("/api/agent/notifications/:id/read", post(agents::mark_read))
        .route("/api/admin/agents", get(admin::list_agents))
        .route("/api/admin/agents/:id/verification", post(admin::update_verification))
        .route("/api/admin/agents/:id/payment", post(admin::update_payment))
        .with_state(ApiState { service })
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Caller identity from the request headers
pub(crate) fn caller(headers: &HeaderMap) -> Option<&str> {
    headers.get(CALLER_HEADER).and_then(|v| v.to_str().ok())
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    if state.service.health_check().await {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unavailable" })),
        )
    }
}

async fn sync_user(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<SyncUser>,
) -> ApiResult<impl IntoResponse> {
    let user = state.service.sync_user(caller(&headers), body).await?;
    Ok(Json(json!({ "success": true, "user": user })))
}

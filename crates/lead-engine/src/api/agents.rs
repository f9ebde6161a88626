use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{caller, ApiJson, ApiQuery, ApiResult, ApiState};
use crate::service::RegisterAgent;

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

pub async fn register(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RegisterAgent>,
) -> ApiResult<impl IntoResponse> {
    let agent = state.service.register_agent(caller(&headers), body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "agent": agent }))))
}

pub async fn verified(State(state): State<ApiState>) -> ApiResult<impl IntoResponse> {
    let agents = state.service.list_verified_agents().await?;
    Ok(Json(json!({ "agents": agents })))
}

pub async fn requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> ApiResult<impl IntoResponse> {
    let requests = state
        .service
        .agent_requests(caller(&headers), query.status.as_deref())
        .await?;
    Ok(Json(json!({ "requests": requests })))
}

pub async fn notifications(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let notifications = state.service.agent_notifications(caller(&headers)).await?;
    Ok(Json(json!({ "notifications": notifications })))
}

pub async fn mark_read(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.service.mark_notification_read(caller(&headers), &id).await?;
    Ok(Json(json!({ "success": true })))
}

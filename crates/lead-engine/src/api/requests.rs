use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{caller, ApiJson, ApiResult, ApiState};
use crate::allocation::AllocationOutcome;
use crate::service::RequestComment;
use crate::types::CreateServiceRequest;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignBody {
    pub request_id: String,
}

/// Body of `POST /api/service-requests/assign`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignResponse {
    pub success: bool,
    pub assigned: bool,
    pub agent_id: Option<String>,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl From<&AllocationOutcome> for AssignResponse {
    fn from(outcome: &AllocationOutcome) -> Self {
        let assigned_at = match outcome {
            AllocationOutcome::Assigned { assigned_at, .. } => Some(*assigned_at),
            _ => None,
        };
        Self {
            success: !matches!(outcome, AllocationOutcome::NotFound),
            assigned: outcome.agent_id().is_some(),
            agent_id: outcome.agent_id().map(String::from),
            outcome: outcome.kind(),
            assigned_at,
        }
    }
}

pub async fn create_request(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateServiceRequest>,
) -> ApiResult<impl IntoResponse> {
    let created = state.service.create_request(caller(&headers), body).await?;
    let assignment = created.allocation.as_ref().map(AssignResponse::from);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "request": created.request,
            "assignment": assignment,
        })),
    ))
}

pub async fn my_requests(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> ApiResult<impl IntoResponse> {
    let requests = state.service.client_requests(caller(&headers)).await?;
    Ok(Json(json!({ "requests": requests })))
}

pub async fn assign(
    State(state): State<ApiState>,
    ApiJson(body): ApiJson<AssignBody>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.service.assign(&body.request_id).await?;
    let status = match outcome {
        AllocationOutcome::NotFound => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    };
    Ok((status, Json(AssignResponse::from(&outcome))))
}

pub async fn withdraw(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let request = state.service.withdraw_request(caller(&headers), &id).await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

pub async fn complete(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let request = state.service.complete_request(caller(&headers), &id).await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

pub async fn contacted(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let request = state.service.toggle_contacted(caller(&headers), &id).await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

pub async fn comment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RequestComment>,
) -> ApiResult<impl IntoResponse> {
    let request = state.service.comment_request(caller(&headers), &id, body).await?;
    Ok(Json(json!({ "success": true, "request": request })))
}

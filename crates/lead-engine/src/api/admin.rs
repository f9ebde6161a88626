use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{caller, ApiJson, ApiQuery, ApiResult, ApiState};
use crate::types::{AgentFilter, PaymentStatus, VerificationStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationBody {
    pub status: VerificationStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentBody {
    pub payment_status: PaymentStatus,
}

pub async fn list_agents(
    State(state): State<ApiState>,
    headers: HeaderMap,
    ApiQuery(filter): ApiQuery<AgentFilter>,
) -> ApiResult<impl IntoResponse> {
    let agents = state.service.list_agents(caller(&headers), &filter).await?;
    Ok(Json(json!({ "agents": agents })))
}

pub async fn update_verification(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<VerificationBody>,
) -> ApiResult<impl IntoResponse> {
    let agent = state
        .service
        .update_verification(caller(&headers), &id, body.status, body.notes.as_deref())
        .await?;
    Ok(Json(json!({ "success": true, "agent": agent })))
}

pub async fn update_payment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PaymentBody>,
) -> ApiResult<impl IntoResponse> {
    let agent = state
        .service
        .update_payment(caller(&headers), &id, body.payment_status)
        .await?;
    Ok(Json(json!({ "success": true, "agent": agent })))
}

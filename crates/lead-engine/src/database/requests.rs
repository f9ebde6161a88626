use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{parse_column, SqliteRecordStore};
use crate::clock::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::error::Result;
use crate::store::RequestStore;
use crate::types::{
    Assignment, CommitOutcome, CreateServiceRequest, RequestStatus, ServiceRequest,
};

const REQUEST_COLUMNS: &str = "id, client_user_id, client_name, client_email, client_phone, \
     request_type, property_type, location, budget_min, budget_max, bedrooms, bathrooms, \
     description, urgency, status, assigned_agent_id, assigned_at, is_contacted, comment, \
     comment_updated_at, withdrawn_at, completed_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    client_user_id: Option<String>,
    client_name: String,
    client_email: String,
    client_phone: String,
    request_type: String,
    property_type: String,
    location: String,
    budget_min: Option<i64>,
    budget_max: Option<i64>,
    bedrooms: Option<i32>,
    bathrooms: Option<i32>,
    description: Option<String>,
    urgency: String,
    status: String,
    assigned_agent_id: Option<String>,
    assigned_at: Option<String>,
    is_contacted: bool,
    comment: Option<String>,
    comment_updated_at: Option<String>,
    withdrawn_at: Option<String>,
    completed_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<RequestRow> for ServiceRequest {
    type Error = crate::Error;

    fn try_from(row: RequestRow) -> Result<Self> {
        Ok(ServiceRequest {
            urgency: parse_column("service_requests.urgency", &row.urgency)?,
            status: parse_column("service_requests.status", &row.status)?,
            assigned_at: parse_optional_timestamp(row.assigned_at)?,
            comment_updated_at: parse_optional_timestamp(row.comment_updated_at)?,
            withdrawn_at: parse_optional_timestamp(row.withdrawn_at)?,
            completed_at: parse_optional_timestamp(row.completed_at)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            id: row.id,
            client_user_id: row.client_user_id,
            client_name: row.client_name,
            client_email: row.client_email,
            client_phone: row.client_phone,
            request_type: row.request_type,
            property_type: row.property_type,
            location: row.location,
            budget_min: row.budget_min,
            budget_max: row.budget_max,
            bedrooms: row.bedrooms,
            bathrooms: row.bathrooms,
            description: row.description,
            assigned_agent_id: row.assigned_agent_id,
            is_contacted: row.is_contacted,
            comment: row.comment,
        })
    }
}

fn into_requests(rows: Vec<RequestRow>) -> Result<Vec<ServiceRequest>> {
    rows.into_iter().map(ServiceRequest::try_from).collect()
}

#[async_trait]
impl RequestStore for SqliteRecordStore {
    async fn create_request(
        &self,
        request: CreateServiceRequest,
        client_user_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ServiceRequest> {
        let id = ServiceRequest::new_id();
        let now = format_timestamp(at);

        sqlx::query(
            "INSERT INTO service_requests (
                 id, client_user_id, client_name, client_email, client_phone, request_type,
                 property_type, location, budget_min, budget_max, bedrooms, bathrooms,
                 description, urgency, status, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 'open', ?, ?)",
        )
        .bind(&id)
        .bind(&client_user_id)
        .bind(request.client_name.trim())
        .bind(request.client_email.trim())
        .bind(request.client_phone.trim())
        .bind(request.request_type.trim())
        .bind(request.property_type.trim())
        .bind(request.location.trim())
        .bind(request.budget_min)
        .bind(request.budget_max)
        .bind(request.bedrooms)
        .bind(request.bathrooms)
        .bind(&request.description)
        .bind(request.urgency.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?;

        debug!(request_id = %id, "Service request stored");
        self.get_request(&id)
            .await?
            .ok_or_else(|| crate::Error::internal("request vanished after insert"))
    }

    async fn get_request(&self, id: &str) -> Result<Option<ServiceRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM service_requests WHERE id = ?",
            REQUEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await?;
        row.map(ServiceRequest::try_from).transpose()
    }

    async fn list_requests_for_agent(
        &self,
        agent_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM service_requests WHERE (status = 'open' OR assigned_agent_id = ",
            REQUEST_COLUMNS
        ));
        query.push_bind(agent_id).push(")");

        if let Some(status) = status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC, id");

        let rows: Vec<RequestRow> = query.build_query_as().fetch_all(self.pool()).await?;
        into_requests(rows)
    }

    async fn list_requests_for_client(&self, client_user_id: &str) -> Result<Vec<ServiceRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            "SELECT {} FROM service_requests WHERE client_user_id = ? ORDER BY created_at DESC, id",
            REQUEST_COLUMNS
        ))
        .bind(client_user_id)
        .fetch_all(self.pool())
        .await?;
        into_requests(rows)
    }

    async fn withdraw_request(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let now = format_timestamp(at);
        let result = sqlx::query(
            "UPDATE service_requests
             SET status = 'withdrawn', withdrawn_at = ?, updated_at = ?
             WHERE id = ? AND status = 'open'",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete_request(
        &self,
        id: &str,
        agent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let now = format_timestamp(at);
        let result = sqlx::query(
            "UPDATE service_requests
             SET status = 'completed', completed_at = ?, updated_at = ?
             WHERE id = ? AND status = 'assigned' AND (? IS NULL OR assigned_agent_id = ?)",
        )
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(agent_id)
        .bind(agent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn toggle_contacted(
        &self,
        id: &str,
        agent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>> {
        let contacted: Option<bool> = sqlx::query_scalar(
            "UPDATE service_requests
             SET is_contacted = 1 - is_contacted, updated_at = ?
             WHERE id = ? AND (? IS NULL OR assigned_agent_id = ?)
             RETURNING is_contacted",
        )
        .bind(format_timestamp(at))
        .bind(id)
        .bind(agent_id)
        .bind(agent_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(contacted)
    }

    async fn set_comment(
        &self,
        id: &str,
        agent_id: Option<&str>,
        comment: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let now = format_timestamp(at);
        let result = sqlx::query(
            "UPDATE service_requests
             SET comment = ?, comment_updated_at = ?, updated_at = ?
             WHERE id = ? AND (? IS NULL OR assigned_agent_id = ?)",
        )
        .bind(comment)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .bind(agent_id)
        .bind(agent_id)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit_assignment(&self, assignment: &Assignment) -> Result<CommitOutcome> {
        let assigned_at = format_timestamp(assignment.assigned_at);
        let previous = assignment.previous_assigned_at.map(format_timestamp);

        // Write the agent row first so the transaction takes the write lock
        // immediately instead of upgrading from a read snapshot.
        let mut tx = self.pool().begin().await?;

        let agent_rows = sqlx::query(
            "UPDATE agents
             SET last_request_assigned_at = ?, updated_at = ?
             WHERE id = ?
               AND verification_status = 'approved'
               AND payment_status = 'paid'
               AND last_request_assigned_at IS ?",
        )
        .bind(&assigned_at)
        .bind(&assigned_at)
        .bind(&assignment.agent_id)
        .bind(&previous)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if agent_rows == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::AgentChanged);
        }

        let request_rows = sqlx::query(
            "UPDATE service_requests
             SET status = 'assigned', assigned_agent_id = ?, assigned_at = ?, updated_at = ?
             WHERE id = ? AND status = 'open' AND assigned_agent_id IS NULL",
        )
        .bind(&assignment.agent_id)
        .bind(&assigned_at)
        .bind(&assigned_at)
        .bind(&assignment.request_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if request_rows == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::RequestChanged);
        }

        tx.commit().await?;
        Ok(CommitOutcome::Committed)
    }
}

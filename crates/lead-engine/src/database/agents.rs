use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use super::{parse_column, unique_violation, SqliteRecordStore};
use crate::clock::{format_timestamp, parse_optional_timestamp, parse_timestamp};
use crate::error::Result;
use crate::store::AgentStore;
use crate::types::{Agent, AgentFilter, NewAgent, PaymentStatus, VerificationStatus};

const AGENT_COLUMNS: &str = "id, user_id, full_name, email, verification_status, \
     payment_status, last_request_assigned_at, verification_notes, verification_reviewed_at, \
     payment_date, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: String,
    user_id: String,
    full_name: String,
    email: String,
    verification_status: String,
    payment_status: String,
    last_request_assigned_at: Option<String>,
    verification_notes: Option<String>,
    verification_reviewed_at: Option<String>,
    payment_date: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<AgentRow> for Agent {
    type Error = crate::Error;

    fn try_from(row: AgentRow) -> Result<Self> {
        Ok(Agent {
            verification_status: parse_column(
                "agents.verification_status",
                &row.verification_status,
            )?,
            payment_status: parse_column("agents.payment_status", &row.payment_status)?,
            last_request_assigned_at: parse_optional_timestamp(row.last_request_assigned_at)?,
            verification_reviewed_at: parse_optional_timestamp(row.verification_reviewed_at)?,
            payment_date: parse_optional_timestamp(row.payment_date)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            id: row.id,
            user_id: row.user_id,
            full_name: row.full_name,
            email: row.email,
            verification_notes: row.verification_notes,
        })
    }
}

fn into_agents(rows: Vec<AgentRow>) -> Result<Vec<Agent>> {
    rows.into_iter().map(Agent::try_from).collect()
}

#[async_trait]
impl AgentStore for SqliteRecordStore {
    async fn create_agent(&self, agent: NewAgent, at: DateTime<Utc>) -> Result<Agent> {
        let id = Agent::new_id();
        let now = format_timestamp(at);

        sqlx::query(
            "INSERT INTO agents (id, user_id, full_name, email, verification_status, payment_status,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, 'pending', 'unpaid', ?, ?)",
        )
        .bind(&id)
        .bind(&agent.user_id)
        .bind(&agent.full_name)
        .bind(&agent.email)
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await
        .map_err(|e| unique_violation(e, format!("agent profile for user {}", agent.user_id)))?;

        debug!(agent_id = %id, user_id = %agent.user_id, "Agent created");
        self.get_agent(&id)
            .await?
            .ok_or_else(|| crate::Error::internal("agent vanished after insert"))
    }

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let row: Option<AgentRow> =
            sqlx::query_as(&format!("SELECT {} FROM agents WHERE id = ?", AGENT_COLUMNS))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn get_agent_by_user(&self, user_id: &str) -> Result<Option<Agent>> {
        let row: Option<AgentRow> =
            sqlx::query_as(&format!("SELECT {} FROM agents WHERE user_id = ?", AGENT_COLUMNS))
                .bind(user_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM agents WHERE 1 = 1", AGENT_COLUMNS));

        if let Some(status) = filter.verification_status {
            query.push(" AND verification_status = ").push_bind(status.as_str());
        }
        if let Some(status) = filter.payment_status {
            query.push(" AND payment_status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC, id");

        let rows: Vec<AgentRow> = query.build_query_as().fetch_all(self.pool()).await?;
        into_agents(rows)
    }

    async fn eligible_agents(&self) -> Result<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(&format!(
            "SELECT {} FROM agents WHERE verification_status = 'approved' AND payment_status = 'paid'",
            AGENT_COLUMNS
        ))
        .fetch_all(self.pool())
        .await?;

        debug!(count = rows.len(), "Fetched eligible agents");
        into_agents(rows)
    }

    async fn update_verification(
        &self,
        id: &str,
        status: VerificationStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Agent>> {
        let now = format_timestamp(at);
        let result = sqlx::query(
            "UPDATE agents
             SET verification_status = ?, verification_notes = ?, verification_reviewed_at = ?,
                 updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&notes)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_agent(id).await
    }

    async fn update_payment(
        &self,
        id: &str,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Agent>> {
        let now = format_timestamp(at);
        let payment_date = (status == PaymentStatus::Paid).then(|| now.clone());

        let result = sqlx::query(
            "UPDATE agents
             SET payment_status = ?, payment_date = COALESCE(?, payment_date), updated_at = ?
             WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(&payment_date)
        .bind(&now)
        .bind(id)
        .execute(self.pool())
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_agent(id).await
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{parse_column, SqliteRecordStore};
use crate::clock::{format_timestamp, parse_timestamp};
use crate::error::Result;
use crate::store::UserStore;
use crate::types::{UpsertUser, User, UserRole};

const USER_COLUMNS: &str = "id, external_id, email, full_name, role, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    external_id: String,
    email: Option<String>,
    full_name: Option<String>,
    role: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<UserRow> for User {
    type Error = crate::Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            role: parse_column("users.role", &row.role)?,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
            id: row.id,
            external_id: row.external_id,
            email: row.email,
            full_name: row.full_name,
        })
    }
}

#[async_trait]
impl UserStore for SqliteRecordStore {
    async fn upsert_user(&self, user: UpsertUser, at: DateTime<Utc>) -> Result<User> {
        let now = format_timestamp(at);

        sqlx::query(
            "INSERT INTO users (id, external_id, email, full_name, role, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(external_id) DO UPDATE SET
                 email = COALESCE(excluded.email, users.email),
                 full_name = COALESCE(excluded.full_name, users.full_name),
                 updated_at = excluded.updated_at",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.external_id)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.pool())
        .await?;

        self.get_user_by_external_id(&user.external_id)
            .await?
            .ok_or_else(|| crate::Error::internal("user vanished after upsert"))
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
                .bind(id)
                .fetch_optional(self.pool())
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE external_id = ?", USER_COLUMNS))
                .bind(external_id)
                .fetch_optional(self.pool())
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn set_user_role(&self, id: &str, role: UserRole, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
            .bind(role.as_str())
            .bind(format_timestamp(at))
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

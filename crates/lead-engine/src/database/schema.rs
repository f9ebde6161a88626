//! Database schema definitions
//!
//! Tables for users, agents, service requests and the notification outbox.
//! All timestamps are TEXT in the format produced by
//! [`crate::clock::format_timestamp`].

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;

const CREATE_USERS: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        external_id TEXT NOT NULL UNIQUE,
        email TEXT,
        full_name TEXT,
        role TEXT NOT NULL DEFAULT 'user'
            CHECK (role IN ('user', 'landlord', 'agent', 'admin')),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const CREATE_AGENTS: &str = r#"
    CREATE TABLE IF NOT EXISTS agents (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        full_name TEXT NOT NULL,
        email TEXT NOT NULL,
        verification_status TEXT NOT NULL DEFAULT 'pending'
            CHECK (verification_status IN ('pending', 'approved', 'rejected')),
        payment_status TEXT NOT NULL DEFAULT 'unpaid'
            CHECK (payment_status IN ('unpaid', 'paid')),
        last_request_assigned_at TEXT,
        verification_notes TEXT,
        verification_reviewed_at TEXT,
        payment_date TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const CREATE_SERVICE_REQUESTS: &str = r#"
    CREATE TABLE IF NOT EXISTS service_requests (
        id TEXT PRIMARY KEY,
        client_user_id TEXT REFERENCES users(id) ON DELETE SET NULL,
        client_name TEXT NOT NULL,
        client_email TEXT NOT NULL,
        client_phone TEXT NOT NULL,
        request_type TEXT NOT NULL,
        property_type TEXT NOT NULL,
        location TEXT NOT NULL,
        budget_min INTEGER,
        budget_max INTEGER,
        bedrooms INTEGER,
        bathrooms INTEGER,
        description TEXT,
        urgency TEXT NOT NULL DEFAULT 'normal'
            CHECK (urgency IN ('low', 'normal', 'high', 'urgent')),
        status TEXT NOT NULL DEFAULT 'open'
            CHECK (status IN ('open', 'assigned', 'withdrawn', 'completed')),
        assigned_agent_id TEXT REFERENCES agents(id),
        assigned_at TEXT,
        is_contacted INTEGER NOT NULL DEFAULT 0,
        comment TEXT,
        comment_updated_at TEXT,
        withdrawn_at TEXT,
        completed_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK ((status IN ('assigned', 'completed')) = (assigned_agent_id IS NOT NULL))
    )
"#;

const CREATE_NOTIFICATIONS: &str = r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        agent_id TEXT REFERENCES agents(id) ON DELETE SET NULL,
        channel TEXT NOT NULL DEFAULT 'email',
        subject TEXT NOT NULL,
        message TEXT NOT NULL,
        service_request_id TEXT REFERENCES service_requests(id) ON DELETE SET NULL,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'sent', 'failed')),
        read INTEGER NOT NULL DEFAULT 0,
        read_at TEXT,
        created_at TEXT NOT NULL
    )
"#;

const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_agents_eligibility ON agents(verification_status, payment_status, last_request_assigned_at)",
    "CREATE INDEX IF NOT EXISTS idx_requests_status ON service_requests(status, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_requests_agent ON service_requests(assigned_agent_id)",
    "CREATE INDEX IF NOT EXISTS idx_requests_client ON service_requests(client_user_id)",
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at)",
];

/// Create all tables and indexes; idempotent
pub async fn initialize(pool: &SqlitePool) -> Result<()> {
    debug!("Creating leadflow database schema");

    for (table, ddl) in [
        ("users", CREATE_USERS),
        ("agents", CREATE_AGENTS),
        ("service_requests", CREATE_SERVICE_REQUESTS),
        ("notifications", CREATE_NOTIFICATIONS),
    ] {
        sqlx::query(ddl).execute(pool).await?;
        debug!(table, "Table ready");
    }

    for ddl in CREATE_INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    debug!("Database schema created");
    Ok(())
}

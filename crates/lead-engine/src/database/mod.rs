//! SQLite-backed record store
//!
//! [`Database`] owns the connection pool and schema bootstrap;
//! [`SqliteRecordStore`] implements every store trait from [`crate::store`]
//! on top of it, one file per table.

pub mod schema;

mod agents;
mod notifications;
mod requests;
mod users;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};

/// Connection pool plus schema management
#[derive(Clone, Debug)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database described by `config`
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!(url = %config.url, "Opening record store");

        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout());

        let mut pool_options = SqlitePoolOptions::new().acquire_timeout(config.acquire_timeout());

        if config.is_in_memory() {
            // Every connection to :memory: is a separate database, so pin a
            // single connection that is never recycled.
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.journal_mode(SqliteJournalMode::Wal);
            pool_options = pool_options.max_connections(config.max_connections.max(1));
        }

        let pool = pool_options.connect_with(options).await?;
        Ok(Self { pool })
    }

    /// Private in-memory database with the schema applied
    pub async fn new_in_memory() -> Result<Self> {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        };
        let database = Self::connect(&config).await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Create the schema if it does not exist yet
    pub async fn migrate(&self) -> Result<()> {
        schema::initialize(&self.pool).await?;
        info!("Record store schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Execute a trivial query
    pub async fn health_check(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => {
                debug!("Database health check passed");
                true
            }
            Err(e) => {
                error!(error = %e, "Database health check failed");
                false
            }
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Implements [`UserStore`](crate::store::UserStore),
/// [`AgentStore`](crate::store::AgentStore),
/// [`RequestStore`](crate::store::RequestStore) and
/// [`NotificationStore`](crate::store::NotificationStore).
#[derive(Clone, Debug)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }
}

/// Parse a TEXT enum column
fn parse_column<T>(column: &str, raw: &str) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    raw.parse()
        .map_err(|_| Error::internal(format!("unexpected value '{}' in column {}", raw, column)))
}

/// Map a unique-constraint violation to `AlreadyExists`
fn unique_violation(error: sqlx::Error, what: impl Into<String>) -> Error {
    match error.as_database_error() {
        Some(db_error) if db_error.is_unique_violation() => Error::AlreadyExists(what.into()),
        _ => Error::StoreUnavailable(error),
    }
}

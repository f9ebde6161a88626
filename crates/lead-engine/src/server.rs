//! # Leadflow Server
//!
//! Owns the record store, the [`LeadService`] built on it and the HTTP
//! listener. [`LeadServerBuilder`] is the usual entry point:
//!
//! ```rust,no_run
//! use leadflow_engine::{LeadServerBuilder, LeadflowConfig};
//!
//! # async fn example() -> leadflow_engine::Result<()> {
//! let server = LeadServerBuilder::new()
//!     .with_config(LeadflowConfig::default())
//!     .with_in_memory_database()
//!     .build()
//!     .await?;
//!
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::Router;
use tracing::{info, warn};

use crate::api;
use crate::config::LeadflowConfig;
use crate::database::{Database, SqliteRecordStore};
use crate::error::{Error, Result};
use crate::service::LeadService;
use crate::store::{AgentStore, UserStore};
use crate::types::{Agent, NewAgent, PaymentStatus, UpsertUser, UserRole, VerificationStatus};

pub struct LeadServer {
    service: Arc<LeadService>,
    store: SqliteRecordStore,
    config: LeadflowConfig,
}

impl LeadServer {
    /// Connect to the configured store, apply the schema and wire the service
    pub async fn new(config: LeadflowConfig) -> Result<Self> {
        let database = Database::connect(&config.database).await?;
        database.migrate().await?;

        let store = SqliteRecordStore::new(database);
        let service = Arc::new(LeadService::from_config(store.clone(), &config));
        info!(
            max_attempts = config.allocation.max_attempts,
            notifications = config.notifications.enabled,
            "Lead service ready"
        );

        Ok(Self { service, store, config })
    }

    pub fn service(&self) -> &Arc<LeadService> {
        &self.service
    }

    pub fn store(&self) -> &SqliteRecordStore {
        &self.store
    }

    /// HTTP router with all layers applied
    pub fn router(&self) -> Router {
        api::create_router(self.service.clone())
    }

    /// Serve the API until Ctrl+C
    pub async fn run(&self) -> Result<()> {
        let address = &self.config.api.bind_address;
        let listener = tokio::net::TcpListener::bind(address)
            .await
            .map_err(|e| Error::Config(format!("cannot bind {}: {}", address, e)))?;
        info!(address = %address, "Leadflow API listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::internal(format!("server error: {}", e)))?;

        self.store.database().close().await;
        info!("Leadflow API stopped");
        Ok(())
    }

    /// Development helper: an approved, paid agent ready for allocation
    pub async fn seed_agent(&self, external_id: &str, full_name: &str, email: &str) -> Result<Agent> {
        let now = chrono::Utc::now();
        let user = self
            .store
            .upsert_user(
                UpsertUser {
                    external_id: external_id.to_string(),
                    email: Some(email.to_string()),
                    full_name: Some(full_name.to_string()),
                    role: UserRole::Agent,
                },
                now,
            )
            .await?;

        let agent = match self.store.get_agent_by_user(&user.id).await? {
            Some(existing) => existing,
            None => {
                self.store
                    .create_agent(
                        NewAgent {
                            user_id: user.id.clone(),
                            full_name: full_name.to_string(),
                            email: email.to_string(),
                        },
                        now,
                    )
                    .await?
            }
        };

        self.store
            .update_verification(&agent.id, VerificationStatus::Approved, Some("seeded".to_string()), now)
            .await?;
        // Admins keep their role
        if user.role != UserRole::Admin {
            self.store.set_user_role(&user.id, UserRole::Agent, now).await?;
        }
        let agent = self
            .store
            .update_payment(&agent.id, PaymentStatus::Paid, now)
            .await?
            .ok_or_else(|| Error::internal("seeded agent vanished"))?;

        info!(agent_id = %agent.id, external_id, "Seeded eligible agent");
        Ok(agent)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Builder for [`LeadServer`]
pub struct LeadServerBuilder {
    config: Option<LeadflowConfig>,
    database_url: Option<String>,
}

impl LeadServerBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            database_url: None,
        }
    }

    pub fn with_config(mut self, config: LeadflowConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the configured database URL
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    /// Use a private in-memory database
    pub fn with_in_memory_database(mut self) -> Self {
        self.database_url = Some("sqlite::memory:".to_string());
        self
    }

    pub async fn build(self) -> Result<LeadServer> {
        let mut config = self
            .config
            .ok_or_else(|| Error::Config("configuration not provided".to_string()))?;
        if let Some(url) = self.database_url {
            config.database.url = url;
        }
        LeadServer::new(config).await
    }
}

impl Default for LeadServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

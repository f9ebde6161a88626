//! Caller resolution and role checks.
//!
//! The identity provider sits in front of this service and forwards the
//! authenticated subject in [`CALLER_HEADER`]. Every handler resolves the
//! caller here instead of checking roles itself.

use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};
use crate::store::{AgentStore, UserStore};
use crate::types::{Agent, User, UserRole, VerificationStatus};

/// Header carrying the identity provider's user id
pub const CALLER_HEADER: &str = "x-external-user-id";

/// An approved agent together with its user record
#[derive(Debug, Clone)]
pub struct AgentCaller {
    pub user: User,
    pub agent: Agent,
}

/// Who may act on an assigned request
#[derive(Debug, Clone)]
pub enum RequestManager {
    /// Any request
    Admin(User),
    /// Only requests bound to this agent
    Agent(AgentCaller),
}

impl RequestManager {
    /// Agent scope for store updates; `None` for admins
    pub fn agent_scope(&self) -> Option<&str> {
        match self {
            RequestManager::Admin(_) => None,
            RequestManager::Agent(caller) => Some(caller.agent.id.as_str()),
        }
    }
}

#[derive(Clone)]
pub struct AccessControl {
    users: Arc<dyn UserStore>,
    agents: Arc<dyn AgentStore>,
}

impl AccessControl {
    pub fn new(users: Arc<dyn UserStore>, agents: Arc<dyn AgentStore>) -> Self {
        Self { users, agents }
    }

    /// Any known user
    pub async fn require_user(&self, external_id: Option<&str>) -> Result<User> {
        let external_id = external_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Unauthorized(format!("missing {} header", CALLER_HEADER)))?;

        self.users
            .get_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("user {}", external_id)))
    }

    /// Admin with a complete profile
    pub async fn require_admin(&self, external_id: Option<&str>) -> Result<User> {
        let user = self.require_user(external_id).await?;
        if !is_admin(&user) {
            debug!(user_id = %user.id, role = %user.role, "Admin check failed");
            return Err(Error::forbidden("admin access required"));
        }
        Ok(user)
    }

    /// User whose agent application has been approved
    pub async fn require_approved_agent(&self, external_id: Option<&str>) -> Result<AgentCaller> {
        let user = self.require_user(external_id).await?;
        self.approved_agent(user).await
    }

    /// Admin, or an approved agent limited to its own requests
    pub async fn require_request_manager(&self, external_id: Option<&str>) -> Result<RequestManager> {
        let user = self.require_user(external_id).await?;
        if is_admin(&user) {
            return Ok(RequestManager::Admin(user));
        }
        self.approved_agent(user).await.map(RequestManager::Agent)
    }

    async fn approved_agent(&self, user: User) -> Result<AgentCaller> {
        let agent = self
            .agents
            .get_agent_by_user(&user.id)
            .await?
            .ok_or_else(|| Error::forbidden("agent profile required"))?;

        if agent.verification_status != VerificationStatus::Approved {
            return Err(Error::forbidden(format!(
                "agent application is {}",
                agent.verification_status
            )));
        }
        Ok(AgentCaller { user, agent })
    }
}

fn is_admin(user: &User) -> bool {
    user.role == UserRole::Admin
        && has_text(user.email.as_deref())
        && has_text(user.full_name.as_deref())
}

fn has_text(value: Option<&str>) -> bool {
    value.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

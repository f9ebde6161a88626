//! Application operations behind the HTTP API and CLI.
//!
//! [`LeadService`] resolves the caller through [`AccessControl`], applies
//! the status rules for each transition and delegates assignment to the
//! [`RequestAllocator`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::access::{AccessControl, RequestManager};
use crate::allocation::{AllocationOutcome, RequestAllocator};
use crate::clock::{Clock, SystemClock};
use crate::config::LeadflowConfig;
use crate::database::{Database, SqliteRecordStore};
use crate::error::{Error, Result};
use crate::notify::{self, verification_message, Notifier};
use crate::store::{AgentStore, NotificationStore, RequestStore, UserStore};
use crate::types::{
    Agent, AgentFilter, CreateServiceRequest, NewAgent, Notification, PaymentStatus,
    RequestStatus, ServiceRequest, UpsertUser, User, UserRole, VerificationStatus,
};
use crate::validation::{normalize_notes, validate_not_blank};

/// A stored request and what allocation made of it
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestCreated {
    pub request: ServiceRequest,
    /// `None` when allocation failed; the request is stored and open
    pub allocation: Option<AllocationOutcome>,
}

/// Identity sync body
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SyncUser {
    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 120))]
    pub full_name: Option<String>,
}

/// Agent application body; missing fields fall back to the user's profile
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgent {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

/// Working note an agent keeps on a request
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RequestComment {
    #[validate(length(min = 1, max = 2000), custom(function = "validate_not_blank"))]
    pub comment: String,
}

/// Public directory entry for an approved agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAgent {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<Agent> for VerifiedAgent {
    fn from(agent: Agent) -> Self {
        Self {
            id: agent.id,
            full_name: agent.full_name,
            email: agent.email,
            verified_at: agent.verification_reviewed_at,
        }
    }
}

pub struct LeadService {
    users: Arc<dyn UserStore>,
    agents: Arc<dyn AgentStore>,
    requests: Arc<dyn RequestStore>,
    notifications: Arc<dyn NotificationStore>,
    notifier: Arc<dyn Notifier>,
    allocator: RequestAllocator,
    access: AccessControl,
    clock: Arc<dyn Clock>,
    database: Database,
}

impl LeadService {
    /// Wire every component on top of one record store
    pub fn new(
        store: SqliteRecordStore,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn Notifier>,
        config: &LeadflowConfig,
    ) -> Self {
        let database = store.database().clone();
        let store = Arc::new(store);

        let allocator = RequestAllocator::new(
            store.clone(),
            store.clone(),
            notifier.clone(),
            clock.clone(),
            config.allocation.clone(),
        );

        Self {
            users: store.clone(),
            agents: store.clone(),
            requests: store.clone(),
            notifications: store.clone(),
            access: AccessControl::new(store.clone(), store),
            notifier,
            allocator,
            clock,
            database,
        }
    }

    /// Wall clock and the notifier selected by `config.notifications`
    pub fn from_config(store: SqliteRecordStore, config: &LeadflowConfig) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let notifier = notify::from_config(&config.notifications, Arc::new(store.clone()), clock.clone());
        Self::new(store, clock, notifier, config)
    }

    pub fn access(&self) -> &AccessControl {
        &self.access
    }

    pub fn allocator(&self) -> &RequestAllocator {
        &self.allocator
    }

    pub async fn health_check(&self) -> bool {
        self.database.health_check().await
    }

    /// Create or refresh the caller's user record
    #[instrument(skip(self, body))]
    pub async fn sync_user(&self, caller: Option<&str>, body: SyncUser) -> Result<User> {
        body.validate()?;
        let external_id = caller
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Unauthorized("missing caller identity".to_string()))?;

        self.users
            .upsert_user(
                UpsertUser {
                    external_id: external_id.to_string(),
                    email: body.email,
                    full_name: body.full_name,
                    role: UserRole::User,
                },
                self.clock.now(),
            )
            .await
    }

    /// Store a new request and allocate it straight away
    #[instrument(skip(self, input))]
    pub async fn create_request(
        &self,
        caller: Option<&str>,
        input: CreateServiceRequest,
    ) -> Result<RequestCreated> {
        input.validate()?;

        let client_user_id = match caller {
            Some(external_id) => match self.users.get_user_by_external_id(external_id).await? {
                Some(user) => Some(user.id),
                None => {
                    warn!(external_id, "Unknown caller, storing request without owner");
                    None
                }
            },
            None => None,
        };

        let request = self
            .requests
            .create_request(input, client_user_id, self.clock.now())
            .await?;
        info!(request_id = %request.id, request_type = %request.request_type, "Service request created");

        let allocation = match self.allocator.assign(&request.id).await {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(request_id = %request.id, error = %e, retryable = e.is_retryable(), "Allocation failed, request left open");
                None
            }
        };

        // Reflect the assignment, if any, in the returned row
        let request = match allocation {
            Some(AllocationOutcome::Assigned { .. }) => {
                let reread = self.requests.get_request(&request.id).await;
                refreshed(request, reread)
            }
            _ => request,
        };

        Ok(RequestCreated { request, allocation })
    }

    /// Run the allocator for an existing request
    pub async fn assign(&self, request_id: &str) -> Result<AllocationOutcome> {
        self.allocator.assign(request_id).await
    }

    /// The caller's own requests, newest first
    pub async fn client_requests(&self, caller: Option<&str>) -> Result<Vec<ServiceRequest>> {
        let user = self.access.require_user(caller).await?;
        self.requests.list_requests_for_client(&user.id).await
    }

    /// Owner withdraws an open request
    #[instrument(skip(self))]
    pub async fn withdraw_request(&self, caller: Option<&str>, request_id: &str) -> Result<ServiceRequest> {
        let user = self.access.require_user(caller).await?;
        let request = self.load_request(request_id).await?;

        if request.client_user_id.as_deref() != Some(user.id.as_str()) {
            return Err(Error::forbidden("only the requesting client may withdraw"));
        }
        check_withdrawable(&request)?;

        if !self.requests.withdraw_request(request_id, self.clock.now()).await? {
            // Lost a race, most likely with allocation
            let current = self.load_request(request_id).await?;
            check_withdrawable(&current)?;
            return Err(Error::InvalidTransition(format!("request {} changed concurrently", request_id)));
        }

        info!(request_id, "Service request withdrawn");
        self.load_request(request_id).await
    }

    /// The assigned agent, or an admin, closes out a request
    #[instrument(skip(self))]
    pub async fn complete_request(&self, caller: Option<&str>, request_id: &str) -> Result<ServiceRequest> {
        let manager = self.access.require_request_manager(caller).await?;
        let request = self.managed_request(&manager, request_id).await?;

        if request.status != RequestStatus::Assigned
            || !self
                .requests
                .complete_request(request_id, manager.agent_scope(), self.clock.now())
                .await?
        {
            return Err(Error::InvalidTransition(format!(
                "request {} is {}, expected assigned",
                request_id, request.status
            )));
        }

        info!(request_id, agent_id = ?manager.agent_scope(), "Service request completed");
        self.load_request(request_id).await
    }

    /// Flip whether the client has been contacted
    #[instrument(skip(self))]
    pub async fn toggle_contacted(&self, caller: Option<&str>, request_id: &str) -> Result<ServiceRequest> {
        let manager = self.access.require_request_manager(caller).await?;
        self.managed_request(&manager, request_id).await?;

        let contacted = self
            .requests
            .toggle_contacted(request_id, manager.agent_scope(), self.clock.now())
            .await?
            .ok_or_else(|| Error::not_found(format!("request {}", request_id)))?;

        info!(request_id, contacted, "Contacted flag updated");
        self.load_request(request_id).await
    }

    /// Replace the working comment on a request
    #[instrument(skip(self, body))]
    pub async fn comment_request(
        &self,
        caller: Option<&str>,
        request_id: &str,
        body: RequestComment,
    ) -> Result<ServiceRequest> {
        body.validate()?;
        let manager = self.access.require_request_manager(caller).await?;
        self.managed_request(&manager, request_id).await?;

        let stored = self
            .requests
            .set_comment(request_id, manager.agent_scope(), body.comment.trim(), self.clock.now())
            .await?;
        if !stored {
            return Err(Error::not_found(format!("request {}", request_id)));
        }

        info!(request_id, "Request comment updated");
        self.load_request(request_id).await
    }

    /// Load a request the manager is allowed to act on
    async fn managed_request(&self, manager: &RequestManager, request_id: &str) -> Result<ServiceRequest> {
        let request = self.load_request(request_id).await?;
        if let Some(agent_id) = manager.agent_scope() {
            if request.assigned_agent_id.as_deref() != Some(agent_id) {
                return Err(Error::forbidden("request is not assigned to this agent"));
            }
        }
        Ok(request)
    }

    /// Signed-in user applies to become an agent
    #[instrument(skip(self, body))]
    pub async fn register_agent(&self, caller: Option<&str>, body: RegisterAgent) -> Result<Agent> {
        body.validate()?;
        let user = self.access.require_user(caller).await?;

        let full_name = body
            .full_name
            .or_else(|| user.full_name.clone())
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| Error::Validation("fullName is required".to_string()))?;
        let email = body
            .email
            .or_else(|| user.email.clone())
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| Error::Validation("email is required".to_string()))?;

        let agent = self
            .agents
            .create_agent(NewAgent { user_id: user.id, full_name, email }, self.clock.now())
            .await?;
        info!(agent_id = %agent.id, "Agent application received");
        Ok(agent)
    }

    /// Admin decision on an agent application
    #[instrument(skip(self, notes))]
    pub async fn update_verification(
        &self,
        caller: Option<&str>,
        agent_id: &str,
        status: VerificationStatus,
        notes: Option<&str>,
    ) -> Result<Agent> {
        let admin = self.access.require_admin(caller).await?;

        let notes = normalize_notes(notes).map_err(|e| Error::Validation(e.to_string()))?;
        let reviewer = admin.full_name.as_deref().or(admin.email.as_deref()).unwrap_or("admin");
        let stored_notes = notes
            .clone()
            .unwrap_or_else(|| format!("{} by {}", status, reviewer));

        let now = self.clock.now();
        let agent = self
            .agents
            .update_verification(agent_id, status, Some(stored_notes), now)
            .await?
            .ok_or_else(|| Error::not_found(format!("agent {}", agent_id)))?;

        if status == VerificationStatus::Approved {
            if let Err(e) = self.promote_to_agent(&agent.user_id, now).await {
                warn!(agent_id, user_id = %agent.user_id, error = %e, "Role promotion failed, agent stays approved");
            }
        }
        info!(agent_id, %status, admin_id = %admin.id, "Agent verification updated");

        let message = notes.unwrap_or_else(|| verification_message(status));
        if let Err(e) = self.notifier.verification_changed(&agent, status, &message).await {
            warn!(agent_id, error = %e, "Verification notification failed");
        }
        Ok(agent)
    }

    async fn promote_to_agent(&self, user_id: &str, at: DateTime<Utc>) -> Result<()> {
        match self.users.get_user(user_id).await? {
            // Admins keep their role
            Some(user) if user.role == UserRole::Admin => Ok(()),
            Some(_) => {
                self.users.set_user_role(user_id, UserRole::Agent, at).await?;
                Ok(())
            }
            None => Err(Error::internal(format!("agent owner {} missing", user_id))),
        }
    }

    /// Admin records the agent's fee state
    #[instrument(skip(self))]
    pub async fn update_payment(
        &self,
        caller: Option<&str>,
        agent_id: &str,
        status: PaymentStatus,
    ) -> Result<Agent> {
        let admin = self.access.require_admin(caller).await?;
        let agent = self
            .agents
            .update_payment(agent_id, status, self.clock.now())
            .await?
            .ok_or_else(|| Error::not_found(format!("agent {}", agent_id)))?;

        info!(agent_id, %status, admin_id = %admin.id, "Agent payment updated");
        Ok(agent)
    }

    pub async fn list_agents(&self, caller: Option<&str>, filter: &AgentFilter) -> Result<Vec<Agent>> {
        self.access.require_admin(caller).await?;
        self.agents.list_agents(filter).await
    }

    /// Public directory of approved agents
    pub async fn list_verified_agents(&self) -> Result<Vec<VerifiedAgent>> {
        let filter = AgentFilter {
            verification_status: Some(VerificationStatus::Approved),
            payment_status: None,
        };
        let agents = self.agents.list_agents(&filter).await?;
        Ok(agents.into_iter().map(VerifiedAgent::from).collect())
    }

    /// Open requests plus the caller's own; `"all"` or no filter lists both
    pub async fn agent_requests(
        &self,
        caller: Option<&str>,
        status: Option<&str>,
    ) -> Result<Vec<ServiceRequest>> {
        let caller = self.access.require_approved_agent(caller).await?;
        let status = match status.map(str::trim) {
            None | Some("") | Some("all") => None,
            Some(raw) => Some(raw.parse::<RequestStatus>()?),
        };
        self.requests
            .list_requests_for_agent(&caller.agent.id, status)
            .await
    }

    /// Notifications addressed to the caller, newest first
    pub async fn agent_notifications(&self, caller: Option<&str>) -> Result<Vec<Notification>> {
        let user = self.access.require_user(caller).await?;
        self.notifications.list_notifications_for_user(&user.id).await
    }

    pub async fn mark_notification_read(&self, caller: Option<&str>, notification_id: &str) -> Result<()> {
        let user = self.access.require_user(caller).await?;
        if !self
            .notifications
            .mark_notification_read(notification_id, &user.id, self.clock.now())
            .await?
        {
            return Err(Error::not_found(format!("notification {}", notification_id)));
        }
        Ok(())
    }

    async fn load_request(&self, request_id: &str) -> Result<ServiceRequest> {
        self.requests
            .get_request(request_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("request {}", request_id)))
    }
}

/// The re-read row when available, otherwise the row as stored
fn refreshed(stored: ServiceRequest, reread: Result<Option<ServiceRequest>>) -> ServiceRequest {
    match reread {
        Ok(Some(current)) => current,
        Ok(None) => stored,
        Err(e) => {
            warn!(request_id = %stored.id, error = %e, "Re-read after assignment failed, returning stored row");
            stored
        }
    }
}

fn check_withdrawable(request: &ServiceRequest) -> Result<()> {
    match request.status {
        RequestStatus::Open => Ok(()),
        RequestStatus::Withdrawn => Err(Error::AlreadyWithdrawn(request.id.clone())),
        other => Err(Error::InvalidTransition(format!(
            "request {} is {}, only open requests can be withdrawn",
            request.id, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Urgency;
    use chrono::TimeZone;

    fn stored(status: RequestStatus) -> ServiceRequest {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        ServiceRequest {
            id: "req-1".to_string(),
            client_user_id: None,
            client_name: "Lee".to_string(),
            client_email: "lee@clients.test".to_string(),
            client_phone: "+1 555 010 0000".to_string(),
            request_type: "rent".to_string(),
            property_type: "studio".to_string(),
            location: "Ocho Rios".to_string(),
            budget_min: None,
            budget_max: None,
            bedrooms: None,
            bathrooms: None,
            description: None,
            urgency: Urgency::Normal,
            status,
            assigned_agent_id: None,
            assigned_at: None,
            is_contacted: false,
            comment: None,
            comment_updated_at: None,
            withdrawn_at: None,
            completed_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_refreshed_prefers_reread_row() {
        let mut current = stored(RequestStatus::Assigned);
        current.assigned_agent_id = Some("agent-1".to_string());

        let row = refreshed(stored(RequestStatus::Open), Ok(Some(current.clone())));
        assert_eq!(row, current);
    }

    #[test]
    fn test_refreshed_keeps_stored_row_when_reread_fails() {
        let row = refreshed(
            stored(RequestStatus::Open),
            Err(Error::StoreUnavailable(sqlx::Error::PoolTimedOut)),
        );
        assert_eq!(row.id, "req-1");
        assert_eq!(row.status, RequestStatus::Open);

        let row = refreshed(stored(RequestStatus::Open), Ok(None));
        assert_eq!(row.id, "req-1");
    }

    #[test]
    fn test_blank_comment_rejected() {
        let blank = RequestComment { comment: "   ".to_string() };
        assert!(blank.validate().is_err());
        let empty = RequestComment { comment: String::new() };
        assert!(empty.validate().is_err());
        let ok = RequestComment { comment: "Called, viewing Friday".to_string() };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_withdrawable_states() {
        assert!(check_withdrawable(&stored(RequestStatus::Open)).is_ok());
        assert!(matches!(
            check_withdrawable(&stored(RequestStatus::Withdrawn)),
            Err(Error::AlreadyWithdrawn(_))
        ));
        assert!(matches!(
            check_withdrawable(&stored(RequestStatus::Completed)),
            Err(Error::InvalidTransition(_))
        ));
    }
}

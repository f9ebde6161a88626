//! Typed data-access traits for the record store.
//!
//! Callers pass timestamps in; stores never read the clock, which keeps the
//! allocator's single "now" authoritative.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{
    Agent, AgentFilter, Assignment, CommitOutcome, CreateServiceRequest, NewAgent,
    NewNotification, Notification, PaymentStatus, RequestStatus, ServiceRequest, UpsertUser, User,
    UserRole, VerificationStatus,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert on first sight of `external_id`, otherwise refresh contact details
    async fn upsert_user(&self, user: UpsertUser, at: DateTime<Utc>) -> Result<User>;

    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    async fn get_user_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    /// Returns false when the user does not exist
    async fn set_user_role(&self, id: &str, role: UserRole, at: DateTime<Utc>) -> Result<bool>;
}

#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Fails with `AlreadyExists` when the user already has an agent profile
    async fn create_agent(&self, agent: NewAgent, at: DateTime<Utc>) -> Result<Agent>;

    async fn get_agent(&self, id: &str) -> Result<Option<Agent>>;

    async fn get_agent_by_user(&self, user_id: &str) -> Result<Option<Agent>>;

    async fn list_agents(&self, filter: &AgentFilter) -> Result<Vec<Agent>>;

    /// Approved and paid agents, in no particular order
    async fn eligible_agents(&self) -> Result<Vec<Agent>>;

    async fn update_verification(
        &self,
        id: &str,
        status: VerificationStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<Option<Agent>>;

    /// Marking `Paid` also stamps `payment_date`
    async fn update_payment(
        &self,
        id: &str,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Agent>>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Insert a new `open` request
    async fn create_request(
        &self,
        request: CreateServiceRequest,
        client_user_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ServiceRequest>;

    async fn get_request(&self, id: &str) -> Result<Option<ServiceRequest>>;

    /// Open requests plus those assigned to `agent_id`, newest first
    async fn list_requests_for_agent(
        &self,
        agent_id: &str,
        status: Option<RequestStatus>,
    ) -> Result<Vec<ServiceRequest>>;

    async fn list_requests_for_client(&self, client_user_id: &str) -> Result<Vec<ServiceRequest>>;

    /// open -> withdrawn; false when the request was not open
    async fn withdraw_request(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;

    /// assigned -> completed, stamping `completed_at`. With `agent_id` the
    /// request must be bound to that agent. False when nothing matched.
    async fn complete_request(
        &self,
        id: &str,
        agent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Flip `is_contacted` and return the new value; `None` when no request
    /// matched (scoped to `agent_id` when given)
    async fn toggle_contacted(
        &self,
        id: &str,
        agent_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<bool>>;

    /// Replace the working comment; false when no request matched
    async fn set_comment(
        &self,
        id: &str,
        agent_id: Option<&str>,
        comment: &str,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Apply both halves of an assignment atomically.
    ///
    /// The agent update is conditional on its timestamp still equalling
    /// `previous_assigned_at` and on it still being eligible; the request
    /// update is conditional on it still being open and unassigned. If
    /// either matches no row nothing is written.
    async fn commit_assignment(&self, assignment: &Assignment) -> Result<CommitOutcome>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, notification: NewNotification) -> Result<Notification>;

    /// Newest first
    async fn list_notifications_for_user(&self, user_id: &str) -> Result<Vec<Notification>>;

    /// False when the notification does not exist or belongs to someone else
    async fn mark_notification_read(&self, id: &str, user_id: &str, at: DateTime<Utc>)
        -> Result<bool>;
}

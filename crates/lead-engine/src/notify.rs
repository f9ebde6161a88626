//! Best-effort notifications.
//!
//! Notifications are written to the `notifications` outbox table with
//! channel `email` and status `pending`; a mailer outside this service
//! delivers them. Callers log and swallow [`NotifyError`].

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::clock::Clock;
use crate::config::NotificationConfig;
use crate::store::NotificationStore;
use crate::types::{
    Agent, NewNotification, NotificationChannel, ServiceRequest, VerificationStatus,
};

/// Failure to record a notification
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification store error: {0}")]
    Store(#[from] crate::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// A request was just bound to `agent`
    async fn request_assigned(
        &self,
        agent: &Agent,
        request: &ServiceRequest,
    ) -> Result<(), NotifyError>;

    /// An admin reviewed `agent`'s application
    async fn verification_changed(
        &self,
        agent: &Agent,
        status: VerificationStatus,
        message: &str,
    ) -> Result<(), NotifyError>;
}

/// Writes notifications to the outbox table
pub struct OutboxNotifier {
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
    config: NotificationConfig,
}

impl OutboxNotifier {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        clock: Arc<dyn Clock>,
        config: NotificationConfig,
    ) -> Self {
        Self { store, clock, config }
    }
}

/// Message body for an assignment notification
pub fn assignment_message(request: &ServiceRequest) -> String {
    format!(
        "You have a new {} request for a {} in {}. Check your agent dashboard to view details.",
        request.request_type, request.property_type, request.location
    )
}

/// Default reviewer message when the admin left no notes
pub fn verification_message(status: VerificationStatus) -> String {
    match status {
        VerificationStatus::Approved => "Congratulations! Your agent application has been approved. \
             You can now access your agent dashboard to view client requests."
            .to_string(),
        other => format!("Your agent application has been {}.", other),
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn request_assigned(
        &self,
        agent: &Agent,
        request: &ServiceRequest,
    ) -> Result<(), NotifyError> {
        let notification = self
            .store
            .create_notification(NewNotification {
                user_id: agent.user_id.clone(),
                agent_id: Some(agent.id.clone()),
                channel: NotificationChannel::Email,
                subject: self.config.assignment_subject.clone(),
                message: assignment_message(request),
                service_request_id: Some(request.id.clone()),
                created_at: self.clock.now(),
            })
            .await?;

        debug!(notification_id = %notification.id, agent_id = %agent.id, "Assignment notification queued");
        Ok(())
    }

    async fn verification_changed(
        &self,
        agent: &Agent,
        status: VerificationStatus,
        message: &str,
    ) -> Result<(), NotifyError> {
        let notification = self
            .store
            .create_notification(NewNotification {
                user_id: agent.user_id.clone(),
                agent_id: Some(agent.id.clone()),
                channel: NotificationChannel::Email,
                subject: format!("{}: {}", self.config.verification_subject, status),
                message: message.to_string(),
                service_request_id: None,
                created_at: self.clock.now(),
            })
            .await?;

        debug!(notification_id = %notification.id, agent_id = %agent.id, "Verification notification queued");
        Ok(())
    }
}

/// Used when notifications are switched off in configuration
#[derive(Debug, Default)]
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn request_assigned(
        &self,
        agent: &Agent,
        request: &ServiceRequest,
    ) -> Result<(), NotifyError> {
        debug!(agent_id = %agent.id, request_id = %request.id, "Notifications disabled, skipping");
        Ok(())
    }

    async fn verification_changed(
        &self,
        agent: &Agent,
        _status: VerificationStatus,
        _message: &str,
    ) -> Result<(), NotifyError> {
        debug!(agent_id = %agent.id, "Notifications disabled, skipping");
        Ok(())
    }
}

/// Build the notifier selected by configuration
pub fn from_config(
    config: &NotificationConfig,
    store: Arc<dyn NotificationStore>,
    clock: Arc<dyn Clock>,
) -> Arc<dyn Notifier> {
    if config.enabled {
        Arc::new(OutboxNotifier::new(store, clock, config.clone()))
    } else {
        Arc::new(DisabledNotifier)
    }
}

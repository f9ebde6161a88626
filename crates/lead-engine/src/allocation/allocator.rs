use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::selection;
use crate::clock::Clock;
use crate::config::AllocationConfig;
use crate::error::{Error, Result};
use crate::notify::Notifier;
use crate::store::{AgentStore, RequestStore};
use crate::types::{Agent, Assignment, CommitOutcome, RequestStatus, ServiceRequest};

/// Structured result of an allocation attempt.
///
/// None of these are failures; store errors and exhausted retries come back
/// as `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AllocationOutcome {
    /// The request is now bound to `agent_id`
    Assigned {
        agent_id: String,
        assigned_at: DateTime<Utc>,
        /// The agent's timestamp before this assignment; `None` if first ever
        previous_assigned_at: Option<DateTime<Utc>>,
    },
    /// The request already had an agent; nothing changed
    AlreadyAssigned { agent_id: String },
    /// No approved, paid agent exists; the request stays open
    NoEligibleAgent,
    /// No request with that id
    NotFound,
    /// The request was withdrawn or completed without an agent
    NotOpen { status: RequestStatus },
}

impl AllocationOutcome {
    /// The agent bound to the request, whether by this call or earlier
    pub fn agent_id(&self) -> Option<&str> {
        match self {
            AllocationOutcome::Assigned { agent_id, .. }
            | AllocationOutcome::AlreadyAssigned { agent_id } => Some(agent_id),
            _ => None,
        }
    }

    /// True only when this call made the assignment
    pub fn is_new_assignment(&self) -> bool {
        matches!(self, AllocationOutcome::Assigned { .. })
    }

    /// Wire name of the variant, matching the serialized `outcome` tag
    pub fn kind(&self) -> &'static str {
        match self {
            AllocationOutcome::Assigned { .. } => "assigned",
            AllocationOutcome::AlreadyAssigned { .. } => "already_assigned",
            AllocationOutcome::NoEligibleAgent => "no_eligible_agent",
            AllocationOutcome::NotFound => "not_found",
            AllocationOutcome::NotOpen { .. } => "not_open",
        }
    }
}

/// Assigns open service requests to the stalest eligible agent.
///
/// Selection and commit are not locked in-process. Instead the commit is a
/// conditional update on the timestamp read during selection; losing that
/// race sends the allocator back to selection with a fresh read, up to
/// `max_attempts` times. Any number of allocator instances may share one
/// store.
pub struct RequestAllocator {
    requests: Arc<dyn RequestStore>,
    agents: Arc<dyn AgentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: AllocationConfig,
}

impl RequestAllocator {
    pub fn new(
        requests: Arc<dyn RequestStore>,
        agents: Arc<dyn AgentStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: AllocationConfig,
    ) -> Self {
        Self {
            requests,
            agents,
            notifier,
            clock,
            config,
        }
    }

    /// Assign `request_id` to the next agent in rotation
    #[instrument(skip(self), fields(attempts = self.config.max_attempts))]
    pub async fn assign(&self, request_id: &str) -> Result<AllocationOutcome> {
        let max_attempts = self.config.max_attempts.max(1);
        let backoff = self.config.retry_backoff();

        let mut request = self.requests.get_request(request_id).await?;

        for attempt in 1..=max_attempts {
            let current = match settle(request.as_ref()) {
                Ok(current) => current,
                Err(outcome) => {
                    debug!(?outcome, "Request needs no allocation");
                    return Ok(outcome);
                }
            };

            let candidates = self.agents.eligible_agents().await?;
            let Some(selected) = selection::select_next(&candidates) else {
                info!("No eligible agents; request stays open");
                return Ok(AllocationOutcome::NoEligibleAgent);
            };

            let assignment = Assignment {
                request_id: current.id.clone(),
                agent_id: selected.id.clone(),
                previous_assigned_at: selected.last_request_assigned_at,
                assigned_at: selection::next_assignment_time(
                    self.clock.now(),
                    selected.last_request_assigned_at,
                ),
            };

            match self.requests.commit_assignment(&assignment).await? {
                CommitOutcome::Committed => {
                    info!(
                        agent_id = %assignment.agent_id,
                        attempt,
                        previous = ?assignment.previous_assigned_at,
                        "Request assigned"
                    );
                    self.notify(selected, current).await;
                    return Ok(AllocationOutcome::Assigned {
                        agent_id: assignment.agent_id,
                        assigned_at: assignment.assigned_at,
                        previous_assigned_at: assignment.previous_assigned_at,
                    });
                }
                CommitOutcome::AgentChanged => {
                    debug!(agent_id = %assignment.agent_id, attempt, "Agent slot taken concurrently, reselecting");
                    if attempt < max_attempts && !backoff.is_zero() {
                        tokio::time::sleep(backoff * attempt).await;
                    }
                }
                CommitOutcome::RequestChanged => {
                    debug!(attempt, "Request changed concurrently, re-reading");
                }
            }

            request = self.requests.get_request(request_id).await?;
        }

        // The last re-read may already show the request settled elsewhere
        if let Err(outcome) = settle(request.as_ref()) {
            return Ok(outcome);
        }

        warn!(attempts = max_attempts, "Allocation gave up after repeated conflicts");
        Err(Error::AllocationContention {
            request_id: request_id.to_string(),
            attempts: max_attempts,
        })
    }

    async fn notify(&self, agent: &Agent, request: &ServiceRequest) {
        if let Err(e) = self.notifier.request_assigned(agent, request).await {
            warn!(agent_id = %agent.id, request_id = %request.id, error = %e, "Assignment notification failed");
        }
    }
}

/// `Ok` with the request when it still needs an agent, otherwise the
/// outcome to report without touching anything.
fn settle(request: Option<&ServiceRequest>) -> std::result::Result<&ServiceRequest, AllocationOutcome> {
    let Some(request) = request else {
        return Err(AllocationOutcome::NotFound);
    };
    if let Some(agent_id) = &request.assigned_agent_id {
        return Err(AllocationOutcome::AlreadyAssigned {
            agent_id: agent_id.clone(),
        });
    }
    if request.status != RequestStatus::Open {
        return Err(AllocationOutcome::NotOpen {
            status: request.status,
        });
    }
    Ok(request)
}

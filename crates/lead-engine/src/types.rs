//! Core types for the lead engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::validation::{validate_budget_range, validate_not_blank, validate_phone};

/// Declares a closed set of lowercase string values stored in TEXT columns.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(crate::Error::Validation(format!(
                        "unknown {} '{}'", stringify!($name), other
                    ))),
                }
            }
        }
    };
}

string_enum! {
    /// Account role
    pub enum UserRole {
        User => "user",
        Landlord => "landlord",
        Agent => "agent",
        Admin => "admin",
    }
}

string_enum! {
    /// Admin review state of an agent application
    pub enum VerificationStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
    }
}

string_enum! {
    /// Agent fee state
    pub enum PaymentStatus {
        Unpaid => "unpaid",
        Paid => "paid",
    }
}

string_enum! {
    /// Service request lifecycle
    pub enum RequestStatus {
        Open => "open",
        Assigned => "assigned",
        Withdrawn => "withdrawn",
        Completed => "completed",
    }
}

string_enum! {
    pub enum Urgency {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

string_enum! {
    pub enum NotificationChannel {
        Email => "email",
    }
}

string_enum! {
    /// Delivery state of an outbox notification
    pub enum NotificationStatus {
        Pending => "pending",
        Sent => "sent",
        Failed => "failed",
    }
}

impl Default for Urgency {
    fn default() -> Self {
        Urgency::Normal
    }
}

/// Internal user record mapped from an identity-provider identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub external_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity sync payload: create the user on first sight, refresh contact
/// details afterwards. `role` only applies when the row is created.
#[derive(Debug, Clone)]
pub struct UpsertUser {
    pub external_id: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: UserRole,
}

/// Agent profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub verification_status: VerificationStatus,
    pub payment_status: PaymentStatus,
    pub last_request_assigned_at: Option<DateTime<Utc>>,
    pub verification_notes: Option<String>,
    pub verification_reviewed_at: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Approved and paid
    pub fn is_eligible(&self) -> bool {
        self.verification_status == VerificationStatus::Approved
            && self.payment_status == PaymentStatus::Paid
    }
}

/// Fields for a new agent application
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub user_id: String,
    pub full_name: String,
    pub email: String,
}

/// Admin listing filter
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFilter {
    pub verification_status: Option<VerificationStatus>,
    pub payment_status: Option<PaymentStatus>,
}

/// Client service request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: String,
    pub client_user_id: Option<String>,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: String,
    pub request_type: String,
    pub property_type: String,
    pub location: String,
    pub budget_min: Option<i64>,
    pub budget_max: Option<i64>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub description: Option<String>,
    pub urgency: Urgency,
    pub status: RequestStatus,
    pub assigned_agent_id: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    /// Agent has reached out to the client
    pub is_contacted: bool,
    /// Agent's working note on the request
    pub comment: Option<String>,
    pub comment_updated_at: Option<DateTime<Utc>>,
    pub withdrawn_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

/// Client submission
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_budget_range"))]
pub struct CreateServiceRequest {
    #[validate(length(min = 1, max = 120), custom(function = "validate_not_blank"))]
    pub client_name: String,

    #[validate(email)]
    pub client_email: String,

    #[validate(custom(function = "validate_phone"))]
    pub client_phone: String,

    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub request_type: String,

    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub property_type: String,

    #[validate(length(min = 1, max = 200), custom(function = "validate_not_blank"))]
    pub location: String,

    #[validate(range(min = 0))]
    pub budget_min: Option<i64>,

    #[validate(range(min = 0))]
    pub budget_max: Option<i64>,

    #[validate(range(min = 0, max = 50))]
    pub bedrooms: Option<i32>,

    #[validate(range(min = 0, max = 50))]
    pub bathrooms: Option<i32>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,

    #[serde(default)]
    pub urgency: Urgency,
}

/// Notification outbox record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub agent_id: Option<String>,
    pub channel: NotificationChannel,
    pub subject: String,
    pub message: String,
    pub service_request_id: Option<String>,
    pub status: NotificationStatus,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: String,
    pub agent_id: Option<String>,
    pub channel: NotificationChannel,
    pub subject: String,
    pub message: String,
    pub service_request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A selected agent/request pair about to be committed.
///
/// `previous_assigned_at` is the agent's timestamp as read during selection;
/// the commit only applies if the stored value still matches it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub request_id: String,
    pub agent_id: String,
    pub previous_assigned_at: Option<DateTime<Utc>>,
    pub assigned_at: DateTime<Utc>,
}

/// Result of a conditional assignment commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Both rows updated in one transaction
    Committed,
    /// The agent's timestamp or eligibility moved since selection
    AgentChanged,
    /// The request is no longer open and unassigned
    RequestChanged,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_string_enums_round_trip_through_text() {
        assert_eq!(VerificationStatus::from_str("approved").unwrap(), VerificationStatus::Approved);
        assert_eq!(PaymentStatus::Paid.as_str(), "paid");
        assert_eq!(RequestStatus::Withdrawn.to_string(), "withdrawn");
        assert!(PaymentStatus::from_str("free").is_err());
    }

    #[test]
    fn test_urgency_defaults_to_normal_when_omitted() {
        let body = serde_json::json!({
            "clientName": "Dana",
            "clientEmail": "dana@example.com",
            "clientPhone": "+1 876 555 0100",
            "requestType": "buy",
            "propertyType": "house",
            "location": "Kingston"
        });
        let request: CreateServiceRequest = serde_json::from_value(body).unwrap();
        assert_eq!(request.urgency, Urgency::Normal);
        assert!(request.validate().is_ok());
    }
}

//! # Leadflow Engine
//!
//! Fair allocation of client service requests to real-estate agents.
//!
//! This crate provides:
//! - Typed record storage in SQLite (users, agents, requests, notifications)
//! - The request allocator: round-robin by staleness with an
//!   optimistic-concurrency commit
//! - Best-effort assignment and verification notifications
//! - Agent administration and a REST API over all of it
//!
//! ## Architecture
//!
//! The allocator talks to the store only through the traits in [`store`],
//! so any number of allocator instances can share one database. Role
//! checks live in [`access`]; HTTP handlers stay thin.

pub mod access;
pub mod allocation;
pub mod api;
pub mod clock;
pub mod config;
pub mod database;
pub mod error;
pub mod notify;
pub mod server;
pub mod service;
pub mod store;
pub mod types;
pub mod validation;

pub use access::{AccessControl, AgentCaller, RequestManager, CALLER_HEADER};
pub use allocation::{AllocationOutcome, RequestAllocator};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AllocationConfig, DatabaseConfig, LeadflowConfig, NotificationConfig};
pub use database::{Database, SqliteRecordStore};
pub use error::{Error, Result};
pub use notify::{DisabledNotifier, Notifier, NotifyError, OutboxNotifier};
pub use server::{LeadServer, LeadServerBuilder};
pub use service::{
    LeadService, RegisterAgent, RequestComment, RequestCreated, SyncUser, VerifiedAgent,
};
pub use store::{AgentStore, NotificationStore, RequestStore, UserStore};
pub use types::{
    Agent, AgentFilter, CreateServiceRequest, Notification, PaymentStatus, RequestStatus,
    ServiceRequest, Urgency, User, UserRole, VerificationStatus,
};

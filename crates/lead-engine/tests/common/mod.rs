//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

use leadflow_engine::clock::format_timestamp;
use leadflow_engine::types::{NewAgent, UpsertUser};
use leadflow_engine::{
    Agent, AgentStore, AllocationConfig, Clock, CreateServiceRequest, Database, DatabaseConfig,
    ManualClock, NotificationConfig, OutboxNotifier, PaymentStatus, RequestAllocator,
    RequestStore, ServiceRequest, SqliteRecordStore, Urgency, UserRole, UserStore,
    VerificationStatus,
};

/// Fixed origin for test clocks
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

pub fn at(seconds: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(seconds)
}

pub async fn memory_store() -> SqliteRecordStore {
    SqliteRecordStore::new(Database::new_in_memory().await.unwrap())
}

pub fn file_config(dir: &TempDir) -> DatabaseConfig {
    DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("leadflow.db").display()),
        max_connections: 4,
        ..Default::default()
    }
}

/// File-backed store with the schema applied
pub async fn file_store(dir: &TempDir) -> SqliteRecordStore {
    let database = Database::connect(&file_config(dir)).await.unwrap();
    database.migrate().await.unwrap();
    SqliteRecordStore::new(database)
}

pub fn allocation_config() -> AllocationConfig {
    AllocationConfig {
        max_attempts: 20,
        retry_backoff_ms: 5,
    }
}

pub fn allocator(store: &SqliteRecordStore, clock: Arc<ManualClock>) -> RequestAllocator {
    let clock: Arc<dyn Clock> = clock;
    let notifier = Arc::new(OutboxNotifier::new(
        Arc::new(store.clone()),
        clock.clone(),
        NotificationConfig::default(),
    ));
    RequestAllocator::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        notifier,
        clock,
        allocation_config(),
    )
}

/// Agent with the given review and fee state and assignment history
pub async fn add_agent(
    store: &SqliteRecordStore,
    name: &str,
    verification: VerificationStatus,
    payment: PaymentStatus,
    last_assigned: Option<DateTime<Utc>>,
) -> Agent {
    let user = store
        .upsert_user(
            UpsertUser {
                external_id: format!("ext-{}", name),
                email: Some(format!("{}@agents.test", name)),
                full_name: Some(name.to_string()),
                role: UserRole::User,
            },
            t0(),
        )
        .await
        .unwrap();

    let agent = store
        .create_agent(
            NewAgent {
                user_id: user.id,
                full_name: name.to_string(),
                email: format!("{}@agents.test", name),
            },
            t0(),
        )
        .await
        .unwrap();

    store.update_verification(&agent.id, verification, None, t0()).await.unwrap();
    store.update_payment(&agent.id, payment, t0()).await.unwrap();
    if let Some(last) = last_assigned {
        set_last_assigned(store, &agent.id, last).await;
    }
    store.get_agent(&agent.id).await.unwrap().unwrap()
}

pub async fn eligible_agent(
    store: &SqliteRecordStore,
    name: &str,
    last_assigned: Option<DateTime<Utc>>,
) -> Agent {
    add_agent(store, name, VerificationStatus::Approved, PaymentStatus::Paid, last_assigned).await
}

pub async fn set_last_assigned(store: &SqliteRecordStore, agent_id: &str, at: DateTime<Utc>) {
    sqlx::query("UPDATE agents SET last_request_assigned_at = ? WHERE id = ?")
        .bind(format_timestamp(at))
        .bind(agent_id)
        .execute(store.database().pool())
        .await
        .unwrap();
}

pub fn request_input(label: &str) -> CreateServiceRequest {
    CreateServiceRequest {
        client_name: format!("Client {}", label),
        client_email: format!("client-{}@example.com", label),
        client_phone: "+1 555 010 2030".to_string(),
        request_type: "rent".to_string(),
        property_type: "apartment".to_string(),
        location: "Lisbon".to_string(),
        budget_min: Some(900),
        budget_max: Some(1_400),
        bedrooms: Some(2),
        bathrooms: Some(1),
        description: None,
        urgency: Urgency::Normal,
    }
}

pub async fn open_request(store: &SqliteRecordStore, label: &str, created: DateTime<Utc>) -> ServiceRequest {
    store.create_request(request_input(label), None, created).await.unwrap()
}

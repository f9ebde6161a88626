//! Independent allocator instances racing on one database file.
//!
//! Each allocator gets its own connection pool so the only coordination
//! between them is the store itself.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tempfile::TempDir;

use common::*;
use leadflow_engine::{
    AgentStore, AllocationOutcome, Database, ManualClock, RequestAllocator, RequestStatus,
    RequestStore, SqliteRecordStore,
};

/// `count` allocators over separate pools on the same file
async fn racing_allocators(
    dir: &TempDir,
    clock: Arc<ManualClock>,
    count: usize,
) -> Vec<Arc<RequestAllocator>> {
    let mut allocators = Vec::with_capacity(count);
    for _ in 0..count {
        let database = Database::connect(&file_config(dir)).await.unwrap();
        let store = SqliteRecordStore::new(database);
        allocators.push(Arc::new(allocator(&store, clock.clone())));
    }
    allocators
}

async fn allocate_all(
    allocators: &[Arc<RequestAllocator>],
    request_ids: &[String],
) -> Vec<AllocationOutcome> {
    let handles = request_ids.iter().enumerate().map(|(i, id)| {
        let allocator = allocators[i % allocators.len()].clone();
        let id = id.clone();
        tokio::spawn(async move { allocator.assign(&id).await })
    });

    join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_agent_slot_is_never_double_booked() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;
    // Frozen clock: every commit must still produce a distinct timestamp
    let clock = Arc::new(ManualClock::new(at(7_200)));
    let agent = eligible_agent(&store, "solo", None).await;

    let mut request_ids = Vec::new();
    for i in 0..6 {
        request_ids.push(open_request(&store, &format!("r{}", i), at(7_000)).await.id);
    }

    let allocators = racing_allocators(&dir, clock, 2).await;
    let outcomes = allocate_all(&allocators, &request_ids).await;

    assert!(outcomes.iter().all(|o| o.is_new_assignment()), "{:?}", outcomes);

    let mut stamps = HashSet::new();
    for id in &request_ids {
        let request = store.get_request(id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Assigned);
        assert_eq!(request.assigned_agent_id.as_deref(), Some(agent.id.as_str()));
        assert!(stamps.insert(request.assigned_at.unwrap()), "slot reused by {}", id);
    }

    let agent = store.get_agent(&agent.id).await.unwrap().unwrap();
    assert_eq!(agent.last_request_assigned_at, stamps.iter().max().copied());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_allocations_split_evenly() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;
    let clock = Arc::new(ManualClock::new(at(7_200)));
    let first = eligible_agent(&store, "first", None).await;
    let second = eligible_agent(&store, "second", None).await;

    let mut request_ids = Vec::new();
    for i in 0..10 {
        request_ids.push(open_request(&store, &format!("r{}", i), at(7_000)).await.id);
    }

    let allocators = racing_allocators(&dir, clock, 3).await;
    let outcomes = allocate_all(&allocators, &request_ids).await;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for outcome in &outcomes {
        let agent_id = outcome.agent_id().expect("every request gets an agent");
        *counts.entry(agent_id.to_string()).or_default() += 1;
    }

    assert_eq!(counts.get(&first.id), Some(&5));
    assert_eq!(counts.get(&second.id), Some(&5));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_on_the_same_request_assigns_it_once() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir).await;
    let clock = Arc::new(ManualClock::new(at(7_200)));
    eligible_agent(&store, "first", None).await;
    eligible_agent(&store, "second", None).await;
    let request = open_request(&store, "contested", at(7_000)).await;

    let allocators = racing_allocators(&dir, clock, 4).await;
    let same_request: Vec<String> = (0..4).map(|_| request.id.clone()).collect();
    let outcomes = allocate_all(&allocators, &same_request).await;

    let winners: Vec<_> = outcomes.iter().filter(|o| o.is_new_assignment()).collect();
    assert_eq!(winners.len(), 1, "{:?}", outcomes);
    let winner = winners[0].agent_id().unwrap();
    for outcome in &outcomes {
        assert_eq!(outcome.agent_id(), Some(winner));
    }

    // Only the winning agent's slot advanced
    let agents = store.eligible_agents().await.unwrap();
    let stamped = agents.iter().filter(|a| a.last_request_assigned_at.is_some()).count();
    assert_eq!(stamped, 1);
}

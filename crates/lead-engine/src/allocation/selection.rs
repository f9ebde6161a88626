//! Round-robin-by-staleness selection.
//!
//! The next agent is the eligible one whose `last_request_assigned_at` is
//! oldest, with "never assigned" oldest of all and agent id breaking ties.
//! An agent skipped while ineligible keeps its old timestamp and therefore
//! rises to the front as soon as it becomes eligible again.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};

use crate::clock::to_stored_precision;
use crate::types::Agent;

/// Total order over candidates: stalest first, then by id
pub fn staleness_order(a: &Agent, b: &Agent) -> Ordering {
    // `None` sorts before any `Some`, so never-assigned agents lead
    a.last_request_assigned_at
        .cmp(&b.last_request_assigned_at)
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort candidates into assignment order, dropping ineligible ones
pub fn order_candidates(candidates: &[Agent]) -> Vec<&Agent> {
    let mut ordered: Vec<&Agent> = candidates.iter().filter(|a| a.is_eligible()).collect();
    ordered.sort_by(|a, b| staleness_order(a, b));
    ordered
}

/// The agent that should receive the next request
pub fn select_next(candidates: &[Agent]) -> Option<&Agent> {
    candidates
        .iter()
        .filter(|a| a.is_eligible())
        .min_by(|a, b| staleness_order(a, b))
}

/// Timestamp to write for an assignment made at `now`.
///
/// Always strictly later than the agent's previous timestamp, so a
/// successful commit changes the value other allocators compare against and
/// the per-agent sequence never goes backwards under clock skew.
pub fn next_assignment_time(
    now: DateTime<Utc>,
    previous: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let now = to_stored_precision(now);
    match previous {
        Some(previous) if now <= previous => previous + Duration::microseconds(1),
        _ => now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PaymentStatus, VerificationStatus};
    use chrono::TimeZone;
    use std::collections::HashMap;

    fn agent(id: &str, last: Option<DateTime<Utc>>) -> Agent {
        let created = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        Agent {
            id: id.to_string(),
            user_id: format!("user-{}", id),
            full_name: format!("Agent {}", id),
            email: format!("{}@agents.test", id),
            verification_status: VerificationStatus::Approved,
            payment_status: PaymentStatus::Paid,
            last_request_assigned_at: last,
            verification_notes: None,
            verification_reviewed_at: None,
            payment_date: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_never_assigned_agent_goes_first() {
        let agents = vec![agent("b", Some(day(1))), agent("c", Some(day(2))), agent("a", None)];
        assert_eq!(select_next(&agents).unwrap().id, "a");
    }

    #[test]
    fn test_oldest_timestamp_wins() {
        let agents = vec![agent("x", Some(day(5))), agent("y", Some(day(3))), agent("z", Some(day(4)))];
        assert_eq!(select_next(&agents).unwrap().id, "y");
    }

    #[test]
    fn test_ties_break_by_id() {
        let agents = vec![agent("m", None), agent("k", None), agent("t", Some(day(1)))];
        assert_eq!(select_next(&agents).unwrap().id, "k");

        let agents = vec![agent("q", Some(day(2))), agent("p", Some(day(2)))];
        assert_eq!(select_next(&agents).unwrap().id, "p");
    }

    #[test]
    fn test_ineligible_agents_are_skipped() {
        let mut unpaid = agent("a", None);
        unpaid.payment_status = PaymentStatus::Unpaid;
        let mut pending = agent("b", None);
        pending.verification_status = VerificationStatus::Pending;
        let agents = vec![unpaid, pending, agent("c", Some(day(9)))];

        assert_eq!(select_next(&agents).unwrap().id, "c");
        assert_eq!(order_candidates(&agents).len(), 1);
    }

    #[test]
    fn test_empty_pool() {
        assert!(select_next(&[]).is_none());
    }

    #[test]
    fn test_order_candidates_full_order() {
        let agents = vec![
            agent("d", Some(day(3))),
            agent("b", None),
            agent("c", Some(day(1))),
            agent("a", None),
        ];
        let ids: Vec<&str> = order_candidates(&agents).iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_next_assignment_time_is_strictly_increasing() {
        let now = day(10);
        assert_eq!(next_assignment_time(now, None), now);
        assert_eq!(next_assignment_time(now, Some(day(9))), now);
        assert_eq!(next_assignment_time(now, Some(now)), now + Duration::microseconds(1));
        assert_eq!(next_assignment_time(day(8), Some(now)), now + Duration::microseconds(1));
    }

    /// Serial simulation of the allocator's select-then-stamp loop
    fn simulate(mut agents: Vec<Agent>, rounds: usize, start: DateTime<Utc>) -> Vec<String> {
        let mut picks = Vec::with_capacity(rounds);
        let mut now = start;
        for _ in 0..rounds {
            let chosen = select_next(&agents).unwrap().id.clone();
            let slot = agents.iter_mut().find(|a| a.id == chosen).unwrap();
            slot.last_request_assigned_at =
                Some(next_assignment_time(now, slot.last_request_assigned_at));
            picks.push(chosen);
            now += Duration::seconds(1);
        }
        picks
    }

    #[test]
    fn test_rotation_example() {
        let agents = vec![agent("A", None), agent("B", Some(day(1))), agent("C", Some(day(2)))];
        let picks = simulate(agents, 4, day(20));
        assert_eq!(picks, vec!["A", "B", "C", "A"]);
    }

    #[test]
    fn test_starvation_freedom() {
        for n in 1..=6usize {
            for k in 0..=(2 * n) {
                let agents: Vec<Agent> = (0..n)
                    .map(|i| agent(&format!("agent-{:02}", i), if i % 2 == 0 { None } else { Some(day(1)) }))
                    .collect();
                let total = n + k;
                let picks = simulate(agents, total, day(15));

                // Every prefix stays balanced: nobody gets a (floor+2)th
                // request before everyone has reached floor.
                let mut counts: HashMap<&str, usize> = HashMap::new();
                for pick in &picks {
                    *counts.entry(pick.as_str()).or_default() += 1;
                    let max = counts.values().copied().max().unwrap_or(0);
                    let min = if counts.len() < n { 0 } else { counts.values().copied().min().unwrap_or(0) };
                    assert!(max - min <= 1, "n={} k={} unbalanced: {:?}", n, k, counts);
                }

                let floor = total / n;
                let ceil = (total + n - 1) / n;
                for i in 0..n {
                    let got = counts.get(format!("agent-{:02}", i).as_str()).copied().unwrap_or(0);
                    assert!(got >= floor && got <= ceil, "n={} k={} agent {} got {}", n, k, i, got);
                }
            }
        }
    }

    #[test]
    fn test_same_instant_assignments_still_rotate() {
        // A frozen clock must not let one agent take every request
        let mut agents = vec![agent("A", None), agent("B", None)];
        let frozen = day(12);
        let mut picks = Vec::new();
        for _ in 0..4 {
            let chosen = select_next(&agents).unwrap().id.clone();
            let slot = agents.iter_mut().find(|a| a.id == chosen).unwrap();
            slot.last_request_assigned_at =
                Some(next_assignment_time(frozen, slot.last_request_assigned_at));
            picks.push(chosen);
        }
        assert_eq!(picks, vec!["A", "B", "A", "B"]);
    }
}

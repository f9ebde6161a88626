//! # Request Allocation
//!
//! Fair distribution of client service requests among agents who are both
//! approved and paid. Each new request goes to the agent whose last
//! assignment is oldest (never-assigned agents first), which rotates the
//! pool without keeping a separate queue or counter.
//!
//! ```text
//!   assign(request_id)
//!         │
//!         ▼
//!   read request ── missing / assigned / closed ──► structured outcome
//!         │
//!         ▼
//!   read eligible agents ── none ──► NoEligibleAgent (request stays open)
//!         │
//!         ▼
//!   pick stalest (null first, id tie-break)
//!         │
//!         ▼
//!   commit both rows in one transaction,
//!   conditional on the agent's timestamp ── lost race ──► reselect
//!         │
//!         ▼
//!   queue notification (best effort) ──► Assigned
//! ```

pub mod allocator;
pub mod selection;

pub use allocator::{AllocationOutcome, RequestAllocator};
pub use selection::{next_assignment_time, order_candidates, select_next, staleness_order};

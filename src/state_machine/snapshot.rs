//! Read-only snapshot of workflow state.
//!
//! Collaborators never mutate this; they receive fresh snapshots via the
//! watch channel after every transition, or on demand from the
//! coordinator's getter.

use crate::pipeline::schema::{ImplementResult, PlanResult, ReviewResult};
use crate::state_machine::PipelineStatus;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    /// Current workflow status.
    pub status: PipelineStatus,
    /// The objective this run was started with.
    pub objective: String,
    /// Run ID (UUID) correlating events and log files.
    pub run_id: String,
    /// Parsed plan; present from AwaitingApproval onward.
    pub plan: Option<PlanResult>,
    /// Parsed implementation; present from Reviewing onward.
    pub implementation: Option<ImplementResult>,
    /// Parsed review; present once Completed.
    pub review: Option<ReviewResult>,
    /// Failure detail; set only when status is Failed.
    pub failure_reason: Option<String>,
}

//! Commands that can mutate workflow state.
//!
//! All state changes MUST go through the state machine's `apply()` method;
//! there is no other way to move a run between statuses.

use crate::pipeline::schema::{ImplementResult, PlanResult, ReviewResult};
use crate::stage::StageKind;

#[derive(Debug, Clone)]
pub enum StateCommand {
    /// Begin the run (validates current status is Idle), enters Planning.
    StartRun,
    /// Record the extracted plan and move to AwaitingApproval.
    RecordPlan { plan: PlanResult },
    /// Resolve the approval gate: true enters Implementing, false ends the
    /// run as Cancelled.
    ResolveApproval { approved: bool },
    /// Record the extracted implementation and move to Reviewing.
    RecordImplementation { implementation: ImplementResult },
    /// Record the extracted review and complete the run.
    RecordReview { review: ReviewResult },
    /// A stage invocation failed; the run ends as Failed with the
    /// invoker's failure detail.
    FailStage { stage: StageKind, reason: String },
    /// The caller stopped the run; ends as Cancelled from any live status.
    Abort { reason: String },
}

//! Events emitted by the state machine.
//!
//! Returned from `apply()` for the caller to fan out, and serialized into
//! the run log for later reconstruction.

use crate::stage::StageKind;
use crate::state_machine::PipelineStatus;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StateEvent {
    StatusChanged {
        from: PipelineStatus,
        to: PipelineStatus,
    },
    PlanRecorded {
        tasks: usize,
    },
    ApprovalResolved {
        approved: bool,
    },
    ImplementationRecorded {
        changed_files: usize,
    },
    ReviewRecorded {
        approved: bool,
        score: Option<u8>,
    },
    RunFailed {
        stage: StageKind,
        reason: String,
    },
    RunAborted {
        reason: String,
    },
}

//! Pipeline event fan-out.
//!
//! Collaborators (the console printer, or any embedding host) receive these
//! over an unbounded channel. Sends never block and a closed receiver is
//! ignored, so emitting events can never stall or fail a run.

use crate::pipeline::schema::{ImplementResult, PlanResult, ReviewResult};
use crate::stage::StageKind;
use crate::state_machine::{PipelineStatus, StateSnapshot};
use tokio::sync::mpsc;

/// Typed payload delivered with a stage-result event.
#[derive(Debug, Clone)]
pub enum StageResultPayload {
    Plan(PlanResult),
    Implement(ImplementResult),
    Review(ReviewResult),
}

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// The workflow status changed (one event per state transition).
    StatusChanged { status: PipelineStatus },
    /// A stage's child process has been spawned.
    StageStarted { stage: StageKind },
    /// One line of child output, in arrival order. Stderr lines carry a
    /// `[stderr]` prefix.
    StageLog { stage: StageKind, line: String },
    /// The stage invocation finished; always the last process-level event
    /// for that stage.
    StageCompleted { stage: StageKind, success: bool },
    /// The stage's output was extracted into a typed result. Emitted even
    /// when extraction degraded to a placeholder.
    StageResultReady {
        stage: StageKind,
        result: StageResultPayload,
    },
    /// The run reached a terminal status.
    RunComplete { snapshot: StateSnapshot },
}

/// Cloneable sender handle used throughout the pipeline.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        Self { tx }
    }

    pub fn status_changed(&self, status: PipelineStatus) {
        let _ = self.tx.send(PipelineEvent::StatusChanged { status });
    }

    pub fn stage_started(&self, stage: StageKind) {
        let _ = self.tx.send(PipelineEvent::StageStarted { stage });
    }

    pub fn stage_log(&self, stage: StageKind, line: String) {
        let _ = self.tx.send(PipelineEvent::StageLog { stage, line });
    }

    pub fn stage_completed(&self, stage: StageKind, success: bool) {
        let _ = self.tx.send(PipelineEvent::StageCompleted { stage, success });
    }

    pub fn stage_result(&self, stage: StageKind, result: StageResultPayload) {
        let _ = self.tx.send(PipelineEvent::StageResultReady { stage, result });
    }

    pub fn run_complete(&self, snapshot: StateSnapshot) {
        let _ = self.tx.send(PipelineEvent::RunComplete { snapshot });
    }
}

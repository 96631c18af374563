//! Centralized state machine for the pipeline run.
//!
//! This module is the ONLY place status transitions happen. The machine
//! owns the mutable workflow state, validates commands against the fixed
//! transition order, emits events, and broadcasts snapshots to subscribers
//! via a watch channel.

mod commands;
mod events;
mod snapshot;

pub use commands::StateCommand;
pub use events::StateEvent;
pub use snapshot::StateSnapshot;

use crate::pipeline::schema::{ImplementResult, PlanResult, ReviewResult};
use crate::run_log::RunLog;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Workflow status. Transitions follow a fixed linear order with a single
/// fork at the approval gate; Completed, Failed, and Cancelled are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Idle,
    Planning,
    AwaitingApproval,
    Implementing,
    Reviewing,
    Completed,
    Failed,
    Cancelled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PipelineStatus::Completed | PipelineStatus::Failed | PipelineStatus::Cancelled
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            PipelineStatus::Idle => "Idle",
            PipelineStatus::Planning => "Planning",
            PipelineStatus::AwaitingApproval => "Awaiting Approval",
            PipelineStatus::Implementing => "Implementing",
            PipelineStatus::Reviewing => "Reviewing",
            PipelineStatus::Completed => "Completed",
            PipelineStatus::Failed => "Failed",
            PipelineStatus::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The single mutable workflow record. Owned exclusively by the machine;
/// everyone else sees snapshots.
struct WorkflowState {
    status: PipelineStatus,
    objective: String,
    run_id: String,
    plan: Option<PlanResult>,
    implementation: Option<ImplementResult>,
    review: Option<ReviewResult>,
    failure_reason: Option<String>,
}

impl WorkflowState {
    fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            status: self.status,
            objective: self.objective.clone(),
            run_id: self.run_id.clone(),
            plan: self.plan.clone(),
            implementation: self.implementation.clone(),
            review: self.review.clone(),
            failure_reason: self.failure_reason.clone(),
        }
    }
}

/// The only place state transitions happen. Validates commands, emits
/// events, broadcasts snapshots.
pub struct PipelineStateMachine {
    state: WorkflowState,
    snapshot_tx: watch::Sender<StateSnapshot>,
    run_log: Option<Arc<RunLog>>,
    seq: u64,
}

impl PipelineStateMachine {
    /// Creates a machine in Idle and a watch receiver for snapshots.
    pub fn new(
        objective: &str,
        run_id: &str,
        run_log: Option<Arc<RunLog>>,
    ) -> (Self, watch::Receiver<StateSnapshot>) {
        let state = WorkflowState {
            status: PipelineStatus::Idle,
            objective: objective.to_string(),
            run_id: run_id.to_string(),
            plan: None,
            implementation: None,
            review: None,
            failure_reason: None,
        };
        let (snapshot_tx, snapshot_rx) = watch::channel(state.snapshot());
        let machine = Self {
            state,
            snapshot_tx,
            run_log,
            seq: 0,
        };
        (machine, snapshot_rx)
    }

    pub fn status(&self) -> PipelineStatus {
        self.state.status
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    /// All mutations go through here. Returns the events produced by the
    /// command; broadcasts a fresh snapshot on success.
    pub fn apply(&mut self, command: StateCommand) -> Result<Vec<StateEvent>> {
        self.seq += 1;

        let events = self.apply_internal(command)?;

        if let Some(log) = &self.run_log {
            for event in &events {
                log.log_state_event(self.seq, event);
            }
        }

        let _ = self.snapshot_tx.send(self.state.snapshot());
        Ok(events)
    }

    fn apply_internal(&mut self, command: StateCommand) -> Result<Vec<StateEvent>> {
        use StateCommand::*;
        use StateEvent::*;

        if self.state.status.is_terminal() {
            bail!(
                "no transitions out of terminal status {:?}",
                self.state.status
            );
        }

        match command {
            StartRun => {
                if self.state.status != PipelineStatus::Idle {
                    bail!("cannot start a run from status {:?}", self.state.status);
                }
                Ok(vec![self.transition(PipelineStatus::Planning)])
            }

            RecordPlan { plan } => {
                if self.state.status != PipelineStatus::Planning {
                    bail!("cannot record a plan from status {:?}", self.state.status);
                }
                let tasks = plan.tasks.len();
                self.state.plan = Some(plan);
                Ok(vec![
                    PlanRecorded { tasks },
                    self.transition(PipelineStatus::AwaitingApproval),
                ])
            }

            ResolveApproval { approved } => {
                if self.state.status != PipelineStatus::AwaitingApproval {
                    bail!(
                        "cannot resolve approval from status {:?}",
                        self.state.status
                    );
                }
                let next = if approved {
                    PipelineStatus::Implementing
                } else {
                    PipelineStatus::Cancelled
                };
                Ok(vec![ApprovalResolved { approved }, self.transition(next)])
            }

            RecordImplementation { implementation } => {
                if self.state.status != PipelineStatus::Implementing {
                    bail!(
                        "cannot record an implementation from status {:?}",
                        self.state.status
                    );
                }
                let changed_files = implementation.changed_files.len();
                self.state.implementation = Some(implementation);
                Ok(vec![
                    ImplementationRecorded { changed_files },
                    self.transition(PipelineStatus::Reviewing),
                ])
            }

            RecordReview { review } => {
                if self.state.status != PipelineStatus::Reviewing {
                    bail!("cannot record a review from status {:?}", self.state.status);
                }
                let approved = review.approved;
                let score = review.score;
                self.state.review = Some(review);
                Ok(vec![
                    ReviewRecorded { approved, score },
                    self.transition(PipelineStatus::Completed),
                ])
            }

            FailStage { stage, reason } => {
                let active = matches!(
                    self.state.status,
                    PipelineStatus::Planning
                        | PipelineStatus::Implementing
                        | PipelineStatus::Reviewing
                );
                if !active {
                    bail!(
                        "cannot fail a stage from status {:?}",
                        self.state.status
                    );
                }
                self.state.failure_reason = Some(reason.clone());
                Ok(vec![
                    RunFailed { stage, reason },
                    self.transition(PipelineStatus::Failed),
                ])
            }

            Abort { reason } => Ok(vec![
                RunAborted { reason },
                self.transition(PipelineStatus::Cancelled),
            ]),
        }
    }

    fn transition(&mut self, to: PipelineStatus) -> StateEvent {
        let from = self.state.status;
        self.state.status = to;
        StateEvent::StatusChanged { from, to }
    }
}

//! Pipeline coordination.
//!
//! `PipelineCoordinator` drives one workflow run end to end:
//! Plan, a user-approval gate, Implement, then Review. Each stage's request
//! is built from the previous stage's parsed result, executed through the
//! invoker, and extracted into a typed payload before the state machine
//! advances. A failed invocation at any stage ends the run; there are no
//! retries.

pub mod extract;
pub mod prompts;
pub mod schema;

use crate::config::PipelineConfig;
use crate::events::{EventSender, StageResultPayload};
use crate::invoker::{Invocation, ProcessInvoker};
use crate::run_log::RunLog;
use crate::stage::StageKind;
use crate::state_machine::{
    PipelineStateMachine, PipelineStatus, StateCommand, StateEvent, StateSnapshot,
};
use anyhow::{bail, Result};
use async_trait::async_trait;
use schema::PlanResult;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Decision point between Plan and Implement. Supplied by the caller when
/// starting a run; invoked exactly once per run with the parsed plan.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn decide(&self, plan: &PlanResult) -> Result<bool>;
}

/// Cloneable handle that stops the run from outside: kills any in-flight
/// child process and resolves a pending approval wait as not approved.
#[derive(Clone)]
pub struct StopHandle {
    cancel: Arc<watch::Sender<bool>>,
}

impl StopHandle {
    /// Idempotent. `send_replace` stores the flag even when no receiver is
    /// currently subscribed, so a stop between stages is not lost.
    pub fn stop(&self) {
        self.cancel.send_replace(true);
    }
}

enum ApprovalOutcome {
    Approved,
    Declined,
    Stopped(String),
}

/// Drives one workflow run. One run per instance; a consumed coordinator
/// refuses further `run` calls.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    working_dir: PathBuf,
    objective: String,
    machine: PipelineStateMachine,
    invoker: ProcessInvoker,
    events: EventSender,
    run_log: Option<Arc<RunLog>>,
    cancel: Arc<watch::Sender<bool>>,
}

impl PipelineCoordinator {
    pub fn new(
        config: PipelineConfig,
        objective: &str,
        working_dir: PathBuf,
        events: EventSender,
        run_log: Option<Arc<RunLog>>,
    ) -> (Self, watch::Receiver<StateSnapshot>) {
        let run_id = run_log
            .as_ref()
            .map(|log| log.run_id().to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (machine, snapshot_rx) = PipelineStateMachine::new(objective, &run_id, run_log.clone());
        let (cancel_tx, _) = watch::channel(false);

        let coordinator = Self {
            config,
            working_dir,
            objective: objective.to_string(),
            machine,
            invoker: ProcessInvoker::new(),
            events,
            run_log,
            cancel: Arc::new(cancel_tx),
        };
        (coordinator, snapshot_rx)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            cancel: Arc::clone(&self.cancel),
        }
    }

    pub fn snapshot(&self) -> StateSnapshot {
        self.machine.snapshot()
    }

    /// Runs the pipeline to a terminal status. Returns the final snapshot;
    /// `Err` is reserved for caller mistakes (reuse of a consumed
    /// coordinator) and internal faults, never for stage failures.
    pub async fn run(&mut self, approval: &dyn ApprovalGate) -> Result<StateSnapshot> {
        if self.machine.status() != PipelineStatus::Idle {
            bail!("coordinator already consumed; construct a new instance for another run");
        }
        self.apply(StateCommand::StartRun)?;

        let Some(raw) = self
            .execute_stage(StageKind::Plan, prompts::plan_prompt(&self.objective))
            .await?
        else {
            return Ok(self.finish());
        };
        let plan = extract::plan_from_response(&raw);
        self.events
            .stage_result(StageKind::Plan, StageResultPayload::Plan(plan.clone()));
        self.apply(StateCommand::RecordPlan { plan: plan.clone() })?;

        match self.await_approval(approval, &plan).await {
            ApprovalOutcome::Approved => {
                self.apply(StateCommand::ResolveApproval { approved: true })?;
            }
            ApprovalOutcome::Declined => {
                self.apply(StateCommand::ResolveApproval { approved: false })?;
                return Ok(self.finish());
            }
            ApprovalOutcome::Stopped(reason) => {
                self.apply(StateCommand::Abort { reason })?;
                return Ok(self.finish());
            }
        }

        let Some(raw) = self
            .execute_stage(
                StageKind::Implement,
                prompts::implement_prompt(&self.objective, &plan),
            )
            .await?
        else {
            return Ok(self.finish());
        };
        let implementation = extract::implementation_from_response(&raw);
        self.events.stage_result(
            StageKind::Implement,
            StageResultPayload::Implement(implementation.clone()),
        );
        self.apply(StateCommand::RecordImplementation {
            implementation: implementation.clone(),
        })?;

        let Some(raw) = self
            .execute_stage(StageKind::Review, prompts::review_prompt(&implementation))
            .await?
        else {
            return Ok(self.finish());
        };
        let review = extract::review_from_response(&raw);
        self.events
            .stage_result(StageKind::Review, StageResultPayload::Review(review.clone()));
        self.apply(StateCommand::RecordReview { review })?;

        Ok(self.finish())
    }

    /// Applies a command and forwards resulting status changes to
    /// collaborators.
    fn apply(&mut self, command: StateCommand) -> Result<()> {
        let events = self.machine.apply(command)?;
        for event in events {
            if let StateEvent::StatusChanged { to, .. } = event {
                self.events.status_changed(to);
            }
        }
        Ok(())
    }

    /// Invokes one stage and returns its raw output, or `None` when the
    /// run was moved to a terminal status (failure or cancellation).
    async fn execute_stage(&mut self, stage: StageKind, prompt: String) -> Result<Option<String>> {
        if *self.cancel.subscribe().borrow() {
            // Stopped between stages: the stage must not start at all.
            self.apply(StateCommand::Abort {
                reason: format!("stopped before {} stage", stage),
            })?;
            return Ok(None);
        }

        let agent = self.config.agent_for(stage)?;
        let invocation = Invocation {
            command: agent.command.clone(),
            fallback_commands: agent.fallback_commands.clone(),
            args: agent.args.clone(),
            prompt,
            env: agent
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            path_prepend: self.config.path_prepend.clone(),
        };
        let settings = self.config.settings_for(stage, &self.working_dir);

        let result = self
            .invoker
            .invoke(
                invocation,
                &settings,
                &self.events,
                Some(self.cancel.subscribe()),
            )
            .await?;

        if let Some(log) = &self.run_log {
            log.record_stage_output(stage, &result.raw_output);
            log.log_stage_outcome(stage, result.success, result.error_detail().as_deref());
        }

        if result.success {
            return Ok(Some(result.raw_output));
        }

        match result.failure {
            Some(kind) if kind.is_cancellation() => {
                self.apply(StateCommand::Abort {
                    reason: format!("stopped during {} stage", stage),
                })?;
            }
            Some(kind) => {
                tracing::warn!(
                    stage = %stage,
                    kind = kind.display_name(),
                    "stage invocation failed"
                );
                self.apply(StateCommand::FailStage {
                    stage,
                    reason: kind.detail(),
                })?;
            }
            None => {
                self.apply(StateCommand::FailStage {
                    stage,
                    reason: "stage failed without detail".to_string(),
                })?;
            }
        }
        Ok(None)
    }

    /// Suspends until the gate resolves or the run is stopped. No thread
    /// is parked and no stage work starts while waiting.
    async fn await_approval(
        &self,
        approval: &dyn ApprovalGate,
        plan: &PlanResult,
    ) -> ApprovalOutcome {
        let mut cancel_rx = self.cancel.subscribe();
        if *cancel_rx.borrow() {
            return ApprovalOutcome::Stopped("stopped before plan approval".to_string());
        }

        tokio::select! {
            res = cancel_rx.wait_for(|cancelled| *cancelled) => {
                let _ = res;
                ApprovalOutcome::Stopped("stopped while awaiting plan approval".to_string())
            }
            decision = approval.decide(plan) => match decision {
                Ok(true) => ApprovalOutcome::Approved,
                Ok(false) => ApprovalOutcome::Declined,
                Err(err) => ApprovalOutcome::Stopped(format!("approval gate failed: {}", err)),
            }
        }
    }

    fn finish(&self) -> StateSnapshot {
        let snapshot = self.machine.snapshot();
        self.events.run_complete(snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod tests;

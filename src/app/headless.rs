use crate::app::cli::Cli;
use crate::config::PipelineConfig;
use crate::events::{EventSender, PipelineEvent, StageResultPayload};
use crate::pipeline::schema::{excerpt, PlanResult};
use crate::pipeline::{ApprovalGate, PipelineCoordinator};
use crate::run_log::RunLog;
use crate::state_machine::{PipelineStatus, StateSnapshot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Approves every plan without prompting (`--yes`).
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn decide(&self, plan: &PlanResult) -> Result<bool> {
        eprintln!("{}", render_plan(plan));
        eprintln!("[approval] --yes supplied; proceeding to implementation");
        Ok(true)
    }
}

/// Renders the plan and reads a y/N decision from stdin.
pub struct StdinApproval;

#[async_trait]
impl ApprovalGate for StdinApproval {
    async fn decide(&self, plan: &PlanResult) -> Result<bool> {
        eprintln!("{}", render_plan(plan));
        eprintln!("Proceed with implementation? [y/N] ");

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        reader
            .read_line(&mut line)
            .await
            .context("Failed to read approval decision from stdin")?;
        Ok(matches!(
            line.trim().to_lowercase().as_str(),
            "y" | "yes"
        ))
    }
}

/// Plan summary for console display. All echoed text is excerpt-capped;
/// agent output is untrusted.
fn render_plan(plan: &PlanResult) -> String {
    let mut out = String::from("\n=== PROPOSED PLAN ===\n");

    if let Some(score) = plan.complexity_score {
        out.push_str(&format!("Complexity: {}/10\n", score));
    }

    out.push_str("Requirements:\n");
    if plan.requirements.is_empty() {
        out.push_str("  (none listed)\n");
    }
    for req in &plan.requirements {
        out.push_str(&format!("  - {}\n", excerpt(req)));
    }

    out.push_str("Tasks:\n");
    for task in &plan.tasks {
        let priority = task
            .priority
            .map(|p| format!("{:?}", p).to_lowercase())
            .unwrap_or_else(|| "?".to_string());
        out.push_str(&format!(
            "  - [{}] ({}) {}\n",
            task.id,
            priority,
            excerpt(&task.description)
        ));
    }

    if !plan.risks.is_empty() {
        out.push_str("Risks:\n");
        for risk in &plan.risks {
            out.push_str(&format!("  - {}\n", excerpt(risk)));
        }
    }

    for note in &plan.notes {
        out.push_str(&format!("Note: {}\n", excerpt(note)));
    }

    out
}

fn load_config(cli: &Cli, working_dir: &Path) -> Result<PipelineConfig> {
    if let Some(config_path) = &cli.config {
        let full_path = if config_path.is_absolute() {
            config_path.clone()
        } else {
            working_dir.join(config_path)
        };
        let config = PipelineConfig::load(&full_path)?;
        eprintln!("[triad] Loaded config from {}", full_path.display());
        return Ok(config);
    }

    let default_path = working_dir.join("triad.yaml");
    if default_path.exists() {
        match PipelineConfig::load(&default_path) {
            Ok(config) => {
                eprintln!("[triad] Loaded default triad.yaml");
                return Ok(config);
            }
            Err(e) => {
                eprintln!("[triad] Warning: Failed to load triad.yaml: {}", e);
            }
        }
    }

    eprintln!("[triad] Using built-in pipeline config");
    Ok(PipelineConfig::default_config())
}

fn print_event(event: PipelineEvent) {
    match event {
        PipelineEvent::StatusChanged { status } => {
            eprintln!("[status] {}", status);
        }
        PipelineEvent::StageStarted { stage } => {
            eprintln!("\n=== {} STAGE ===", stage.label().to_uppercase());
        }
        PipelineEvent::StageLog { stage, line } => {
            eprintln!("[{}] {}", stage, line);
        }
        PipelineEvent::StageCompleted { stage, success } => {
            eprintln!("[{}] invocation {}", stage, if success { "complete" } else { "failed" });
        }
        PipelineEvent::StageResultReady { stage, result } => match result {
            StageResultPayload::Plan(plan) => {
                eprintln!("[{}] parsed plan: {} task(s)", stage, plan.tasks.len());
            }
            StageResultPayload::Implement(implementation) => {
                eprintln!(
                    "[{}] parsed implementation: {} changed file(s)",
                    stage,
                    implementation.changed_files.len()
                );
            }
            StageResultPayload::Review(review) => {
                eprintln!(
                    "[{}] parsed review: approved={} score={}",
                    stage,
                    review.approved,
                    review
                        .score
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "?".to_string())
                );
            }
        },
        PipelineEvent::RunComplete { .. } => {}
    }
}

fn print_summary(snapshot: &StateSnapshot) {
    eprintln!("\n=== WORKFLOW {} ===", snapshot.status.label().to_uppercase());
    match snapshot.status {
        PipelineStatus::Completed => {
            if let Some(review) = &snapshot.review {
                eprintln!(
                    "Review: approved={} score={} security findings={} quality findings={}",
                    review.approved,
                    review
                        .score
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    review.security_findings.len(),
                    review.quality_findings.len()
                );
                if review.has_blocking_findings() {
                    eprintln!("Warning: reviewer reported critical or high severity findings");
                }
                eprintln!("Summary: {}", excerpt(&review.summary));
            }
        }
        PipelineStatus::Failed => {
            if let Some(reason) = &snapshot.failure_reason {
                eprintln!("Reason: {}", reason);
            }
        }
        PipelineStatus::Cancelled => {
            eprintln!("Run was cancelled; no further stages executed.");
        }
        _ => {}
    }
}

pub async fn run_headless(cli: Cli) -> Result<StateSnapshot> {
    let working_dir = match &cli.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let working_dir = std::fs::canonicalize(&working_dir).unwrap_or(working_dir);

    let mut config = load_config(&cli, &working_dir)?;
    if let Some(timeout_secs) = cli.timeout_secs {
        config.pipeline.plan.timeout_secs = timeout_secs;
        config.pipeline.implement.timeout_secs = timeout_secs;
        config.pipeline.review.timeout_secs = timeout_secs;
    }
    config.validate()?;

    let objective = cli.objective_text();
    eprintln!("[triad] Objective: {}", objective);

    let run_id = Uuid::new_v4().to_string();
    let run_log = if cli.no_log {
        None
    } else {
        match RunLog::create(&working_dir, &run_id) {
            Ok(log) => {
                eprintln!("[triad] Run log: {}", log.dir().display());
                Some(Arc::new(log))
            }
            Err(e) => {
                eprintln!("[triad] Warning: Failed to create run log: {}", e);
                None
            }
        }
    };

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<PipelineEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(event);
        }
    });

    let (mut coordinator, _snapshot_rx) = PipelineCoordinator::new(
        config,
        &objective,
        working_dir,
        EventSender::new(event_tx),
        run_log,
    );

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n[triad] Stop requested; terminating run...");
            stop.stop();
        }
    });

    let snapshot = if cli.yes {
        coordinator.run(&AutoApprove).await?
    } else {
        coordinator.run(&StdinApproval).await?
    };

    // Coordinator dropped here closes the event channel and ends the printer.
    drop(coordinator);
    let _ = printer.await;

    print_summary(&snapshot);
    Ok(snapshot)
}

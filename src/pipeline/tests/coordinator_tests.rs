use super::*;
use crate::config::{AgentConfig, StageConfig, StageConfigs};
use crate::events::PipelineEvent;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

const PLAN_SCRIPT: &str = r#"echo '{"requirements":["add two numbers"],"tasks":[{"id":"task-1","description":"implement add()","priority":"high","effort":"small","dependsOn":[],"affectedPaths":["math.ts"]}],"complexityScore":1,"risks":[],"successCriteria":["correct result"],"notes":[]}'"#;

const IMPLEMENT_SCRIPT: &str = r#"echo '{"changedFiles":[{"path":"math.ts","action":"modify","summary":"added add()"}],"addedDependencies":[],"notes":[]}'"#;

const REVIEW_SCRIPT: &str = r#"echo '{"securityFindings":[],"qualityFindings":[],"practiceChecks":[{"passed":true,"category":"testing","description":"unit tests present"}],"score":88,"approved":true,"summary":"solid"}'"#;

fn sh_agent(script: &str) -> AgentConfig {
    AgentConfig {
        command: "sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        fallback_commands: vec![],
        env: HashMap::new(),
    }
}

fn test_config(plan: &str, implement: &str, review: &str) -> PipelineConfig {
    let mut agents = HashMap::new();
    agents.insert("planner".to_string(), sh_agent(plan));
    agents.insert("implementer".to_string(), sh_agent(implement));
    agents.insert("reviewer".to_string(), sh_agent(review));
    PipelineConfig {
        agents,
        pipeline: StageConfigs {
            plan: StageConfig {
                agent: "planner".to_string(),
                timeout_secs: 30,
            },
            implement: StageConfig {
                agent: "implementer".to_string(),
                timeout_secs: 30,
            },
            review: StageConfig {
                agent: "reviewer".to_string(),
                timeout_secs: 30,
            },
        },
        activity_timeout_secs: 30,
        path_prepend: None,
    }
}

fn coordinator(
    config: PipelineConfig,
    dir: &Path,
) -> (
    PipelineCoordinator,
    mpsc::UnboundedReceiver<PipelineEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (coordinator, _snapshot_rx) = PipelineCoordinator::new(
        config,
        "add two numbers",
        dir.to_path_buf(),
        EventSender::new(tx),
        None,
    );
    (coordinator, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn observed_statuses(events: &[PipelineEvent]) -> Vec<PipelineStatus> {
    events
        .iter()
        .filter_map(|e| match e {
            PipelineEvent::StatusChanged { status } => Some(*status),
            _ => None,
        })
        .collect()
}

struct RecordingGate {
    decision: bool,
    calls: AtomicUsize,
    seen_plan: Mutex<Option<PlanResult>>,
}

impl RecordingGate {
    fn approve() -> Self {
        Self {
            decision: true,
            calls: AtomicUsize::new(0),
            seen_plan: Mutex::new(None),
        }
    }

    fn decline() -> Self {
        Self {
            decision: false,
            ..Self::approve()
        }
    }
}

#[async_trait]
impl ApprovalGate for RecordingGate {
    async fn decide(&self, plan: &PlanResult) -> Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_plan.lock().unwrap() = Some(plan.clone());
        Ok(self.decision)
    }
}

/// A gate that never resolves, for exercising the suspension point.
struct PendingGate;

#[async_trait]
impl ApprovalGate for PendingGate {
    async fn decide(&self, _plan: &PlanResult) -> Result<bool> {
        std::future::pending::<Result<bool>>().await
    }
}

#[tokio::test]
async fn test_full_approved_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(PLAN_SCRIPT, IMPLEMENT_SCRIPT, REVIEW_SCRIPT);
    let (mut coordinator, mut rx) = coordinator(config, dir.path());

    let gate = RecordingGate::approve();
    let snapshot = coordinator.run(&gate).await.unwrap();

    assert_eq!(snapshot.status, PipelineStatus::Completed);
    assert_eq!(gate.calls.load(Ordering::SeqCst), 1);

    let seen = gate.seen_plan.lock().unwrap().clone().unwrap();
    assert_eq!(seen.tasks.len(), 1);
    assert_eq!(seen.tasks[0].description, "implement add()");

    let plan = snapshot.plan.unwrap();
    assert_eq!(plan.complexity_score, Some(1));
    let implementation = snapshot.implementation.unwrap();
    assert_eq!(implementation.changed_files[0].path, "math.ts");
    let review = snapshot.review.unwrap();
    assert!(review.approved);
    assert_eq!(review.score, Some(88));

    let events = drain(&mut rx);
    assert_eq!(
        observed_statuses(&events),
        vec![
            PipelineStatus::Planning,
            PipelineStatus::AwaitingApproval,
            PipelineStatus::Implementing,
            PipelineStatus::Reviewing,
            PipelineStatus::Completed,
        ]
    );
    assert!(matches!(
        events.last(),
        Some(PipelineEvent::RunComplete { snapshot })
            if snapshot.status == PipelineStatus::Completed
    ));
}

#[tokio::test]
async fn test_declined_plan_cancels_without_implementing() {
    let dir = tempfile::tempdir().unwrap();
    // The implement stage would leave a marker file behind if it ran.
    let config = test_config(PLAN_SCRIPT, "touch implement-ran", REVIEW_SCRIPT);
    let (mut coordinator, mut rx) = coordinator(config, dir.path());

    let gate = RecordingGate::decline();
    let snapshot = coordinator.run(&gate).await.unwrap();

    assert_eq!(snapshot.status, PipelineStatus::Cancelled);
    assert!(snapshot.plan.is_some());
    assert!(snapshot.implementation.is_none());
    assert!(snapshot.review.is_none());
    assert!(!dir.path().join("implement-ran").exists());

    let events = drain(&mut rx);
    assert_eq!(
        observed_statuses(&events),
        vec![
            PipelineStatus::Planning,
            PipelineStatus::AwaitingApproval,
            PipelineStatus::Cancelled,
        ]
    );
}

#[tokio::test]
async fn test_plan_failure_reaches_failed_with_stderr_detail() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(
        "echo permission denied >&2; exit 1",
        IMPLEMENT_SCRIPT,
        REVIEW_SCRIPT,
    );
    let (mut coordinator, _rx) = coordinator(config, dir.path());

    let gate = RecordingGate::approve();
    let snapshot = coordinator.run(&gate).await.unwrap();

    assert_eq!(snapshot.status, PipelineStatus::Failed);
    assert!(snapshot
        .failure_reason
        .unwrap()
        .contains("permission denied"));
    // The approval gate is never consulted for a failed plan.
    assert_eq!(gate.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_plan_command_reaches_failed() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(PLAN_SCRIPT, IMPLEMENT_SCRIPT, REVIEW_SCRIPT);
    config
        .agents
        .get_mut("planner")
        .unwrap()
        .command = "triad-missing-planner".to_string();
    let (mut coordinator, _rx) = coordinator(config, dir.path());

    let snapshot = coordinator.run(&RecordingGate::approve()).await.unwrap();

    assert_eq!(snapshot.status, PipelineStatus::Failed);
    assert!(snapshot
        .failure_reason
        .unwrap()
        .contains("triad-missing-planner"));
}

#[tokio::test]
async fn test_stop_during_planning_cancels_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config("sleep 30", IMPLEMENT_SCRIPT, REVIEW_SCRIPT);
    let (mut coordinator, _rx) = coordinator(config, dir.path());
    let stop = coordinator.stop_handle();

    let task = tokio::spawn(async move {
        let gate = RecordingGate::approve();
        coordinator.run(&gate).await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let started = std::time::Instant::now();
    stop.stop();

    let snapshot = task.await.unwrap().unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(snapshot.status, PipelineStatus::Cancelled);
    assert!(snapshot.failure_reason.is_none());
}

#[tokio::test]
async fn test_stop_during_approval_wait_cancels_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(PLAN_SCRIPT, "touch implement-ran", REVIEW_SCRIPT);
    let (mut coordinator, _rx) = coordinator(config, dir.path());
    let stop = coordinator.stop_handle();

    let task = tokio::spawn(async move { coordinator.run(&PendingGate).await });

    tokio::time::sleep(Duration::from_millis(500)).await;
    stop.stop();

    let snapshot = task.await.unwrap().unwrap();
    assert_eq!(snapshot.status, PipelineStatus::Cancelled);
    assert!(snapshot.plan.is_some());
    assert!(!dir.path().join("implement-ran").exists());
}

#[tokio::test]
async fn test_unstructured_plan_degrades_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(
        "echo the model rambled with no structure",
        IMPLEMENT_SCRIPT,
        REVIEW_SCRIPT,
    );
    let (mut coordinator, _rx) = coordinator(config, dir.path());

    let snapshot = coordinator.run(&RecordingGate::approve()).await.unwrap();

    assert_eq!(snapshot.status, PipelineStatus::Completed);
    let plan = snapshot.plan.unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert!(plan.tasks[0].description.contains("rambled"));
    assert!(!plan.notes.is_empty());
}

#[tokio::test]
async fn test_coordinator_refuses_second_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(PLAN_SCRIPT, IMPLEMENT_SCRIPT, REVIEW_SCRIPT);
    let (mut coordinator, _rx) = coordinator(config, dir.path());

    let gate = RecordingGate::approve();
    let first = coordinator.run(&gate).await.unwrap();
    assert_eq!(first.status, PipelineStatus::Completed);

    let second = coordinator.run(&gate).await;
    assert!(second.is_err());
}

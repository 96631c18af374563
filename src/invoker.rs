//! External agent process execution.
//!
//! Runs one CLI invocation to completion, or until a timeout or
//! cancellation terminates it, and captures its output. This layer knows
//! nothing about pipeline semantics; it reports a `StageResult` and leaves
//! interpretation to the coordinator.

use crate::events::EventSender;
use crate::failure::FailureKind;
use crate::stage::StageKind;
use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::watch;
use tokio::time::Instant;

/// Default timeout for activity (no output) before killing the process.
pub const DEFAULT_ACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Default overall timeout for a single stage invocation.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(1800);

/// Grace period for process exit after its streams close.
const PROCESS_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Environment variable naming the stage being invoked, visible to the
/// child process.
pub const STAGE_ENV_VAR: &str = "TRIAD_STAGE";

/// Per-invocation execution settings.
#[derive(Debug, Clone)]
pub struct InvokerSettings {
    pub stage: StageKind,
    pub working_dir: PathBuf,
    pub activity_timeout: Duration,
    pub overall_timeout: Duration,
}

impl InvokerSettings {
    pub fn new(stage: StageKind, working_dir: PathBuf) -> Self {
        Self {
            stage,
            working_dir,
            activity_timeout: DEFAULT_ACTIVITY_TIMEOUT,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
        }
    }

    pub fn with_activity_timeout(mut self, timeout: Duration) -> Self {
        self.activity_timeout = timeout;
        self
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }
}

/// One command to run: configured args first, then the prompt as a single
/// positional argument.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub command: String,
    pub fallback_commands: Vec<String>,
    pub args: Vec<String>,
    pub prompt: String,
    pub env: Vec<(String, String)>,
    pub path_prepend: Option<PathBuf>,
}

/// Outcome of one invocation. All process-level failure modes are data,
/// not errors; `invoke` only returns `Err` for caller mistakes (a second
/// invocation while one is in flight) and internal I/O setup faults.
#[derive(Debug, Clone)]
pub struct StageResult {
    pub success: bool,
    /// Concatenated stdout; on timeout or cancellation this holds whatever
    /// was captured before termination.
    pub raw_output: String,
    pub failure: Option<FailureKind>,
}

impl StageResult {
    fn ok(raw_output: String) -> Self {
        Self {
            success: true,
            raw_output,
            failure: None,
        }
    }

    fn failed(raw_output: String, kind: FailureKind) -> Self {
        Self {
            success: false,
            raw_output,
            failure: Some(kind),
        }
    }

    pub fn error_detail(&self) -> Option<String> {
        self.failure.as_ref().map(|f| f.detail())
    }
}

/// Runs at most one child process at a time. A second `invoke` while one
/// is active fails fast instead of queueing, so two children can never
/// mutate the working directory concurrently.
pub struct ProcessInvoker {
    busy: AtomicBool,
    cancel_tx: watch::Sender<bool>,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl ProcessInvoker {
    pub fn new() -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            busy: AtomicBool::new(false),
            cancel_tx,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Requests termination of the in-flight invocation. Idempotent; a
    /// no-op when nothing is running (the flag is reset when the next
    /// invocation starts).
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    /// Runs the invocation to completion, streaming stdout lines through
    /// the sender in arrival order. The completion event is always the
    /// last notification for the invocation.
    pub async fn invoke(
        &self,
        invocation: Invocation,
        settings: &InvokerSettings,
        sender: &EventSender,
        external_cancel: Option<watch::Receiver<bool>>,
    ) -> Result<StageResult> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!("an invocation is already in flight; one child process at a time");
        }
        let _busy = BusyGuard(&self.busy);

        // A cancel() from an earlier invocation or an idle period must not
        // poison this one. send_replace stores the reset even when no
        // receiver is subscribed.
        self.cancel_tx.send_replace(false);
        let mut cancel_rx = self.cancel_tx.subscribe();
        let mut external_cancel = external_cancel;

        sender.stage_started(settings.stage);

        let resolved = match resolve_command(&invocation, &settings.working_dir) {
            Ok(path) => path,
            Err(message) => {
                sender.stage_completed(settings.stage, false);
                return Ok(StageResult::failed(
                    String::new(),
                    FailureKind::Spawn {
                        command: invocation.command.clone(),
                        message,
                    },
                ));
            }
        };

        let mut command = Command::new(&resolved);
        command.args(&invocation.args);
        command.arg(&invocation.prompt);
        command.env(STAGE_ENV_VAR, settings.stage.env_value());
        command.env("PATH", augmented_path(invocation.path_prepend.as_deref()));
        for (key, value) in &invocation.env {
            command.env(key, value);
        }
        command.current_dir(&settings.working_dir);
        command.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                sender.stage_completed(settings.stage, false);
                return Ok(StageResult::failed(
                    String::new(),
                    FailureKind::Spawn {
                        command: invocation.command.clone(),
                        message: err.to_string(),
                    },
                ));
            }
        };

        let stdout = child
            .stdout
            .take()
            .context("failed to get stdout from child process")?;
        let stderr = child
            .stderr
            .take()
            .context("failed to get stderr from child process")?;

        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut raw_output = String::new();
        let mut stderr_buf = String::new();
        let mut stdout_done = false;
        let mut stderr_done = false;

        let overall_deadline = Instant::now() + settings.overall_timeout;
        let mut last_activity = Instant::now();

        let failure = loop {
            if stdout_done && stderr_done {
                break None;
            }
            let activity_deadline = last_activity + settings.activity_timeout;

            tokio::select! {
                line = stdout_reader.next_line(), if !stdout_done => {
                    last_activity = Instant::now();
                    match line {
                        Ok(Some(line)) => {
                            sender.stage_log(settings.stage, line.clone());
                            raw_output.push_str(&line);
                            raw_output.push('\n');
                        }
                        Ok(None) => stdout_done = true,
                        Err(err) => {
                            sender.stage_log(
                                settings.stage,
                                format!("[error] failed to read stdout: {}", err),
                            );
                            stdout_done = true;
                        }
                    }
                }
                line = stderr_reader.next_line(), if !stderr_done => {
                    last_activity = Instant::now();
                    match line {
                        Ok(Some(line)) => {
                            sender.stage_log(settings.stage, format!("[stderr] {}", line));
                            stderr_buf.push_str(&line);
                            stderr_buf.push('\n');
                        }
                        _ => stderr_done = true,
                    }
                }
                _ = tokio::time::sleep_until(overall_deadline) => {
                    let _ = child.kill().await;
                    break Some(FailureKind::Timeout {
                        limit_secs: settings.overall_timeout.as_secs(),
                    });
                }
                _ = tokio::time::sleep_until(activity_deadline) => {
                    let _ = child.kill().await;
                    break Some(FailureKind::Timeout {
                        limit_secs: settings.activity_timeout.as_secs(),
                    });
                }
                _ = wait_cancelled(&mut cancel_rx) => {
                    let _ = child.kill().await;
                    break Some(FailureKind::Cancelled);
                }
                _ = wait_cancelled_opt(&mut external_cancel) => {
                    let _ = child.kill().await;
                    break Some(FailureKind::Cancelled);
                }
            }
        };

        if let Some(kind) = failure {
            sender.stage_completed(settings.stage, false);
            return Ok(StageResult::failed(raw_output, kind));
        }

        // Streams closed; give the process a bounded grace period to exit.
        let status = match tokio::time::timeout(PROCESS_WAIT_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => {
                sender.stage_completed(settings.stage, false);
                return Ok(StageResult::failed(
                    raw_output,
                    FailureKind::Spawn {
                        command: invocation.command.clone(),
                        message: format!("failed to wait for process exit: {}", err),
                    },
                ));
            }
            Err(_) => {
                let _ = child.kill().await;
                sender.stage_completed(settings.stage, false);
                return Ok(StageResult::failed(
                    raw_output,
                    FailureKind::Timeout {
                        limit_secs: PROCESS_WAIT_TIMEOUT.as_secs(),
                    },
                ));
            }
        };

        if status.success() {
            sender.stage_completed(settings.stage, true);
            Ok(StageResult::ok(raw_output))
        } else {
            sender.stage_completed(settings.stage, false);
            Ok(StageResult::failed(
                raw_output,
                FailureKind::Exit {
                    code: status.code().unwrap_or(-1),
                    stderr: stderr_buf,
                },
            ))
        }
    }
}

/// Resolves against the command first, then the static fallback list. No
/// other path search is attempted.
fn resolve_command(invocation: &Invocation, working_dir: &Path) -> Result<PathBuf, String> {
    let search_path = augmented_path(invocation.path_prepend.as_deref());
    let mut candidates: Vec<&str> = vec![invocation.command.as_str()];
    candidates.extend(invocation.fallback_commands.iter().map(|s| s.as_str()));

    for candidate in &candidates {
        if let Ok(path) = which::which_in(candidate, Some(&search_path), working_dir) {
            return Ok(path);
        }
    }
    Err(format!("command not found (tried: {})", candidates.join(", ")))
}

/// Parent PATH with the configured entry prepended.
fn augmented_path(prepend: Option<&Path>) -> OsString {
    let current = std::env::var_os("PATH").unwrap_or_default();
    match prepend {
        Some(dir) => {
            let mut paths = vec![dir.to_path_buf()];
            paths.extend(std::env::split_paths(&current));
            std::env::join_paths(paths).unwrap_or(current)
        }
        None => current,
    }
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_ok() {
        return;
    }
    // Sender gone; cancellation can no longer arrive on this channel.
    std::future::pending::<()>().await
}

async fn wait_cancelled_opt(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => wait_cancelled(rx).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
#[path = "invoker_tests.rs"]
mod tests;

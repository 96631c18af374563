//! Stage failure taxonomy.
//!
//! Every way an external agent invocation can fail maps to exactly one
//! variant, so callers can render distinct messages per category instead
//! of pattern-matching free text.

use serde::{Deserialize, Serialize};

/// Canonical failure types for a single stage invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The configured command could not be resolved or spawned.
    Spawn { command: String, message: String },
    /// The process exited with a nonzero status.
    Exit { code: i32, stderr: String },
    /// The process was killed after exceeding a timeout.
    Timeout { limit_secs: u64 },
    /// The caller requested cancellation; the process was terminated.
    Cancelled,
}

impl FailureKind {
    /// Human-readable name for this failure category.
    pub fn display_name(&self) -> &'static str {
        match self {
            FailureKind::Spawn { .. } => "Spawn Failure",
            FailureKind::Exit { .. } => "Process Exit",
            FailureKind::Timeout { .. } => "Timeout",
            FailureKind::Cancelled => "Cancelled",
        }
    }

    /// Full detail string surfaced as the run's failure reason.
    pub fn detail(&self) -> String {
        match self {
            FailureKind::Spawn { command, message } => {
                format!("failed to start '{}': {}", command, message)
            }
            FailureKind::Exit { code, stderr } => {
                if stderr.trim().is_empty() {
                    format!("process exited with code {}", code)
                } else {
                    format!("process exited with code {}: {}", code, stderr.trim())
                }
            }
            FailureKind::Timeout { limit_secs } => {
                format!("exceeded timeout of {}s", limit_secs)
            }
            FailureKind::Cancelled => "invocation cancelled".to_string(),
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, FailureKind::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_detail_includes_code_and_stderr() {
        let kind = FailureKind::Exit {
            code: 1,
            stderr: "permission denied\n".to_string(),
        };
        let detail = kind.detail();
        assert!(detail.contains("code 1"));
        assert!(detail.contains("permission denied"));
    }

    #[test]
    fn test_exit_detail_without_stderr() {
        let kind = FailureKind::Exit {
            code: 7,
            stderr: String::new(),
        };
        assert_eq!(kind.detail(), "process exited with code 7");
    }

    #[test]
    fn test_timeout_detail_names_limit() {
        let kind = FailureKind::Timeout { limit_secs: 300 };
        assert!(kind.detail().contains("300s"));
    }

    #[test]
    fn test_spawn_detail_names_command() {
        let kind = FailureKind::Spawn {
            command: "claude".to_string(),
            message: "not found".to_string(),
        };
        assert!(kind.detail().contains("claude"));
    }

    #[test]
    fn test_cancellation_marker() {
        assert!(FailureKind::Cancelled.is_cancellation());
        assert!(!FailureKind::Timeout { limit_secs: 1 }.is_cancellation());
    }
}

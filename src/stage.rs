use serde::{Deserialize, Serialize};

/// One of the three pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Plan,
    Implement,
    Review,
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Plan => "plan",
            StageKind::Implement => "implement",
            StageKind::Review => "review",
        }
    }

    /// Value exported to the child process as TRIAD_STAGE.
    pub fn env_value(&self) -> &'static str {
        self.label()
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

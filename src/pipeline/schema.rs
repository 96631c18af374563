//! Typed stage payloads.
//!
//! These structs mirror the JSON contract each agent is asked to follow.
//! Agent output is untrusted, so deserialization is lenient: missing
//! collections become empty, and numeric or enum fields that are absent or
//! malformed surface as `None` rather than a substituted default or a
//! parse failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Character cap applied whenever raw agent text is echoed into a
/// placeholder or rendered for display.
pub const RAW_EXCERPT_CHARS: usize = 200;

/// First `RAW_EXCERPT_CHARS` characters of untrusted raw output, cut on a
/// char boundary, with an ellipsis when truncated.
pub fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out: String = trimmed.chars().take(RAW_EXCERPT_CHARS).collect();
    if trimmed.chars().count() > RAW_EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

/// Accepts any JSON for the field and yields `None` when it does not match
/// the expected type, so one bad field never sinks the whole payload.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskEffort {
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanTask {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "lenient")]
    pub priority: Option<TaskPriority>,
    #[serde(default, alias = "estimatedEffort", deserialize_with = "lenient")]
    pub effort: Option<TaskEffort>,
    #[serde(default, alias = "dependencies")]
    pub depends_on: Vec<String>,
    #[serde(default, alias = "files")]
    pub affected_paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub tasks: Vec<PlanTask>,
    #[serde(default, alias = "estimatedComplexity", deserialize_with = "lenient")]
    pub complexity_score: Option<u8>,
    #[serde(default)]
    pub risks: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl PlanResult {
    /// Converts an extracted JSON value, accepting both the flat layout and
    /// the variant that nests task data under `implementationPlan`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(normalize_plan_value(value))
    }

    /// Degraded stand-in used when no structured plan could be recovered.
    pub fn placeholder(raw: &str) -> Self {
        Self {
            requirements: Vec::new(),
            tasks: vec![PlanTask {
                id: "task-1".to_string(),
                description: excerpt(raw),
                priority: None,
                effort: None,
                depends_on: Vec::new(),
                affected_paths: Vec::new(),
            }],
            complexity_score: None,
            risks: Vec::new(),
            success_criteria: Vec::new(),
            notes: vec![PARSE_FAILURE_NOTE.to_string()],
        }
    }
}

/// Lifts keys nested under `implementationPlan` to the top level without
/// overwriting anything already there.
fn normalize_plan_value(mut value: Value) -> Value {
    let nested = match value.get("implementationPlan") {
        Some(Value::Object(map)) => map.clone(),
        _ => return value,
    };
    if let Some(top) = value.as_object_mut() {
        top.remove("implementationPlan");
        for (key, val) in nested {
            top.entry(key).or_insert(val);
        }
    }
    value
}

pub const PARSE_FAILURE_NOTE: &str =
    "structured output parsing failed; a raw-output excerpt was substituted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    Create,
    Modify,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    #[serde(default)]
    pub path: String,
    #[serde(default, deserialize_with = "lenient")]
    pub action: Option<FileAction>,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementResult {
    #[serde(default, alias = "files")]
    pub changed_files: Vec<FileChange>,
    #[serde(default, alias = "dependencies")]
    pub added_dependencies: Vec<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

impl ImplementResult {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn placeholder(raw: &str) -> Self {
        Self {
            changed_files: Vec::new(),
            added_dependencies: Vec::new(),
            notes: vec![PARSE_FAILURE_NOTE.to_string(), excerpt(raw)],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewFinding {
    #[serde(default, deserialize_with = "lenient")]
    pub severity: Option<FindingSeverity>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "recommendation")]
    pub remedy: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeCheck {
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    #[serde(default)]
    pub security_findings: Vec<ReviewFinding>,
    #[serde(default)]
    pub quality_findings: Vec<ReviewFinding>,
    #[serde(default, alias = "bestPractices")]
    pub practice_checks: Vec<PracticeCheck>,
    #[serde(default, deserialize_with = "lenient")]
    pub score: Option<u8>,
    #[serde(default)]
    pub approved: bool,
    #[serde(default)]
    pub summary: String,
}

impl ReviewResult {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn placeholder(raw: &str) -> Self {
        Self {
            security_findings: Vec::new(),
            quality_findings: vec![ReviewFinding {
                severity: None,
                category: "parse".to_string(),
                location: String::new(),
                description: excerpt(raw),
                remedy: String::new(),
            }],
            practice_checks: Vec::new(),
            score: None,
            approved: false,
            summary: PARSE_FAILURE_NOTE.to_string(),
        }
    }

    /// True when the reviewer reported any critical or high severity
    /// finding. Display-only; the core does not gate on this.
    pub fn has_blocking_findings(&self) -> bool {
        self.security_findings
            .iter()
            .chain(self.quality_findings.iter())
            .any(|f| {
                matches!(
                    f.severity,
                    Some(FindingSeverity::Critical) | Some(FindingSeverity::High)
                )
            })
    }
}

#[cfg(test)]
#[path = "tests/schema_tests.rs"]
mod tests;

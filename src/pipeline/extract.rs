//! Structured payload recovery from raw agent output.
//!
//! Agent responses may be bare JSON, JSON buried in prose, or JSON inside a
//! markdown fence. Extraction is two-phase: first isolate a syntactic
//! candidate (fence scan, then a depth-aware brace scan, then the whole
//! input), then convert it to the stage's typed shape. Conversion failures
//! degrade to a placeholder result so the pipeline always has something to
//! hand to the next stage; nothing in this module returns an error to its
//! caller.

use crate::pipeline::schema::{ImplementResult, PlanResult, ReviewResult};
use serde_json::Value;

/// Which strategy produced the extracted candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    /// Interior of a ```json fenced block.
    Fence,
    /// Balanced top-level object located by brace depth tracking.
    BraceScan,
    /// The entire (trimmed) input parsed as-is.
    WholeInput,
}

/// Extracts the first parseable JSON value from raw output.
///
/// Strategies run in fixed order and the first one whose candidate parses
/// wins. A fence whose interior is not valid JSON falls through to the
/// brace scan rather than failing extraction outright.
pub fn extract_value(raw: &str) -> Option<(Value, ExtractionMethod)> {
    if let Some(block) = last_fenced_block(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&block) {
            return Some((value, ExtractionMethod::Fence));
        }
    }
    if let Some(region) = balanced_object(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(region) {
            return Some((value, ExtractionMethod::BraceScan));
        }
    }
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Some((value, ExtractionMethod::WholeInput));
    }
    None
}

/// Returns the interior of the last ```json fence in the input.
///
/// The last fence wins: when a response quotes a schema example and then
/// emits the real payload, the real payload comes later.
fn last_fenced_block(raw: &str) -> Option<String> {
    let mut fences: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in raw.lines() {
        let trimmed = line.trim();
        if !in_fence {
            if matches!(trimmed, "```json" | "``` json" | "```JSON") {
                in_fence = true;
                current.clear();
            }
            continue;
        }
        if trimmed == "```" {
            if !current.is_empty() {
                fences.push(current.join("\n"));
            }
            in_fence = false;
            continue;
        }
        current.push(line);
    }

    fences.pop()
}

/// Locates the first balanced top-level JSON object in the input.
///
/// Tracks brace depth while skipping string literals and escape sequences,
/// so nested objects and arrays never terminate the match early. Returns
/// the exact `{...}` slice, leaving any trailing prose behind.
fn balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in raw[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = start + i + ch.len_utf8();
                    return Some(&raw[start..end]);
                }
            }
            _ => {}
        }
    }

    None
}

fn payload_from_response<T>(
    stage: &str,
    raw: &str,
    convert: fn(Value) -> Result<T, serde_json::Error>,
    placeholder: fn(&str) -> T,
) -> T {
    match extract_value(raw) {
        Some((value, method)) => match convert(value) {
            Ok(result) => {
                tracing::debug!(stage, ?method, "extracted structured payload");
                result
            }
            Err(err) => {
                tracing::warn!(
                    stage,
                    ?method,
                    error = %err,
                    "payload did not match the expected shape; using placeholder"
                );
                placeholder(raw)
            }
        },
        None => {
            tracing::warn!(stage, "no JSON payload found in output; using placeholder");
            placeholder(raw)
        }
    }
}

/// Plan-stage output to a `PlanResult`, degrading on failure. Never errors.
pub fn plan_from_response(raw: &str) -> PlanResult {
    payload_from_response("plan", raw, PlanResult::from_value, PlanResult::placeholder)
}

/// Implement-stage output to an `ImplementResult`. Never errors.
pub fn implementation_from_response(raw: &str) -> ImplementResult {
    payload_from_response(
        "implement",
        raw,
        ImplementResult::from_value,
        ImplementResult::placeholder,
    )
}

/// Review-stage output to a `ReviewResult`. Never errors.
pub fn review_from_response(raw: &str) -> ReviewResult {
    payload_from_response(
        "review",
        raw,
        ReviewResult::from_value,
        ReviewResult::placeholder,
    )
}

#[cfg(test)]
#[path = "tests/extract_tests.rs"]
mod tests;

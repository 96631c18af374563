//! Stage prompt construction.
//!
//! Each stage's request is built from the previous stage's parsed result by
//! concatenating labeled sections, so the same inputs always produce the
//! same prompt. The JSON output contract each agent is asked to honor lives
//! here as well.

use crate::pipeline::schema::{excerpt, ImplementResult, PlanResult};

const PLAN_CONTRACT: &str = r#"Respond with a single JSON object inside a ```json fenced block:
{
  "requirements": ["..."],
  "tasks": [
    {"id": "task-1", "description": "...", "priority": "high|medium|low",
     "effort": "small|medium|large", "dependsOn": [], "affectedPaths": ["..."]}
  ],
  "complexityScore": 1,
  "risks": ["..."],
  "successCriteria": ["..."],
  "notes": []
}"#;

const IMPLEMENT_CONTRACT: &str = r#"Respond with a single JSON object inside a ```json fenced block:
{
  "changedFiles": [
    {"path": "...", "action": "create|modify|delete", "summary": "..."}
  ],
  "addedDependencies": ["..."],
  "notes": []
}"#;

const REVIEW_CONTRACT: &str = r#"Respond with a single JSON object inside a ```json fenced block:
{
  "securityFindings": [
    {"severity": "critical|high|medium|low", "category": "...",
     "location": "...", "description": "...", "remedy": "..."}
  ],
  "qualityFindings": [],
  "practiceChecks": [{"passed": true, "category": "...", "description": "..."}],
  "score": 0,
  "approved": false,
  "summary": "..."
}

Set "approved" to true only if the score is at least 75 and there are zero
critical and zero high severity findings."#;

pub fn plan_prompt(objective: &str) -> String {
    format!(
        r#"You are the planning agent for a three-stage development pipeline.

## Objective
{}

## Instructions
Analyze the objective and produce an implementation plan: concrete
requirements, an ordered task breakdown with priorities and effort
estimates, a 1-10 complexity score, risks, and success criteria.

## Output
{}"#,
        objective, PLAN_CONTRACT
    )
}

pub fn implement_prompt(objective: &str, plan: &PlanResult) -> String {
    let mut sections = String::new();

    sections.push_str("## Objective\n");
    sections.push_str(objective);
    sections.push_str("\n\n## Requirements\n");
    push_list(&mut sections, &plan.requirements);

    sections.push_str("\n## Tasks\n");
    if plan.tasks.is_empty() {
        sections.push_str("- (no tasks listed)\n");
    }
    for task in &plan.tasks {
        sections.push_str(&format!("- [{}] {}\n", task.id, excerpt(&task.description)));
        for path in &task.affected_paths {
            sections.push_str(&format!("  - touches: {}\n", path));
        }
    }

    sections.push_str("\n## Risks\n");
    push_list(&mut sections, &plan.risks);

    sections.push_str("\n## Success Criteria\n");
    push_list(&mut sections, &plan.success_criteria);

    format!(
        r#"You are the implementation agent for a three-stage development pipeline.
Carry out the approved plan below, editing files in the working directory.

{}
## Output
{}"#,
        sections, IMPLEMENT_CONTRACT
    )
}

pub fn review_prompt(implementation: &ImplementResult) -> String {
    let mut sections = String::new();

    sections.push_str("## Changed Files\n");
    if implementation.changed_files.is_empty() {
        sections.push_str("- (none reported)\n");
    }
    for change in &implementation.changed_files {
        let action = change
            .action
            .map(|a| format!("{:?}", a).to_lowercase())
            .unwrap_or_else(|| "unknown".to_string());
        sections.push_str(&format!(
            "- {} ({}): {}\n",
            change.path,
            action,
            excerpt(&change.summary)
        ));
    }

    sections.push_str("\n## Added Dependencies\n");
    push_list(&mut sections, &implementation.added_dependencies);

    format!(
        r#"You are the review agent for a three-stage development pipeline.
Review the implementation summarized below directly against the working
directory. Check for OWASP-class security issues, code quality problems,
and engineering best practices. Score the implementation from 0 to 100.

{}
## Output
{}"#,
        sections, REVIEW_CONTRACT
    )
}

fn push_list(out: &mut String, items: &[String]) {
    if items.is_empty() {
        out.push_str("- (none listed)\n");
        return;
    }
    for item in items {
        out.push_str(&format!("- {}\n", excerpt(item)));
    }
}

#[cfg(test)]
#[path = "tests/prompts_tests.rs"]
mod tests;

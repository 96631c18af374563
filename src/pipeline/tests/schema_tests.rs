use super::*;
use serde_json::json;

#[test]
fn test_plan_flat_layout() {
    let value = json!({
        "requirements": ["add two numbers"],
        "tasks": [
            {"id": "task-1", "description": "implement add()", "priority": "high",
             "effort": "small", "dependsOn": [], "affectedPaths": ["math.ts"]}
        ],
        "complexityScore": 1,
        "risks": [],
        "successCriteria": ["correct result"],
        "notes": []
    });
    let plan = PlanResult::from_value(value).unwrap();
    assert_eq!(plan.requirements, vec!["add two numbers"]);
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].description, "implement add()");
    assert_eq!(plan.tasks[0].priority, Some(TaskPriority::High));
    assert_eq!(plan.tasks[0].effort, Some(TaskEffort::Small));
    assert_eq!(plan.tasks[0].affected_paths, vec!["math.ts"]);
    assert_eq!(plan.complexity_score, Some(1));
}

#[test]
fn test_plan_nested_implementation_plan_layout() {
    let value = json!({
        "requirements": ["add two numbers"],
        "implementationPlan": {
            "tasks": [
                {"id": "task-1", "description": "implement add()", "priority": "high",
                 "estimatedEffort": "small", "dependencies": [], "files": ["math.ts"]}
            ],
            "estimatedComplexity": 1,
            "risks": []
        },
        "successCriteria": ["correct result"],
        "notes": []
    });
    let plan = PlanResult::from_value(value).unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].description, "implement add()");
    assert_eq!(plan.tasks[0].affected_paths, vec!["math.ts"]);
    assert_eq!(plan.complexity_score, Some(1));
}

#[test]
fn test_nested_layout_does_not_overwrite_top_level_fields() {
    let value = json!({
        "tasks": [{"id": "outer", "description": "outer task"}],
        "implementationPlan": {
            "tasks": [{"id": "inner", "description": "inner task"}]
        }
    });
    let plan = PlanResult::from_value(value).unwrap();
    assert_eq!(plan.tasks.len(), 1);
    assert_eq!(plan.tasks[0].id, "outer");
}

#[test]
fn test_unknown_enum_value_becomes_gap() {
    let value = json!({
        "tasks": [
            {"id": "task-1", "description": "implement add()", "priority": "high",
             "effort": "小"}
        ]
    });
    let plan = PlanResult::from_value(value).unwrap();
    assert_eq!(plan.tasks[0].priority, Some(TaskPriority::High));
    assert_eq!(plan.tasks[0].effort, None);
}

#[test]
fn test_malformed_numeric_becomes_gap() {
    let value = json!({"complexityScore": "very hard", "tasks": []});
    let plan = PlanResult::from_value(value).unwrap();
    assert_eq!(plan.complexity_score, None);
}

#[test]
fn test_missing_fields_default_to_empty() {
    let plan = PlanResult::from_value(json!({})).unwrap();
    assert!(plan.requirements.is_empty());
    assert!(plan.tasks.is_empty());
    assert_eq!(plan.complexity_score, None);
    assert!(plan.notes.is_empty());
}

#[test]
fn test_plan_placeholder_shape() {
    let plan = PlanResult::placeholder("garbage output from the model");
    assert_eq!(plan.tasks.len(), 1);
    assert!(plan.tasks[0].description.contains("garbage output"));
    assert_eq!(plan.notes, vec![PARSE_FAILURE_NOTE.to_string()]);
    assert_eq!(plan.complexity_score, None);
}

#[test]
fn test_implement_result_aliases() {
    let value = json!({
        "files": [{"path": "src/math.ts", "action": "modify", "summary": "add add()"}],
        "dependencies": ["lodash"]
    });
    let implementation = ImplementResult::from_value(value).unwrap();
    assert_eq!(implementation.changed_files.len(), 1);
    assert_eq!(implementation.changed_files[0].action, Some(FileAction::Modify));
    assert_eq!(implementation.added_dependencies, vec!["lodash"]);
}

#[test]
fn test_implement_placeholder_flags_parse_failure() {
    let implementation = ImplementResult::placeholder("not structured");
    assert!(implementation.changed_files.is_empty());
    assert!(implementation.notes.iter().any(|n| n == PARSE_FAILURE_NOTE));
    assert!(implementation.notes.iter().any(|n| n.contains("not structured")));
}

#[test]
fn test_review_result_full_shape() {
    let value = json!({
        "securityFindings": [
            {"severity": "critical", "category": "injection", "location": "db.ts:10",
             "description": "raw SQL", "remedy": "parameterize"}
        ],
        "qualityFindings": [
            {"severity": "low", "category": "style", "location": "a.ts",
             "description": "long function", "recommendation": "split it"}
        ],
        "practiceChecks": [{"passed": true, "category": "testing", "description": "tests exist"}],
        "score": 60,
        "approved": false,
        "summary": "needs work"
    });
    let review = ReviewResult::from_value(value).unwrap();
    assert_eq!(review.security_findings.len(), 1);
    assert_eq!(
        review.security_findings[0].severity,
        Some(FindingSeverity::Critical)
    );
    assert_eq!(review.quality_findings[0].remedy, "split it");
    assert!(review.practice_checks[0].passed);
    assert_eq!(review.score, Some(60));
    assert!(!review.approved);
    assert!(review.has_blocking_findings());
}

#[test]
fn test_review_without_blocking_findings() {
    let value = json!({
        "qualityFindings": [
            {"severity": "medium", "category": "style", "location": "", "description": "", "remedy": ""}
        ],
        "score": 90,
        "approved": true,
        "summary": "fine"
    });
    let review = ReviewResult::from_value(value).unwrap();
    assert!(!review.has_blocking_findings());
}

#[test]
fn test_review_placeholder_shape() {
    let review = ReviewResult::placeholder("mystery text");
    assert_eq!(review.quality_findings.len(), 1);
    assert!(review.quality_findings[0].description.contains("mystery text"));
    assert!(!review.approved);
    assert_eq!(review.score, None);
    assert_eq!(review.summary, PARSE_FAILURE_NOTE);
}

#[test]
fn test_excerpt_caps_length_on_char_boundary() {
    let long: String = "é".repeat(500);
    let capped = excerpt(&long);
    assert_eq!(capped.chars().count(), RAW_EXCERPT_CHARS + 3);
    assert!(capped.ends_with("..."));
}

#[test]
fn test_excerpt_leaves_short_input_alone() {
    assert_eq!(excerpt("  hello  "), "hello");
}

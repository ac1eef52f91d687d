use agent_core::{parse_analysis, parse_suggestion, StepAction, TaskType};
use serde_json::json;

#[test]
fn accepts_parameters_and_stringifies_scalars() {
    let analysis = parse_analysis(&json!({
        "task_type": "form-creation",
        "parameters": {"count": 4, "topic": "onboarding", "blank": ""},
        "reasoning": "user wants a form",
        "confidence": 0.8
    }))
    .unwrap();
    assert_eq!(analysis.task_type, TaskType::FormCreation);
    assert_eq!(analysis.parameters.get("count").map(String::as_str), Some("4"));
    assert!(!analysis.parameters.contains_key("blank"));
    assert!(analysis.steps.is_empty());
}

#[test]
fn task_type_aliases_are_accepted() {
    let analysis = parse_analysis(&json!({
        "task_type": "search",
        "parameters": {"query": "socks"}
    }))
    .unwrap();
    assert_eq!(analysis.task_type, TaskType::GenericSearch);
}

#[test]
fn rejects_unknown_fields_and_types() {
    let err = parse_analysis(&json!({"task_type": "navigate", "plan": []})).unwrap_err();
    assert!(err.to_string().contains("unexpected field 'plan'"));

    let err = parse_analysis(&json!({"task_type": "teleport"})).unwrap_err();
    assert!(err.to_string().contains("unknown task_type"));

    let err = parse_analysis(&json!("navigate")).unwrap_err();
    assert!(err.to_string().contains("JSON object"));

    let err = parse_analysis(&json!({"parameters": {}})).unwrap_err();
    assert!(err.to_string().contains("task_type"));
}

#[test]
fn missing_required_parameter_is_rejected() {
    let err = parse_analysis(&json!({
        "task_type": "complex-cart-flow",
        "parameters": {"site": "amazon"}
    }))
    .unwrap_err();
    assert!(err.to_string().contains("productName"));
}

#[test]
fn nested_parameter_is_rejected() {
    let err = parse_analysis(&json!({
        "task_type": "generic-search",
        "parameters": {"query": {"text": "socks"}}
    }))
    .unwrap_err();
    assert!(err.to_string().contains("scalar"));
}

#[test]
fn explicit_steps_are_validated() {
    let ok = parse_analysis(&json!({
        "task_type": "generic",
        "steps": [
            {"action": "navigate", "value": "https://example.com", "sub_goal": "navigation"},
            {"action": "wait", "value": "500", "sub_goal": "settle"},
            {"action": "observe-state", "expected_state": "page_loaded", "sub_goal": "verification"}
        ]
    }))
    .unwrap();
    assert_eq!(ok.steps.len(), 3);
    assert_eq!(ok.steps[1].action, StepAction::Wait);

    let bad_url = parse_analysis(&json!({
        "task_type": "generic",
        "steps": [{"action": "navigate", "value": "ftp://example.com", "sub_goal": "navigation"}]
    }))
    .unwrap_err();
    assert!(bad_url.to_string().contains("step 0"));

    let no_target = parse_analysis(&json!({
        "task_type": "generic",
        "steps": [{"action": "click", "sub_goal": "explore"}]
    }))
    .unwrap_err();
    assert!(no_target.to_string().contains("needs a target"));

    let unknown_action = parse_analysis(&json!({
        "task_type": "generic",
        "steps": [{"action": "hover", "sub_goal": "explore"}]
    }))
    .unwrap_err();
    assert!(unknown_action.to_string().contains("step 0"));
}

#[test]
fn step_list_is_capped() {
    let steps: Vec<_> = (0..51)
        .map(|_| json!({"action": "wait", "value": "1", "sub_goal": "idle"}))
        .collect();
    let err = parse_analysis(&json!({"task_type": "generic", "steps": steps})).unwrap_err();
    assert!(err.to_string().contains("limit"));
}

#[test]
fn suggestions_parse_or_yield_none() {
    let suggestion = parse_suggestion(&json!({
        "selector": "#buy",
        "reasoning": "the only purchase control"
    }))
    .unwrap()
    .unwrap();
    assert_eq!(suggestion.selector.as_deref(), Some("#buy"));
    assert!(suggestion.description.is_none());

    assert!(parse_suggestion(&json!(null)).unwrap().is_none());
    assert!(parse_suggestion(&json!({"reasoning": "no idea"})).unwrap().is_none());
    assert!(parse_suggestion(&json!({"selector": "#a", "click": true})).is_err());
}

//! Validation of untyped analysis payloads.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::errors::AgentError;
use crate::model::{Step, StepAction, TaskType};

const MAX_ANALYSIS_STEPS: usize = 50;
const ANALYSIS_KEYS: &[&str] = &["task_type", "parameters", "steps", "title", "reasoning", "confidence"];
const SUGGESTION_KEYS: &[&str] = &["selector", "description", "reasoning", "confidence"];

/// Validated analysis of a goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    pub task_type: TaskType,
    pub parameters: BTreeMap<String, String>,
    pub steps: Vec<Step>,
    pub title: Option<String>,
}

/// Alternate target proposed for a failing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSuggestion {
    pub selector: Option<String>,
    pub description: Option<String>,
}

fn expect_object<'a>(value: &'a Value, what: &str) -> Result<&'a Map<String, Value>, AgentError> {
    value
        .as_object()
        .ok_or_else(|| AgentError::invalid_analysis(format!("{what} must be a JSON object")))
}

fn reject_unknown_keys(
    object: &Map<String, Value>,
    allowed: &[&str],
    what: &str,
) -> Result<(), AgentError> {
    if let Some(key) = object.keys().find(|key| !allowed.contains(&key.as_str())) {
        return Err(AgentError::invalid_analysis(format!(
            "{what} has unexpected field '{key}'"
        )));
    }
    Ok(())
}

fn optional_string(
    object: &Map<String, Value>,
    key: &str,
) -> Result<Option<String>, AgentError> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        Some(other) => Err(AgentError::invalid_analysis(format!(
            "'{key}' must be a string, got {other}"
        ))),
    }
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String, AgentError> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(AgentError::invalid_analysis(format!(
            "parameter '{key}' must be a scalar, got {other}"
        ))),
    }
}

fn validate_step(index: usize, step: &Step) -> Result<(), AgentError> {
    let fail = |reason: &str| {
        Err(AgentError::invalid_analysis(format!(
            "step {index} ({}): {reason}",
            step.action
        )))
    };
    if step.sub_goal.trim().is_empty() {
        return fail("sub_goal is empty");
    }
    match step.action {
        StepAction::Navigate => match step.value.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
            _ => fail("navigate needs an http(s) URL value"),
        },
        StepAction::Wait => match step.value.as_deref().map(|v| v.trim().parse::<u64>()) {
            Some(Ok(_)) => Ok(()),
            _ => fail("wait needs a millisecond value"),
        },
        StepAction::ObserveState => {
            if step.expected_state.is_none() {
                fail("observe-state needs expected_state")
            } else {
                Ok(())
            }
        }
        StepAction::Select if step.value.is_none() => fail("select needs a value"),
        _ if step.target.is_empty() && step.fallback_hints.is_empty() => {
            fail("element action needs a target")
        }
        _ => Ok(()),
    }
}

/// Validate an analysis payload.
pub fn parse_analysis(value: &Value) -> Result<Analysis, AgentError> {
    let object = expect_object(value, "analysis")?;
    reject_unknown_keys(object, ANALYSIS_KEYS, "analysis")?;

    let raw_type = optional_string(object, "task_type")?
        .ok_or_else(|| AgentError::invalid_analysis("missing 'task_type'"))?;
    let task_type = TaskType::parse(&raw_type)
        .ok_or_else(|| AgentError::invalid_analysis(format!("unknown task_type '{raw_type}'")))?;

    let mut parameters = BTreeMap::new();
    match object.get("parameters") {
        None | Some(Value::Null) => {}
        Some(value) => {
            for (key, raw) in expect_object(value, "'parameters'")? {
                let value = scalar_to_string(key, raw)?;
                if !value.is_empty() {
                    parameters.insert(key.clone(), value);
                }
            }
        }
    }

    let steps = match object.get("steps") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            if items.len() > MAX_ANALYSIS_STEPS {
                return Err(AgentError::invalid_analysis(format!(
                    "{} steps exceeds the limit of {MAX_ANALYSIS_STEPS}",
                    items.len()
                )));
            }
            let mut steps = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                let step: Step = serde_json::from_value(item.clone()).map_err(|err| {
                    AgentError::invalid_analysis(format!("step {index}: {err}"))
                })?;
                validate_step(index, &step)?;
                steps.push(step);
            }
            steps
        }
        Some(other) => {
            return Err(AgentError::invalid_analysis(format!(
                "'steps' must be an array, got {other}"
            )))
        }
    };

    if steps.is_empty() {
        if let Some(missing) = task_type
            .required_parameters()
            .iter()
            .find(|name| !parameters.contains_key(**name))
        {
            return Err(AgentError::invalid_analysis(format!(
                "{task_type} analysis lacks required parameter '{missing}'"
            )));
        }
    }

    Ok(Analysis {
        task_type,
        parameters,
        steps,
        title: optional_string(object, "title")?,
    })
}

/// Validate a step suggestion. `Ok(None)` when the payload proposes nothing.
pub fn parse_suggestion(value: &Value) -> Result<Option<StepSuggestion>, AgentError> {
    if value.is_null() {
        return Ok(None);
    }
    let object = expect_object(value, "suggestion")?;
    reject_unknown_keys(object, SUGGESTION_KEYS, "suggestion")?;
    let selector = optional_string(object, "selector")?;
    let description = optional_string(object, "description")?;
    if selector.is_none() && description.is_none() {
        return Ok(None);
    }
    Ok(Some(StepSuggestion {
        selector,
        description,
    }))
}

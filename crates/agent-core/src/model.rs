use std::collections::BTreeMap;
use std::fmt;

use page_driver::{Affordance, Interaction};
use serde::{Deserialize, Serialize};

/// Classified goal category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskType {
    Navigate,
    GenericSearch,
    ComplexCartFlow,
    FormCreation,
    Generic,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Navigate => "navigate",
            TaskType::GenericSearch => "generic-search",
            TaskType::ComplexCartFlow => "complex-cart-flow",
            TaskType::FormCreation => "form-creation",
            TaskType::Generic => "generic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "navigate" => Some(TaskType::Navigate),
            "generic-search" | "search" => Some(TaskType::GenericSearch),
            "complex-cart-flow" | "cart" => Some(TaskType::ComplexCartFlow),
            "form-creation" | "form" => Some(TaskType::FormCreation),
            "generic" => Some(TaskType::Generic),
            _ => None,
        }
    }

    /// Parameters a goal of this type cannot do without.
    pub fn required_parameters(&self) -> &'static [&'static str] {
        match self {
            TaskType::Navigate => &["target"],
            TaskType::GenericSearch => &["query"],
            TaskType::ComplexCartFlow => &["productName"],
            TaskType::FormCreation => &["count"],
            TaskType::Generic => &[],
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified natural-language goal. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Goal {
    pub text: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl Goal {
    pub fn new(text: impl Into<String>, task_type: TaskType) -> Self {
        Self {
            text: text.into(),
            task_type,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }
}

/// Browser action a step performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepAction {
    Navigate,
    Click,
    Type,
    TypeAndSubmit,
    Select,
    Wait,
    ObserveState,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Navigate => "navigate",
            StepAction::Click => "click",
            StepAction::Type => "type",
            StepAction::TypeAndSubmit => "type-and-submit",
            StepAction::Select => "select",
            StepAction::Wait => "wait",
            StepAction::ObserveState => "observe-state",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "navigate" => Some(StepAction::Navigate),
            "click" => Some(StepAction::Click),
            "type" => Some(StepAction::Type),
            "type-and-submit" | "submit" => Some(StepAction::TypeAndSubmit),
            "select" => Some(StepAction::Select),
            "wait" => Some(StepAction::Wait),
            "observe-state" | "observe" | "verify" => Some(StepAction::ObserveState),
            _ => None,
        }
    }

    /// Whether the step acts on a located element.
    pub fn needs_element(&self) -> bool {
        self.interaction().is_some()
    }

    pub fn interaction(&self) -> Option<Interaction> {
        match self {
            StepAction::Click => Some(Interaction::Click),
            StepAction::Type => Some(Interaction::Type),
            StepAction::TypeAndSubmit => Some(Interaction::TypeAndSubmit),
            StepAction::Select => Some(Interaction::Select),
            StepAction::Navigate | StepAction::Wait | StepAction::ObserveState => None,
        }
    }

    /// What the target element has to afford.
    pub fn affordance(&self) -> Option<Affordance> {
        match self {
            StepAction::Click => Some(Affordance::Clickable),
            StepAction::Type | StepAction::TypeAndSubmit | StepAction::Select => {
                Some(Affordance::Editable)
            }
            StepAction::Navigate | StepAction::Wait | StepAction::ObserveState => None,
        }
    }
}

impl fmt::Display for StepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element a step acts on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepTarget {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selector: Option<String>,
}

impl StepTarget {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            selector: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.trim().is_empty()
            && self.selector.as_deref().map(str::is_empty).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub action: StepAction,
    #[serde(default)]
    pub target: StepTarget,
    #[serde(default)]
    pub value: Option<String>,
    pub sub_goal: String,
    #[serde(default)]
    pub expected_state: Option<String>,
    #[serde(default)]
    pub fallback_hints: Vec<String>,
    #[serde(default)]
    pub critical: bool,
}

impl Step {
    pub fn new(action: StepAction, sub_goal: impl Into<String>) -> Self {
        Self {
            action,
            target: StepTarget::default(),
            value: None,
            sub_goal: sub_goal.into(),
            expected_state: None,
            fallback_hints: Vec::new(),
            critical: false,
        }
    }

    pub fn navigate(url: impl Into<String>) -> Self {
        Self::new(StepAction::Navigate, "navigation").with_value(url)
    }

    pub fn observe(state: impl Into<String>) -> Self {
        Self::new(StepAction::ObserveState, "verification").expecting(state)
    }

    pub fn with_target(mut self, target: StepTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn expecting(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    pub fn with_fallbacks<I, S>(mut self, hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fallback_hints = hints.into_iter().map(Into::into).collect();
        self
    }

    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    /// One-line summary used in logs and the thinking log.
    pub fn describe(&self) -> String {
        match self.action {
            StepAction::Navigate => format!(
                "navigate to {}",
                self.value.as_deref().unwrap_or("(no url)")
            ),
            StepAction::ObserveState => format!(
                "check {}",
                self.expected_state.as_deref().unwrap_or("page state")
            ),
            StepAction::Wait => format!("wait {}ms", self.value.as_deref().unwrap_or("0")),
            _ => {
                let target = if self.target.description.is_empty() {
                    self.target.selector.as_deref().unwrap_or("element")
                } else {
                    self.target.description.as_str()
                };
                match self.value.as_deref() {
                    Some(value) => format!("{} \"{}\" into {}", self.action, value, target),
                    None => format!("{} {}", self.action, target),
                }
            }
        }
    }
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Template,
    Analysis,
}

/// Ordered steps for one goal. Replaced, never mutated, on replan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub title: String,
    pub task_type: TaskType,
    pub steps: Vec<Step>,
    pub generation: u32,
    pub source: PlanSource,
}

impl Plan {
    pub fn new(title: impl Into<String>, task_type: TaskType, source: PlanSource) -> Self {
        Self {
            title: title.into(),
            task_type,
            steps: Vec::new(),
            generation: 0,
            source,
        }
    }

    pub fn with_steps(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sub-goals in step order.
    pub fn phases(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.sub_goal.as_str()).collect()
    }
}

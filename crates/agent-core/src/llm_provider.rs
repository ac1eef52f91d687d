use std::collections::VecDeque;

use async_trait::async_trait;
use page_driver::PageSnapshot;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::analyzer::GoalAnalyzer;
use crate::errors::AgentError;
use crate::model::Step;

/// Abstraction over LLM-backed analysis so multiple vendors can plug into the
/// engine. Responses are untyped; callers validate them with
/// [`crate::parse_analysis`] and [`crate::parse_suggestion`].
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    /// Analyze a goal against the current page.
    async fn analyze_goal(&self, page: &PageSnapshot, goal: &str) -> Result<Value, AgentError>;

    /// Propose an alternate target for a step that keeps failing.
    async fn suggest_step(
        &self,
        page: &PageSnapshot,
        step: &Step,
        reason: &str,
    ) -> Result<Value, AgentError>;
}

/// Deterministic provider used for tests and offline development.
///
/// Scripted responses are returned first, in order. Once exhausted, goal
/// analysis falls back to the rule table and suggestions to `null`.
#[derive(Debug, Default)]
pub struct MockAnalysisProvider {
    analyses: Mutex<VecDeque<Value>>,
    suggestions: Mutex<VecDeque<Value>>,
    calls: Mutex<Vec<String>>,
}

impl MockAnalysisProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_analysis(self, value: Value) -> Self {
        self.analyses.lock().push_back(value);
        self
    }

    pub fn with_suggestion(self, value: Value) -> Self {
        self.suggestions.lock().push_back(value);
        self
    }

    /// Calls received so far, e.g. `analyze_goal:<goal>`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AnalysisProvider for MockAnalysisProvider {
    async fn analyze_goal(&self, _page: &PageSnapshot, goal: &str) -> Result<Value, AgentError> {
        if goal.trim().is_empty() {
            return Err(AgentError::provider("goal is empty"));
        }
        self.calls.lock().push(format!("analyze_goal:{goal}"));
        if let Some(scripted) = self.analyses.lock().pop_front() {
            return Ok(scripted);
        }
        let analyzed = GoalAnalyzer::new().analyze(goal);
        Ok(json!({
            "task_type": analyzed.task_type.as_str(),
            "parameters": analyzed.parameters,
            "reasoning": "Mock analysis from pattern rules",
        }))
    }

    async fn suggest_step(
        &self,
        _page: &PageSnapshot,
        step: &Step,
        reason: &str,
    ) -> Result<Value, AgentError> {
        self.calls
            .lock()
            .push(format!("suggest_step:{}:{reason}", step.sub_goal));
        Ok(self.suggestions.lock().pop_front().unwrap_or(Value::Null))
    }
}

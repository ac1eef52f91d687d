mod templates;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::{
    errors::AgentError,
    model::{Goal, Plan, PlanSource, Step, TaskType},
    plan_validator::parse_analysis,
};

pub use templates::{
    render, PlanTemplate, RepeatTemplate, StepTemplate, TargetTemplate, TemplateRegistry,
    TEMPLATE_ENV,
};

/// Planner configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// YAML file overriding built-in templates.
    pub template_path: Option<PathBuf>,
    /// Ask the analysis provider for a second plan after a failed run.
    pub replan_on_failure: bool,
}

/// Turns classified goals into plans.
#[derive(Debug, Clone)]
pub struct PlanGenerator {
    registry: TemplateRegistry,
}

impl PlanGenerator {
    pub fn new(registry: TemplateRegistry) -> Self {
        Self { registry }
    }

    pub fn from_config(config: &PlannerConfig) -> Result<Self, AgentError> {
        Ok(Self::new(TemplateRegistry::load(config.template_path.as_deref())?))
    }

    /// Render the template for the goal's task type. A template that cannot
    /// render degrades to the generic template.
    pub fn generate(&self, goal: &Goal) -> Plan {
        match self.render(goal) {
            Ok(plan) => {
                info!(
                    task_type = %plan.task_type,
                    steps = plan.steps.len(),
                    "Generated plan from template"
                );
                plan
            }
            Err(err) => {
                warn!(task_type = %goal.task_type, error = %err, "Template failed, using generic plan");
                self.generic(goal)
            }
        }
    }

    fn render(&self, goal: &Goal) -> Result<Plan, AgentError> {
        let template = self.registry.get(goal.task_type).ok_or_else(|| {
            AgentError::plan_generation(format!("no template for {}", goal.task_type))
        })?;
        template.render(goal)
    }

    /// Generic plan for the goal text.
    pub fn generic(&self, goal: &Goal) -> Plan {
        let mut generic_goal = Goal::new(goal.text.clone(), TaskType::Generic);
        if let Some(url) = goal.param("url") {
            generic_goal = generic_goal.with_param("url", url);
        }
        self.registry
            .get(TaskType::Generic)
            .and_then(|template| template.render(&generic_goal).ok())
            .unwrap_or_else(|| {
                Plan::new(goal.text.clone(), TaskType::Generic, PlanSource::Template)
                    .with_steps(vec![Step::observe("page_loaded")])
            })
    }

    /// Build a plan from an analysis payload.
    ///
    /// Explicit steps in the payload are used as-is; otherwise the analyzed
    /// task type and parameters are rendered through the templates.
    pub fn from_analysis(&self, goal: &Goal, value: &Value) -> Result<Plan, AgentError> {
        let analysis = parse_analysis(value)?;
        let title = analysis.title.clone().unwrap_or_else(|| goal.text.clone());

        if !analysis.steps.is_empty() {
            return Ok(
                Plan::new(title, analysis.task_type, PlanSource::Analysis).with_steps(analysis.steps)
            );
        }

        let analyzed = Goal {
            text: goal.text.clone(),
            task_type: analysis.task_type,
            parameters: analysis.parameters,
        };
        let mut plan = self.render(&analyzed)?;
        plan.source = PlanSource::Analysis;
        Ok(plan)
    }
}

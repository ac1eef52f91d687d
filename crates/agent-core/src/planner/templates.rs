use std::collections::{BTreeMap, HashMap};
use std::{env, fs, path::Path};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::AgentError;
use crate::model::{Goal, Plan, PlanSource, Step, StepAction, StepTarget, TaskType};

pub const TEMPLATE_ENV: &str = "TABPILOT_PLAN_TEMPLATES";

const BUILTIN_TEMPLATES: &str = include_str!("templates.yaml");

static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

#[derive(Debug, Default, Deserialize)]
struct TemplateFile {
    #[serde(default)]
    templates: HashMap<String, PlanTemplate>,
}

/// Declarative plan shape for one task type.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanTemplate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
    #[serde(default)]
    pub steps: Vec<StepTemplate>,
    #[serde(default)]
    pub repeat: Option<RepeatTemplate>,
    #[serde(default)]
    pub finally: Vec<StepTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepeatTemplate {
    /// Name of the numeric parameter driving the repetition.
    pub count: String,
    #[serde(default = "default_repeat_max")]
    pub max: u32,
    pub steps: Vec<StepTemplate>,
}

fn default_repeat_max() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepTemplate {
    pub action: StepAction,
    #[serde(default)]
    pub target: Option<TargetTemplate>,
    #[serde(default)]
    pub value: Option<String>,
    pub sub_goal: String,
    #[serde(default)]
    pub expected_state: Option<String>,
    #[serde(default)]
    pub fallback_hints: Vec<String>,
    #[serde(default)]
    pub critical: bool,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub unless: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetTemplate {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub selector: Option<String>,
}

/// Replace `{name}` placeholders; a missing name is an error.
pub fn render(text: &str, params: &BTreeMap<String, String>) -> Result<String, AgentError> {
    let mut missing = None;
    let rendered = PLACEHOLDER_REGEX.replace_all(text, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match params.get(name) {
            Some(value) => value.clone(),
            None => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });
    match missing {
        Some(name) => Err(AgentError::template(format!(
            "missing parameter '{name}' in '{text}'"
        ))),
        None => Ok(rendered.into_owned()),
    }
}

impl StepTemplate {
    fn applies(&self, params: &BTreeMap<String, String>) -> bool {
        self.requires.iter().all(|name| params.contains_key(name))
            && !self.unless.iter().any(|name| params.contains_key(name))
    }

    fn render(&self, params: &BTreeMap<String, String>) -> Result<Step, AgentError> {
        let target = match &self.target {
            Some(target) => StepTarget {
                description: render(&target.description, params)?,
                selector: target
                    .selector
                    .as_deref()
                    .map(|s| render(s, params))
                    .transpose()?,
            },
            None => StepTarget::default(),
        };
        let value = self
            .value
            .as_deref()
            .map(|v| render(v, params))
            .transpose()?;
        let fallback_hints = self
            .fallback_hints
            .iter()
            .map(|hint| render(hint, params))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Step {
            action: self.action,
            target,
            value,
            sub_goal: self.sub_goal.clone(),
            expected_state: self.expected_state.clone(),
            fallback_hints,
            critical: self.critical,
        })
    }
}

impl PlanTemplate {
    /// Render against a goal. Parameters win over template defaults.
    pub fn render(&self, goal: &Goal) -> Result<Plan, AgentError> {
        let mut params = self.defaults.clone();
        params.extend(goal.parameters.clone());
        params.insert("goal".to_string(), goal.text.clone());

        let mut steps = Vec::new();
        for template in self.steps.iter().filter(|t| t.applies(&params)) {
            steps.push(template.render(&params)?);
        }

        if let Some(repeat) = &self.repeat {
            let raw = params.get(&repeat.count).ok_or_else(|| {
                AgentError::template(format!("repeat parameter '{}' missing", repeat.count))
            })?;
            let count: u32 = raw.trim().parse().map_err(|_| {
                AgentError::template(format!("repeat parameter '{}' is not a number: {raw}", repeat.count))
            })?;
            if count == 0 || count > repeat.max {
                return Err(AgentError::template(format!(
                    "repeat count {count} outside 1..={}",
                    repeat.max
                )));
            }
            for index in 1..=count {
                let mut scoped = params.clone();
                scoped.insert("index".to_string(), index.to_string());
                for template in repeat.steps.iter().filter(|t| t.applies(&scoped)) {
                    steps.push(template.render(&scoped)?);
                }
            }
        }

        for template in self.finally.iter().filter(|t| t.applies(&params)) {
            steps.push(template.render(&params)?);
        }

        if steps.is_empty() {
            return Err(AgentError::template("template rendered no steps"));
        }

        let title = match &self.title {
            Some(title) => render(title, &params).unwrap_or_else(|_| goal.text.clone()),
            None => goal.text.clone(),
        };
        Ok(Plan::new(title, goal.task_type, PlanSource::Template).with_steps(steps))
    }
}

/// Templates keyed by task type.
#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    templates: HashMap<TaskType, PlanTemplate>,
}

impl TemplateRegistry {
    /// Built-in templates only.
    pub fn builtin() -> Result<Self, AgentError> {
        let mut registry = Self {
            templates: HashMap::new(),
        };
        registry.merge_yaml(BUILTIN_TEMPLATES)?;
        if !registry.templates.contains_key(&TaskType::Generic) {
            return Err(AgentError::template("built-in templates lack 'generic'"));
        }
        Ok(registry)
    }

    /// Built-ins overlaid with the file at `path`, if given, else the file
    /// named by `TABPILOT_PLAN_TEMPLATES`.
    pub fn load(path: Option<&Path>) -> Result<Self, AgentError> {
        let mut registry = Self::builtin()?;
        let override_path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(TEMPLATE_ENV).map(Into::into));
        if let Some(path) = override_path {
            let raw = fs::read_to_string(&path).map_err(|err| {
                AgentError::template(format!("{}: {err}", path.display()))
            })?;
            let replaced = registry.merge_yaml(&raw)?;
            info!(path = %path.display(), replaced, "Loaded plan template overrides");
        }
        Ok(registry)
    }

    /// Add templates from YAML, replacing same-named ones. Returns how many
    /// were loaded.
    pub fn merge_yaml(&mut self, raw: &str) -> Result<usize, AgentError> {
        let file: TemplateFile = serde_yaml::from_str(raw)
            .map_err(|err| AgentError::template(format!("invalid template yaml: {err}")))?;
        let mut loaded = 0;
        for (name, template) in file.templates {
            let task_type = TaskType::parse(&name)
                .ok_or_else(|| AgentError::template(format!("unknown task type '{name}'")))?;
            debug!(task_type = %task_type, "registered plan template");
            self.templates.insert(task_type, template);
            loaded += 1;
        }
        Ok(loaded)
    }

    pub fn get(&self, task_type: TaskType) -> Option<&PlanTemplate> {
        self.templates.get(&task_type)
    }
}

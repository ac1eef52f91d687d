//! Agent core: goal analysis and plan generation.
//!
//! Turns natural-language goals into typed [`Goal`]s using an ordered rule
//! table, renders them into [`Plan`]s from YAML templates, and validates
//! untyped payloads coming back from an [`AnalysisProvider`].

pub mod analyzer;
pub mod errors;
pub mod llm_provider;
pub mod model;
pub mod plan_validator;
pub mod planner;

pub use analyzer::{known_site_url, GoalAnalyzer};
pub use errors::AgentError;
pub use llm_provider::{AnalysisProvider, MockAnalysisProvider};
pub use model::{Goal, Plan, PlanSource, Step, StepAction, StepTarget, TaskType};
pub use plan_validator::{parse_analysis, parse_suggestion, Analysis, StepSuggestion};
pub use planner::{PlanGenerator, PlannerConfig, TemplateRegistry};

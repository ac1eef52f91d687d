use tabpilot_core_types::ErrorKind;
use thiserror::Error;

/// Errors emitted by the agent-core crate.
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    /// Raised when no plan can be produced for a goal.
    #[error("plan generation failed: {0}")]
    PlanGeneration(String),

    /// Raised when an analysis payload does not match the expected schema.
    #[error("invalid analysis payload: {0}")]
    InvalidAnalysis(String),

    /// Raised when a plan template cannot be loaded or rendered.
    #[error("template error: {0}")]
    Template(String),

    /// Raised by analysis providers when the backend call fails.
    #[error("analysis provider error: {0}")]
    Provider(String),
}

impl AgentError {
    pub fn plan_generation(message: impl Into<String>) -> Self {
        Self::PlanGeneration(message.into())
    }

    pub fn invalid_analysis(message: impl Into<String>) -> Self {
        Self::InvalidAnalysis(message.into())
    }

    pub fn template(message: impl Into<String>) -> Self {
        Self::Template(message.into())
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Every agent error degrades the plan, never the session.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PlanGenerationError
    }
}

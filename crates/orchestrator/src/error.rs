use agent_core::AgentError;
use page_driver::DriverError;
use tabpilot_core_types::{ErrorKind, OriginId};
use tabpilot_registry::RegistryError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("goal is empty")]
    EmptyGoal,
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Planning(#[from] AgentError),
    #[error("no page context for origin {origin}: {source}")]
    Context {
        origin: OriginId,
        #[source]
        source: DriverError,
    },
}

impl OrchestratorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestratorError::EmptyGoal => ErrorKind::PlanGenerationError,
            OrchestratorError::Registry(err) => err.kind(),
            OrchestratorError::Planning(err) => err.kind(),
            OrchestratorError::Context { source, .. } => source.kind(),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, OrchestratorError::Registry(RegistryError::Conflict(_)))
    }
}

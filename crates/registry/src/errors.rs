use tabpilot_core_types::{ErrorKind, OriginId};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session for origin {0} is already running")]
    Conflict(OriginId),
    #[error("no session for origin {0}")]
    NotFound(OriginId),
    #[error("step result {got} out of order, expected {expected}")]
    OutOfOrder { expected: usize, got: usize },
    #[error("plan has {0} steps; history is full")]
    PlanExhausted(usize),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Conflict(_) | RegistryError::NotFound(_) => ErrorKind::SessionConflict,
            RegistryError::OutOfOrder { .. } | RegistryError::PlanExhausted(_) => {
                ErrorKind::InteractionFailed
            }
        }
    }
}

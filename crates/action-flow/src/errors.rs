//! Step execution error types

use action_locator::LocatorError;
use page_driver::DriverError;
use state_verifier::VerifyError;
use tabpilot_core_types::{ErrorKind, TaskError};
use thiserror::Error;

/// Step execution errors
#[derive(Debug, Error, Clone)]
pub enum FlowError {
    /// No strategy produced a usable element
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// The page rejected the interaction
    #[error("Interaction failed: {0}")]
    InteractionFailed(String),

    /// Navigation kept failing after bounded retries
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// Expected state did not hold and verification is strict
    #[error("State verification failed: {0}")]
    VerificationFailed(String),

    /// Step ran past its time budget
    #[error("Step timed out after {0}ms")]
    Timeout(u64),

    /// Step is missing something it needs to run (URL, value, duration)
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    /// Memory lookup failed
    #[error("Memory retrieval failed: {0}")]
    Memory(String),

    /// Locator error
    #[error(transparent)]
    Locator(#[from] LocatorError),

    /// Verifier error
    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::ElementNotFound(_) => ErrorKind::ElementNotFound,
            FlowError::InteractionFailed(_)
            | FlowError::Timeout(_)
            | FlowError::InvalidStep(_)
            | FlowError::Memory(_) => ErrorKind::InteractionFailed,
            FlowError::NavigationFailed(_) => ErrorKind::NavigationFailed,
            FlowError::VerificationFailed(_) => ErrorKind::StateVerificationFailed,
            FlowError::Locator(err) => err.kind(),
            FlowError::Verify(err) => err.kind(),
        }
    }

    /// Whether another attempt at the same step could change the outcome
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FlowError::InvalidStep(_) | FlowError::Timeout(_))
    }

    /// Tagged form recorded in step results
    pub fn to_task_error(&self) -> TaskError {
        TaskError::new(self.kind(), self.to_string())
    }
}

impl From<DriverError> for FlowError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::Navigation(reason) => FlowError::NavigationFailed(reason),
            DriverError::StaleElement(reason) => FlowError::ElementNotFound(reason),
            other => FlowError::InteractionFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_keep_their_kind() {
        let nav: FlowError = DriverError::Navigation("dns".into()).into();
        assert_eq!(nav.kind(), ErrorKind::NavigationFailed);

        let stale: FlowError = DriverError::StaleElement("p0:e1".into()).into();
        assert_eq!(stale.kind(), ErrorKind::ElementNotFound);

        let rejected: FlowError = DriverError::InteractionRejected("disabled".into()).into();
        assert_eq!(rejected.kind(), ErrorKind::InteractionFailed);
        assert!(rejected.is_recoverable());
    }

    #[test]
    fn task_error_carries_message() {
        let err = FlowError::ElementNotFound("search box".into()).to_task_error();
        assert_eq!(err.kind, ErrorKind::ElementNotFound);
        assert!(err.message.contains("search box"));
        assert!(!FlowError::Timeout(100).is_recoverable());
    }
}

//! Error types for page drivers

use tabpilot_core_types::ErrorKind;
use thiserror::Error;

/// Errors a page driver may report back to the engine
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// Page failed to load (network error, unreachable host)
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Page rejected the click/type/select
    #[error("Interaction rejected: {0}")]
    InteractionRejected(String),

    /// Element reference no longer belongs to the current document
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// Driver call did not complete in time
    #[error("Driver timeout: {0}")]
    Timeout(String),

    /// Transport or protocol failure talking to the page
    #[error("Driver I/O error: {0}")]
    Io(String),
}

impl DriverError {
    /// Map onto the shared error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Navigation(_) => ErrorKind::NavigationFailed,
            DriverError::StaleElement(_) => ErrorKind::ElementNotFound,
            DriverError::InteractionRejected(_)
            | DriverError::Timeout(_)
            | DriverError::Io(_) => ErrorKind::InteractionFailed,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DriverError::Navigation(_) | DriverError::Timeout(_) | DriverError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_errors_map_to_taxonomy() {
        assert_eq!(
            DriverError::Navigation("dns".into()).kind(),
            ErrorKind::NavigationFailed
        );
        assert_eq!(
            DriverError::StaleElement("p0:e1".into()).kind(),
            ErrorKind::ElementNotFound
        );
        assert_eq!(
            DriverError::InteractionRejected("disabled".into()).kind(),
            ErrorKind::InteractionFailed
        );
        assert!(!DriverError::InteractionRejected("x".into()).is_retryable());
    }
}

//! Error types for state verification

use page_driver::DriverError;
use tabpilot_core_types::ErrorKind;
use thiserror::Error;

/// Verification error enumeration
///
/// A state that simply does not hold is a failed [`crate::Verification`],
/// not an error.
#[derive(Debug, Error, Clone)]
pub enum VerifyError {
    /// Invalid condition (bad regex, empty selector)
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Driver kept failing until the verify timeout
    #[error("Driver error during verification: {0}")]
    Driver(#[from] DriverError),
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::InvalidCondition(_) => ErrorKind::StateVerificationFailed,
            VerifyError::Driver(err) => err.kind(),
        }
    }
}

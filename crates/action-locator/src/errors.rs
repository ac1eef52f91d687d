//! Error types for locator system

use page_driver::DriverError;
use tabpilot_core_types::ErrorKind;
use thiserror::Error;

/// Locator error enumeration
///
/// "Nothing matched" is not an error; strategies return an empty list.
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Request carries neither a selector, hints nor a description
    #[error("Invalid locate request: {0}")]
    InvalidRequest(String),

    /// Driver call failed
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl LocatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LocatorError::InvalidRequest(_) => ErrorKind::ElementNotFound,
            LocatorError::Driver(err) => err.kind(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LocatorError::Driver(err) => err.is_retryable(),
            LocatorError::InvalidRequest(_) => false,
        }
    }
}

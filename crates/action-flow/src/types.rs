//! Core types for step execution

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use agent_core::Step;
use state_verifier::VerifierConfig;
use tabpilot_core_types::TaskError;

use crate::errors::FlowError;

/// Outcome of one executed step, appended to the session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in its plan
    pub step_index: usize,

    /// Phase the step belongs to
    pub sub_goal: String,

    /// Whether the step succeeded (verified or not)
    pub success: bool,

    /// Failure, if any
    pub error: Option<TaskError>,

    /// Whether the expected state was confirmed
    pub state_verified: bool,

    /// When the step finished
    pub timestamp: DateTime<Utc>,

    /// Attempts spent, recovery included
    pub attempts: u32,

    /// How the step got through, when it needed help
    pub recovery_note: Option<String>,

    /// Wall time spent on the step
    pub duration_ms: u64,
}

impl StepResult {
    pub fn success(index: usize, step: &Step, verified: bool) -> Self {
        Self {
            step_index: index,
            sub_goal: step.sub_goal.clone(),
            success: true,
            error: None,
            state_verified: verified,
            timestamp: Utc::now(),
            attempts: 1,
            recovery_note: None,
            duration_ms: 0,
        }
    }

    pub fn failure(index: usize, step: &Step, error: TaskError) -> Self {
        Self {
            step_index: index,
            sub_goal: step.sub_goal.clone(),
            success: false,
            error: Some(error),
            state_verified: false,
            timestamp: Utc::now(),
            attempts: 1,
            recovery_note: None,
            duration_ms: 0,
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.recovery_note = note;
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }

    /// Human-readable failure reason
    pub fn reason(&self) -> Option<&str> {
        self.error.as_ref().map(|err| err.message.as_str())
    }
}

/// Per-step state machine
///
/// `Pending → InFlight → {VerifiedSuccess | UnverifiedSuccess | Failed}`;
/// recovery may send a settled step back to `InFlight`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    Pending,
    InFlight,
    VerifiedSuccess,
    UnverifiedSuccess,
    Failed,
}

impl StepPhase {
    /// Move to `next`, rejecting transitions the machine does not allow
    pub fn advance(self, next: StepPhase) -> Result<StepPhase, FlowError> {
        use StepPhase::*;
        let allowed = matches!(
            (self, next),
            (Pending, InFlight)
                | (InFlight, VerifiedSuccess)
                | (InFlight, UnverifiedSuccess)
                | (InFlight, Failed)
                | (UnverifiedSuccess, InFlight)
                | (UnverifiedSuccess, Failed)
                | (Failed, InFlight)
        );
        if allowed {
            Ok(next)
        } else {
            Err(FlowError::InvalidStep(format!(
                "illegal step transition {self} -> {next}"
            )))
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            StepPhase::VerifiedSuccess | StepPhase::UnverifiedSuccess | StepPhase::Failed
        )
    }
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepPhase::Pending => "pending",
            StepPhase::InFlight => "in_flight",
            StepPhase::VerifiedSuccess => "verified_success",
            StepPhase::UnverifiedSuccess => "unverified_success",
            StepPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Timing knobs for step execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Settle wait after every interaction
    pub settle_ms: u64,
    /// Settle wait used by recovery
    pub extended_settle_ms: u64,
    pub verify_timeout_ms: u64,
    pub verify_poll_ms: u64,
    /// Budget for one step, recovery included
    pub step_timeout_ms: u64,
    /// Navigation attempts before giving up
    pub nav_retries: u32,
    pub nav_backoff_ms: u64,
    pub nav_backoff_cap_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            settle_ms: 400,
            extended_settle_ms: 2_000,
            verify_timeout_ms: 3_000,
            verify_poll_ms: 250,
            step_timeout_ms: 15_000,
            nav_retries: 3,
            nav_backoff_ms: 500,
            nav_backoff_cap_ms: 8_000,
        }
    }
}

impl ExecutorConfig {
    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            timeout: Duration::from_millis(self.verify_timeout_ms),
            poll_interval: Duration::from_millis(self.verify_poll_ms.max(1)),
        }
    }

    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    /// Exponential backoff before navigation retry `attempt` (1-based)
    pub fn nav_backoff(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let total_ms = self.nav_backoff_ms.saturating_mul(multiplier);
        Duration::from_millis(total_ms.min(self.nav_backoff_cap_ms))
    }
}

/// Recovery and abort settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Consecutive failed steps that fail the session
    pub max_consecutive_failures: u32,
    /// Treat a step whose expected state never held as failed
    pub strict_verification: bool,
    /// Ask the analysis provider for an alternate target
    pub use_suggestions: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            strict_verification: false,
            use_suggestions: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_phase_transitions() {
        let phase = StepPhase::Pending.advance(StepPhase::InFlight).unwrap();
        let phase = phase.advance(StepPhase::UnverifiedSuccess).unwrap();
        assert!(phase.is_settled());
        let phase = phase.advance(StepPhase::InFlight).unwrap();
        assert!(phase.advance(StepPhase::VerifiedSuccess).is_ok());

        assert!(StepPhase::Pending.advance(StepPhase::VerifiedSuccess).is_err());
        assert!(StepPhase::VerifiedSuccess.advance(StepPhase::InFlight).is_err());
    }

    #[test]
    fn nav_backoff_doubles_and_caps() {
        let config = ExecutorConfig::default();
        assert_eq!(config.nav_backoff(1).as_millis(), 500);
        assert_eq!(config.nav_backoff(2).as_millis(), 1_000);
        assert_eq!(config.nav_backoff(3).as_millis(), 2_000);
        assert_eq!(config.nav_backoff(10).as_millis(), 8_000);
    }

    #[test]
    fn configs_deserialize_partially() {
        let config: ExecutorConfig = serde_json::from_str(r#"{"settle_ms": 50}"#).unwrap();
        assert_eq!(config.settle_ms, 50);
        assert_eq!(config.step_timeout_ms, 15_000);

        let recovery: RecoveryConfig =
            serde_json::from_str(r#"{"strict_verification": true}"#).unwrap();
        assert!(recovery.strict_verification);
        assert_eq!(recovery.max_consecutive_failures, 3);
    }
}

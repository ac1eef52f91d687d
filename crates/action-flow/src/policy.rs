//! Session-level abort policy

use agent_core::Step;
use tracing::warn;

use crate::types::{RecoveryConfig, StepResult};

/// What the runner should do after a step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortDecision {
    Continue,
    Abort(String),
}

/// Fails a session on a critical-step failure or a run of failed steps
#[derive(Debug, Clone)]
pub struct AbortPolicy {
    max_consecutive_failures: u32,
    consecutive_failures: u32,
}

impl AbortPolicy {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            max_consecutive_failures: max_consecutive_failures.max(1),
            consecutive_failures: 0,
        }
    }

    pub fn from_config(config: &RecoveryConfig) -> Self {
        Self::new(config.max_consecutive_failures)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Fold a finished step into the policy
    pub fn record(&mut self, step: &Step, result: &StepResult) -> AbortDecision {
        if result.success {
            self.consecutive_failures = 0;
            return AbortDecision::Continue;
        }

        self.consecutive_failures += 1;
        let reason = result.reason().unwrap_or("unknown error");

        if step.critical {
            warn!(
                step = result.step_index,
                sub_goal = %result.sub_goal,
                "Critical step failed"
            );
            return AbortDecision::Abort(format!(
                "critical step {} ({}) failed: {reason}",
                result.step_index + 1,
                result.sub_goal
            ));
        }

        if self.consecutive_failures >= self.max_consecutive_failures {
            warn!(
                failures = self.consecutive_failures,
                "Consecutive failure limit reached"
            );
            return AbortDecision::Abort(format!(
                "{} consecutive steps failed; last was step {} ({}): {reason}",
                self.consecutive_failures,
                result.step_index + 1,
                result.sub_goal
            ));
        }

        AbortDecision::Continue
    }
}

impl Default for AbortPolicy {
    fn default() -> Self {
        Self::from_config(&RecoveryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::StepAction;
    use tabpilot_core_types::{ErrorKind, TaskError};

    fn failed(index: usize, step: &Step) -> StepResult {
        StepResult::failure(
            index,
            step,
            TaskError::new(ErrorKind::ElementNotFound, "nothing matched"),
        )
    }

    #[test]
    fn third_consecutive_failure_aborts() {
        let step = Step::new(StepAction::Click, "explore");
        let mut policy = AbortPolicy::default();
        assert_eq!(policy.record(&step, &failed(0, &step)), AbortDecision::Continue);
        assert_eq!(policy.record(&step, &failed(1, &step)), AbortDecision::Continue);
        match policy.record(&step, &failed(2, &step)) {
            AbortDecision::Abort(reason) => {
                assert!(reason.starts_with("3 consecutive steps failed"));
                assert!(reason.contains("nothing matched"));
            }
            other => panic!("expected abort, got {other:?}"),
        }
    }

    #[test]
    fn success_resets_the_run() {
        let step = Step::new(StepAction::Click, "explore");
        let mut policy = AbortPolicy::new(2);
        policy.record(&step, &failed(0, &step));
        policy.record(&step, &StepResult::success(1, &step, true));
        assert_eq!(policy.consecutive_failures(), 0);
        assert_eq!(policy.record(&step, &failed(2, &step)), AbortDecision::Continue);
    }

    #[test]
    fn critical_failure_aborts_immediately() {
        let step = Step::new(StepAction::Click, "cart_operation").critical();
        let mut policy = AbortPolicy::default();
        match policy.record(&step, &failed(6, &step)) {
            AbortDecision::Abort(reason) => {
                assert!(reason.contains("critical step 7 (cart_operation)"))
            }
            other => panic!("expected abort, got {other:?}"),
        }
    }
}

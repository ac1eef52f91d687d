use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use action_flow::StepResult;
use agent_core::{Goal, Plan, PlanSource, TaskType};
use chrono::{DateTime, Utc};
use page_driver::PageDriver;
use serde::{Deserialize, Serialize};
use tabpilot_core_types::{OriginId, RunId, TaskError, TaskStatus};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::RegistryError;

/// Idle thresholds for the periodic sweep
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Release the page-context handle after this long without activity
    pub context_idle_secs: u64,
    /// Evict a finished session after this long
    pub session_idle_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_idle_secs: 60,
            session_idle_secs: 300,
            sweep_interval_secs: 15,
        }
    }
}

impl SessionConfig {
    pub fn context_idle(&self) -> Duration {
        Duration::from_secs(self.context_idle_secs)
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Everything the engine knows about one origin's task.
///
/// Invariants kept by the mutators below:
/// - `history.len() == current_step_index <= plan.steps.len()`
/// - at most one run is active; `start` resets the step cursor and bumps
///   `generation`, the thinking log carries over
pub struct TaskSession {
    pub session_id: OriginId,
    pub run_id: RunId,
    pub goal: Goal,
    pub plan: Plan,
    pub current_step_index: usize,
    pub history: Vec<StepResult>,
    pub status: TaskStatus,
    pub last_activity: Instant,
    pub last_activity_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<Instant>,
    pub completed_at_utc: Option<DateTime<Utc>>,
    pub thinking_log: Vec<String>,
    pub generation: u32,
    pub last_failure: Option<TaskError>,
    pub cancel: CancellationToken,
    pub page: Option<Arc<dyn PageDriver>>,
    /// Set once the current goal has been replanned
    pub replanned: bool,
}

impl TaskSession {
    pub fn new(origin: OriginId) -> Self {
        let now = Utc::now();
        Self {
            session_id: origin,
            run_id: RunId::new(),
            goal: Goal::new("", TaskType::Generic),
            plan: Plan::new("", TaskType::Generic, PlanSource::Template),
            current_step_index: 0,
            history: Vec::new(),
            status: TaskStatus::Idle,
            last_activity: Instant::now(),
            last_activity_at: now,
            created_at: now,
            completed_at: None,
            completed_at_utc: None,
            thinking_log: Vec::new(),
            generation: 0,
            last_failure: None,
            cancel: CancellationToken::new(),
            page: None,
            replanned: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    /// Begin a run for a new goal
    pub fn start(&mut self, goal: Goal, plan: Plan) -> Result<(), RegistryError> {
        if self.is_running() {
            return Err(RegistryError::Conflict(self.session_id.clone()));
        }
        self.generation += 1;
        self.run_id = RunId::new();
        self.plan = plan.with_generation(self.generation);
        self.goal = goal;
        self.current_step_index = 0;
        self.history.clear();
        self.status = TaskStatus::Running;
        self.completed_at = None;
        self.completed_at_utc = None;
        self.last_failure = None;
        self.cancel = CancellationToken::new();
        self.replanned = false;
        self.touch();
        let line = format!(
            "Goal (generation {}): {} -> {} step(s), {}",
            self.generation,
            self.goal.text,
            self.plan.len(),
            self.plan.task_type.as_str()
        );
        self.think(line);
        Ok(())
    }

    /// Swap in a fresh plan for the same goal after a failed run
    pub fn replace_plan(&mut self, plan: Plan) {
        self.generation += 1;
        self.plan = plan.with_generation(self.generation);
        self.current_step_index = 0;
        self.history.clear();
        self.replanned = true;
        self.touch();
        let line = format!(
            "Replanned (generation {}): {} step(s)",
            self.generation,
            self.plan.len()
        );
        self.think(line);
    }

    /// Append the result of the step at `current_step_index`
    pub fn record_step(&mut self, result: StepResult) -> Result<(), RegistryError> {
        if self.history.len() >= self.plan.len() {
            return Err(RegistryError::PlanExhausted(self.plan.len()));
        }
        if result.step_index != self.current_step_index {
            return Err(RegistryError::OutOfOrder {
                expected: self.current_step_index,
                got: result.step_index,
            });
        }
        if let Some(error) = &result.error {
            self.last_failure = Some(error.clone());
        }
        self.history.push(result);
        self.current_step_index += 1;
        self.touch();
        Ok(())
    }

    /// Move to a terminal status
    pub fn finish(&mut self, status: TaskStatus, failure: Option<TaskError>) {
        self.status = status;
        if failure.is_some() {
            self.last_failure = failure;
        }
        self.touch();
        self.completed_at = Some(self.last_activity);
        self.completed_at_utc = Some(self.last_activity_at);
    }

    pub fn think(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!(origin = %self.session_id, %line, "thinking");
        self.thinking_log.push(line);
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
        self.last_activity_at = Utc::now();
    }

    /// Hand over the page handle once it has idled past `context_idle`
    pub fn take_idle_page(
        &mut self,
        now: Instant,
        context_idle: Duration,
    ) -> Option<Arc<dyn PageDriver>> {
        if self.is_running() || self.page.is_none() {
            return None;
        }
        if now.saturating_duration_since(self.last_activity) < context_idle {
            return None;
        }
        self.page.take()
    }

    /// Whether the session has sat finished (or never started) for `session_idle`
    pub fn is_expired(&self, now: Instant, session_idle: Duration) -> bool {
        if self.is_running() {
            return false;
        }
        let since = self.completed_at.unwrap_or(self.last_activity);
        now.saturating_duration_since(since) >= session_idle
    }
}

impl fmt::Debug for TaskSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskSession")
            .field("session_id", &self.session_id)
            .field("run_id", &self.run_id)
            .field("status", &self.status)
            .field("generation", &self.generation)
            .field("current_step_index", &self.current_step_index)
            .field("plan_len", &self.plan.len())
            .field("has_page", &self.page.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{Step, StepAction};

    fn plan(steps: usize) -> Plan {
        let steps = (0..steps)
            .map(|i| Step::new(StepAction::Wait, format!("pause_{i}")).with_value("10"))
            .collect();
        Plan::new("pauses", TaskType::Generic, PlanSource::Template).with_steps(steps)
    }

    fn started(steps: usize) -> TaskSession {
        let mut session = TaskSession::new(OriginId::new("tab-1"));
        session
            .start(Goal::new("wait a bit", TaskType::Generic), plan(steps))
            .unwrap();
        session
    }

    #[test]
    fn history_tracks_the_step_cursor() {
        let mut session = started(2);
        let step = session.plan.steps[0].clone();
        session
            .record_step(StepResult::success(0, &step, true))
            .unwrap();
        assert_eq!(session.history.len(), session.current_step_index);

        assert_eq!(
            session.record_step(StepResult::success(0, &step, true)),
            Err(RegistryError::OutOfOrder {
                expected: 1,
                got: 0
            })
        );
        session
            .record_step(StepResult::success(1, &step, true))
            .unwrap();
        assert_eq!(
            session.record_step(StepResult::success(2, &step, true)),
            Err(RegistryError::PlanExhausted(2))
        );
        assert_eq!(session.history.len(), 2);
    }

    #[test]
    fn follow_up_goal_starts_a_new_generation() {
        let mut session = started(1);
        let step = session.plan.steps[0].clone();
        session
            .record_step(StepResult::success(0, &step, true))
            .unwrap();

        let err = session
            .start(Goal::new("again", TaskType::Generic), plan(3))
            .unwrap_err();
        assert_eq!(err, RegistryError::Conflict(OriginId::new("tab-1")));

        session.finish(TaskStatus::Completed, None);
        let first_run = session.run_id.clone();
        session
            .start(Goal::new("again", TaskType::Generic), plan(3))
            .unwrap();
        assert_eq!(session.generation, 2);
        assert_eq!(session.plan.generation, 2);
        assert_ne!(session.run_id, first_run);
        assert!(session.history.is_empty());
        assert_eq!(session.current_step_index, 0);
        assert_eq!(session.thinking_log.len(), 2);
        assert!(session.completed_at.is_none());
    }

    #[test]
    fn replanning_resets_the_cursor() {
        let mut session = started(2);
        let step = session.plan.steps[0].clone();
        session
            .record_step(StepResult::success(0, &step, false))
            .unwrap();
        session.replace_plan(plan(1));
        assert!(session.replanned);
        assert_eq!(session.generation, 2);
        assert_eq!(session.current_step_index, 0);
        assert!(session.is_running());
    }
}

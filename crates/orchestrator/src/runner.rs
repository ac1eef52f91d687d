use std::sync::Arc;

use action_flow::{
    AbortDecision, AbortPolicy, ActionExecutor, ExecutionCursor, RecoveryConfig, StepResult,
};
use agent_core::{AgentError, AnalysisProvider, Goal, Plan, PlanGenerator, Step};
use page_driver::PageDriver;
use parking_lot::RwLock;
use tabpilot_core_types::{OriginId, TaskStatus};
use tabpilot_event_bus::{EventRouter, TaskEvent};
use tabpilot_registry::TaskSession;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum RunOutcome {
    Completed,
    Aborted { before_step: usize },
    Failed { reason: String },
}

/// Drives one session's plan, one step at a time
pub(crate) struct Runner {
    pub origin: OriginId,
    pub session: Arc<RwLock<TaskSession>>,
    pub page: Arc<dyn PageDriver>,
    pub cancel: CancellationToken,
    pub executor: Arc<ActionExecutor>,
    pub planner: Arc<PlanGenerator>,
    pub provider: Option<Arc<dyn AnalysisProvider>>,
    pub events: Arc<EventRouter<TaskEvent>>,
    pub recovery: RecoveryConfig,
    pub replan_on_failure: bool,
}

impl Runner {
    pub(crate) async fn run(self) {
        let mut outcome = self.run_plan().await;
        if let RunOutcome::Failed { reason } = &outcome {
            if self.replan(reason).await {
                outcome = self.run_plan().await;
            }
        }
        self.finish(outcome);
    }

    async fn run_plan(&self) -> RunOutcome {
        let (plan, generation) = {
            let session = self.session.read();
            (session.plan.clone(), session.generation)
        };
        let total = plan.len();
        let mut policy = AbortPolicy::from_config(&self.recovery);
        let mut cursor = ExecutionCursor::default();

        for (index, step) in plan.steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return RunOutcome::Aborted { before_step: index };
            }

            let description = step.describe();
            self.think(format!("Step {}/{total}: {description}", index + 1));
            self.events.publish(
                &self.origin,
                TaskEvent::StepStarted {
                    origin: self.origin.clone(),
                    generation,
                    index,
                    total,
                    description,
                },
            );

            let result = self
                .executor
                .execute_step(self.page.as_ref(), index, step, &mut cursor)
                .await;
            let decision = policy.record(step, &result);
            let line = step_line(index, step, &result);

            {
                let mut session = self.session.write();
                if let Err(err) = session.record_step(result.clone()) {
                    warn!(origin = %self.origin, error = %err, "step result not recorded");
                }
            }
            self.events.publish(
                &self.origin,
                TaskEvent::StepFinished {
                    origin: self.origin.clone(),
                    generation,
                    result,
                },
            );
            self.think(line);

            if let AbortDecision::Abort(reason) = decision {
                return RunOutcome::Failed { reason };
            }
        }
        RunOutcome::Completed
    }

    /// Ask the provider for a fresh plan from the current page, once per goal.
    /// The abandoned plan's failure is logged first; without a replan the
    /// finishing line carries it instead.
    async fn replan(&self, reason: &str) -> bool {
        let Some(provider) = self.provider.as_ref() else {
            return false;
        };
        if !self.replan_on_failure || self.cancel.is_cancelled() {
            return false;
        }
        let goal = {
            let session = self.session.read();
            if session.replanned {
                return false;
            }
            session.goal.clone()
        };

        self.think(format!("Plan failed: {reason}"));
        self.think("Asking for a new plan from the current page");
        let plan = match self.analyze(provider.as_ref(), &goal).await {
            Ok(plan) if !plan.is_empty() => plan,
            Ok(_) => {
                self.think("Replan skipped: the new plan has no steps");
                return false;
            }
            Err(err) => {
                warn!(origin = %self.origin, error = %err, "replan failed");
                self.think(format!("Replan skipped: {err}"));
                return false;
            }
        };

        let (generation, steps, line) = {
            let mut session = self.session.write();
            session.replace_plan(plan);
            (
                session.generation,
                session.plan.steps.iter().map(Step::describe).collect(),
                session.thinking_log.last().cloned(),
            )
        };
        info!(origin = %self.origin, generation, "replanned");
        self.events.publish(
            &self.origin,
            TaskEvent::Replanned {
                origin: self.origin.clone(),
                generation,
                steps,
            },
        );
        if let Some(line) = line {
            self.publish_thinking(line);
        }
        true
    }

    async fn analyze(
        &self,
        provider: &dyn AnalysisProvider,
        goal: &Goal,
    ) -> Result<Plan, AgentError> {
        let snapshot = self
            .page
            .snapshot()
            .await
            .map_err(|err| AgentError::provider(err.to_string()))?;
        let value = provider.analyze_goal(&snapshot, &goal.text).await?;
        self.planner.from_analysis(goal, &value)
    }

    fn finish(&self, outcome: RunOutcome) {
        let (status, reason) = match outcome {
            RunOutcome::Completed => (TaskStatus::Completed, None),
            RunOutcome::Aborted { before_step } => (
                TaskStatus::Aborted,
                Some(format!("stopped by request before step {}", before_step + 1)),
            ),
            RunOutcome::Failed { reason } => (TaskStatus::Failed, Some(reason)),
        };

        let (generation, completed_steps, line) = {
            let mut session = self.session.write();
            session.finish(status, None);
            let total = session.plan.len();
            let succeeded = session.history.iter().filter(|r| r.success).count();
            let line = match &reason {
                None => format!("Task completed: {succeeded}/{total} steps succeeded"),
                Some(reason) if status == TaskStatus::Aborted => format!("Task {reason}"),
                Some(reason) => format!("Task failed: {reason}"),
            };
            session.think(line.clone());
            (session.generation, session.history.len(), line)
        };

        match status {
            TaskStatus::Completed => info!(origin = %self.origin, completed_steps, "task completed"),
            _ => warn!(origin = %self.origin, %status, reason = ?reason, "task ended early"),
        }
        self.publish_thinking(line);
        self.events.publish(
            &self.origin,
            TaskEvent::Finished {
                origin: self.origin.clone(),
                generation,
                status,
                completed_steps,
                reason,
            },
        );
    }

    fn think(&self, line: impl Into<String>) {
        let line = line.into();
        self.session.write().think(line.clone());
        self.publish_thinking(line);
    }

    fn publish_thinking(&self, line: String) {
        let delivered = self.events.publish(
            &self.origin,
            TaskEvent::Thinking {
                origin: self.origin.clone(),
                line,
            },
        );
        debug!(origin = %self.origin, delivered, "thinking published");
    }
}

fn step_line(index: usize, step: &Step, result: &StepResult) -> String {
    let mut line = if result.success {
        format!("Step {} ({}) succeeded", index + 1, step.sub_goal)
    } else {
        format!(
            "Step {} ({}) failed: {}",
            index + 1,
            step.sub_goal,
            result.reason().unwrap_or("unknown error")
        )
    };
    if result.success && !result.state_verified {
        line.push_str(" without confirming the expected state");
    }
    if let Some(note) = &result.recovery_note {
        line.push_str(&format!(" [{note}]"));
    }
    line
}

use action_flow::{ExecutorConfig, RecoveryConfig, StepResult};
use agent_core::{Plan, PlannerConfig, TaskType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabpilot_core_types::{OriginId, RunId, TaskError, TaskStatus};
use tabpilot_registry::{SessionConfig, TaskSession};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub session: SessionConfig,
    pub execution: ExecutorConfig,
    pub recovery: RecoveryConfig,
    pub planner: PlannerConfig,
    /// Buffered events per origin before slow subscribers start lagging
    pub event_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            execution: ExecutorConfig::default(),
            recovery: RecoveryConfig::default(),
            planner: PlannerConfig::default(),
            event_capacity: 256,
        }
    }
}

/// Returned once a goal has been planned and its runner spawned
#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub origin: OriginId,
    pub run_id: RunId,
    pub generation: u32,
    pub task_type: TaskType,
    pub plan: Plan,
    /// False when the origin's previous session was reused
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    /// Cancellation requested; the runner aborts at the next step boundary
    Stopping,
    NotRunning { status: TaskStatus },
    NotFound,
}

/// Point-in-time copy of a session, safe to hand to callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub origin: OriginId,
    pub run_id: RunId,
    pub status: TaskStatus,
    pub running: bool,
    pub generation: u32,
    pub goal: String,
    pub task_type: TaskType,
    pub plan_title: String,
    pub steps: Vec<String>,
    pub current_step_index: usize,
    pub history: Vec<StepResult>,
    pub thinking_log: Vec<String>,
    pub last_failure: Option<TaskError>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub has_page_context: bool,
}

impl SessionStatus {
    pub fn from_session(session: &TaskSession) -> Self {
        Self {
            origin: session.session_id.clone(),
            run_id: session.run_id.clone(),
            status: session.status,
            running: session.is_running(),
            generation: session.generation,
            goal: session.goal.text.clone(),
            task_type: session.plan.task_type,
            plan_title: session.plan.title.clone(),
            steps: session.plan.steps.iter().map(|step| step.describe()).collect(),
            current_step_index: session.current_step_index,
            history: session.history.clone(),
            thinking_log: session.thinking_log.clone(),
            last_failure: session.last_failure.clone(),
            created_at: session.created_at,
            last_activity_at: session.last_activity_at,
            completed_at: session.completed_at_utc,
            has_page_context: session.page.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusSnapshot {
    Found(SessionStatus),
    NotFound,
}

impl StatusSnapshot {
    pub fn found(&self) -> Option<&SessionStatus> {
        match self {
            StatusSnapshot::Found(status) => Some(status),
            StatusSnapshot::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.found().is_some()
    }
}

/// Outcome of one sweep pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    /// Page-context handles handed back to the provider
    pub released: usize,
    pub evicted: Vec<OriginId>,
}

use action_flow::StepResult;
use agent_core::TaskType;
use serde::{Deserialize, Serialize};
use tabpilot_core_types::{OriginId, RunId, TaskStatus};

/// Progress reported back to the caller that owns an origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    PlanCreated {
        origin: OriginId,
        run_id: RunId,
        generation: u32,
        task_type: TaskType,
        title: String,
        steps: Vec<String>,
    },
    StepStarted {
        origin: OriginId,
        generation: u32,
        index: usize,
        total: usize,
        description: String,
    },
    StepFinished {
        origin: OriginId,
        generation: u32,
        result: StepResult,
    },
    Thinking {
        origin: OriginId,
        line: String,
    },
    Replanned {
        origin: OriginId,
        generation: u32,
        steps: Vec<String>,
    },
    Finished {
        origin: OriginId,
        generation: u32,
        status: TaskStatus,
        completed_steps: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl TaskEvent {
    pub fn origin(&self) -> &OriginId {
        match self {
            TaskEvent::PlanCreated { origin, .. }
            | TaskEvent::StepStarted { origin, .. }
            | TaskEvent::StepFinished { origin, .. }
            | TaskEvent::Thinking { origin, .. }
            | TaskEvent::Replanned { origin, .. }
            | TaskEvent::Finished { origin, .. } => origin,
        }
    }

    /// Event name used on the SSE stream
    pub fn name(&self) -> &'static str {
        match self {
            TaskEvent::PlanCreated { .. } => "plan_created",
            TaskEvent::StepStarted { .. } => "step_started",
            TaskEvent::StepFinished { .. } => "step_finished",
            TaskEvent::Thinking { .. } => "thinking",
            TaskEvent::Replanned { .. } => "replanned",
            TaskEvent::Finished { .. } => "finished",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Finished { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_type_tag() {
        let event = TaskEvent::Finished {
            origin: OriginId::new("tab-1"),
            generation: 1,
            status: TaskStatus::Failed,
            completed_steps: 4,
            reason: Some("3 consecutive steps failed".into()),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "finished");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["origin"], "tab-1");
        assert_eq!(event.name(), "finished");
        assert!(event.is_terminal());
    }
}

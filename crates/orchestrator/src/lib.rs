//! Session orchestration.
//!
//! [`SessionOrchestrator`] is the caller-facing surface of the engine:
//! start, stop and inspect the task running for an origin, follow its
//! progress events, and sweep idle resources.

pub mod error;
pub mod model;
pub mod orchestrator;
mod runner;

pub use error::OrchestratorError;
pub use model::{
    OrchestratorConfig, SessionStatus, StartReceipt, StatusSnapshot, StopOutcome, SweepSummary,
};
pub use orchestrator::{OrchestratorBuilder, SessionOrchestrator};
pub use tabpilot_event_bus::TaskEvent;

//! Step execution layer
//!
//! Executes plan steps one at a time against a page driver:
//! - [`ActionExecutor`] locates, interacts, settles and verifies
//! - [`RecoveryManager`] proposes the next attempt for a failing step
//! - [`AbortPolicy`] decides when a run of failures ends the session

pub mod errors;
pub mod executor;
pub mod memory;
pub mod policy;
pub mod recovery;
pub mod types;

pub use errors::FlowError;
pub use executor::{ActionExecutor, ExecutionCursor};
pub use memory::{MemoryRetriever, Snippet, StaticMemory};
pub use policy::{AbortDecision, AbortPolicy};
pub use recovery::{RecoveryAction, RecoveryManager, RecoveryState, Targeting};
pub use types::{ExecutorConfig, RecoveryConfig, StepPhase, StepResult};

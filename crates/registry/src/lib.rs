//! Task session registry.
//!
//! One [`TaskSession`] per origin, shared between the runner task that
//! drives it and the readers that report on it. The registry also decides
//! what the periodic sweep releases and evicts.

pub mod errors;
pub mod model;
pub mod state;

pub use errors::RegistryError;
pub use model::{SessionConfig, TaskSession};
pub use state::{Claim, SessionRegistry, SweepReport};

//! Element locator - multi-strategy element resolution
//!
//! Strategies run in fallback order, each only when the previous one found
//! nothing:
//! - exact selector lookup (primary)
//! - fallback selector hints, in order
//! - text / attribute containment over elements that afford the action
//!
//! Only visible elements with a non-zero box are ever returned.

pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use strategies::*;
pub use types::*;

//! Page driver contract
//!
//! The orchestration engine never talks to a browser directly. Everything it
//! needs from a live page goes through the [`PageDriver`] trait:
//! - candidate element lookup (`locate_candidates`)
//! - synthetic input dispatch (`interact`, `navigate`)
//! - navigation state (`current_url`, `page_title`)
//! - settle waits (`wait_for_settle`)
//!
//! [`memory`] ships a fixture-backed driver used by tests and the CLI harness.

pub mod driver;
pub mod errors;
pub mod memory;
pub mod types;

pub use driver::*;
pub use errors::*;
pub use types::*;

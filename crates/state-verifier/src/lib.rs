//! State verifier - checks that the page reached a named symbolic state
//!
//! A [`StateTable`] maps names such as `search_results_page` to a
//! [`StateSpec`] of `all` / `any` / `deny` conditions. Verification is
//! advisory: callers decide what an unverified step means.

pub mod conditions;
pub mod errors;
pub mod table;
pub mod types;
pub mod verifier;

pub use conditions::*;
pub use errors::*;
pub use table::*;
pub use types::*;
pub use verifier::*;

//! Core types for state verification

use crate::conditions::Condition;
use serde::{Deserialize, Serialize};

/// Conditions that together define a named page state.
///
/// The state holds when every `all` condition passes, at least one `any`
/// condition passes (if there are any) and no `deny` condition passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSpec {
    #[serde(default)]
    pub all: Vec<Condition>,

    #[serde(default)]
    pub any: Vec<Condition>,

    #[serde(default)]
    pub deny: Vec<Condition>,
}

impl StateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, condition: Condition) -> Self {
        self.all.push(condition);
        self
    }

    pub fn accept(mut self, condition: Condition) -> Self {
        self.any.push(condition);
        self
    }

    pub fn reject(mut self, condition: Condition) -> Self {
        self.deny.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty() && self.any.is_empty() && self.deny.is_empty()
    }
}

/// Outcome of one verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// State name that was checked
    pub state: String,

    pub passed: bool,

    /// Why it passed or failed
    pub diagnostic: String,

    /// Time spent polling
    pub latency_ms: u64,

    /// Number of polls performed
    pub attempts: u32,
}

impl Verification {
    pub fn pass(state: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            passed: true,
            diagnostic: diagnostic.into(),
            latency_ms: 0,
            attempts: 0,
        }
    }

    pub fn fail(state: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            passed: false,
            diagnostic: diagnostic.into(),
            latency_ms: 0,
            attempts: 0,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

//! Polling state verifier

use page_driver::PageDriver;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::conditions::PageView;
use crate::errors::VerifyError;
use crate::table::StateTable;
use crate::types::{StateSpec, Verification};

/// Floor for the poll interval so a zero setting cannot spin
const MIN_POLL: Duration = Duration::from_millis(10);

/// Polling parameters
#[derive(Debug, Clone, Copy)]
pub struct VerifierConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(3_000),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Checks named states against a live page
pub struct StateVerifier {
    table: Arc<StateTable>,
    config: VerifierConfig,
}

impl StateVerifier {
    pub fn new(table: Arc<StateTable>, config: VerifierConfig) -> Self {
        Self { table, config }
    }

    pub fn table(&self) -> &Arc<StateTable> {
        &self.table
    }

    pub fn config(&self) -> VerifierConfig {
        self.config
    }

    /// Poll until the named state holds or the timeout elapses
    ///
    /// Unknown names pass with a diagnostic. Driver errors are retried until
    /// the deadline and only surface when the last poll also failed.
    pub async fn verify(
        &self,
        driver: &dyn PageDriver,
        state: &str,
    ) -> Result<Verification, VerifyError> {
        self.verify_within(driver, state, self.config.timeout).await
    }

    pub async fn verify_within(
        &self,
        driver: &dyn PageDriver,
        state: &str,
        timeout: Duration,
    ) -> Result<Verification, VerifyError> {
        let Some(spec) = self.table.get(state) else {
            debug!(state, "Unknown state, passing");
            return Ok(Verification::pass(
                state,
                format!("state '{state}' is not registered; not checked"),
            ));
        };
        if spec.is_empty() {
            return Ok(Verification::pass(state, "no conditions to check"));
        }

        let start = Instant::now();
        // a timeout too large to represent never expires
        let deadline = start.checked_add(timeout);
        let expired = || deadline.is_some_and(|deadline| Instant::now() >= deadline);
        let poll = self.config.poll_interval.max(MIN_POLL);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let outcome = evaluate_spec(driver, &spec).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok((true, diagnostic)) => {
                    info!(state, attempts, latency_ms, "State verified");
                    return Ok(Verification::pass(state, diagnostic)
                        .with_latency(latency_ms)
                        .with_attempts(attempts));
                }
                Ok((false, diagnostic)) if expired() => {
                    warn!(state, attempts, latency_ms, %diagnostic, "State not reached");
                    return Ok(Verification::fail(state, diagnostic)
                        .with_latency(latency_ms)
                        .with_attempts(attempts));
                }
                Err(err) if expired() => {
                    warn!(state, attempts, error = %err, "Verification gave up");
                    return Err(err);
                }
                Err(VerifyError::InvalidCondition(reason)) => {
                    return Err(VerifyError::InvalidCondition(reason));
                }
                Ok((false, diagnostic)) => {
                    debug!(state, attempts, %diagnostic, "State pending");
                }
                Err(err) => {
                    debug!(state, attempts, error = %err, "Verification poll failed");
                }
            }

            let wait = match deadline {
                Some(deadline) => poll.min(deadline.saturating_duration_since(Instant::now())),
                None => poll,
            };
            tokio::time::sleep(wait).await;
        }
    }
}

/// Single pass over a spec; `(passed, diagnostic)`
pub async fn evaluate_spec(
    driver: &dyn PageDriver,
    spec: &StateSpec,
) -> Result<(bool, String), VerifyError> {
    let view = PageView::capture(driver).await?;
    let mut failures = Vec::new();

    for condition in &spec.all {
        if !condition.evaluate(driver, &view).await? {
            failures.push(format!("expected {condition}"));
        }
    }

    let mut matched_any = None;
    if !spec.any.is_empty() {
        for condition in &spec.any {
            if condition.evaluate(driver, &view).await? {
                matched_any = Some(condition.to_string());
                break;
            }
        }
        if matched_any.is_none() {
            let options: Vec<String> = spec.any.iter().map(|c| c.to_string()).collect();
            failures.push(format!("none of [{}]", options.join(", ")));
        }
    }

    for condition in &spec.deny {
        if condition.evaluate(driver, &view).await? {
            failures.push(format!("unexpected {condition}"));
        }
    }

    if failures.is_empty() {
        let diagnostic = match matched_any {
            Some(hit) => format!("{hit} at {}", view.url),
            None => format!("all conditions met at {}", view.url),
        };
        Ok((true, diagnostic))
    } else {
        Ok((false, format!("{} (url {})", failures.join("; "), view.url)))
    }
}

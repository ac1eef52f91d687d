//! Step executor
//!
//! Runs one plan step at a time: locate → interact → settle → verify, with
//! the recovery manager consulted whenever an attempt fails or the expected
//! state does not show up.

use std::sync::Arc;

use action_locator::{Candidate, ElementLocator, LocateRequest, LocatorStrategy};
use agent_core::{Step, StepAction};
use page_driver::{DriverError, ElementRef, PageDriver};
use state_verifier::StateVerifier;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::memory::MemoryRetriever;
use crate::recovery::{RecoveryAction, RecoveryManager, RecoveryState, Targeting};
use crate::types::{ExecutorConfig, StepPhase, StepResult};

/// State carried from one step to the next within a run
#[derive(Debug, Clone, Default)]
pub struct ExecutionCursor {
    /// DOM index of the last element interacted with on the current document
    pub previous_dom_index: Option<usize>,
}

struct Attempted {
    located: Option<Candidate>,
}

struct AttemptFailure {
    error: FlowError,
    located: Option<Candidate>,
}

impl AttemptFailure {
    fn bare(error: impl Into<FlowError>) -> Self {
        Self {
            error: error.into(),
            located: None,
        }
    }
}

enum Verdict {
    Verified,
    Unverified(String),
}

struct StepTrace {
    phase: StepPhase,
    attempts: u32,
    notes: Vec<String>,
}

impl StepTrace {
    fn new() -> Self {
        Self {
            phase: StepPhase::Pending,
            attempts: 0,
            notes: Vec::new(),
        }
    }

    fn enter(&mut self, next: StepPhase) -> Result<(), FlowError> {
        self.phase = self.phase.advance(next)?;
        Ok(())
    }

    fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    fn joined_notes(&self) -> Option<String> {
        (!self.notes.is_empty()).then(|| self.notes.join("; "))
    }
}

/// Executes plan steps against a page driver
pub struct ActionExecutor {
    locator: ElementLocator,
    verifier: Arc<StateVerifier>,
    recovery: RecoveryManager,
    memory: Option<Arc<dyn MemoryRetriever>>,
    config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        verifier: Arc<StateVerifier>,
        recovery: RecoveryManager,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            locator: ElementLocator::new(),
            verifier,
            recovery,
            memory: None,
            config,
        }
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryRetriever>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute one step, recovery included, within the step timeout
    ///
    /// Never returns an error: failures are recorded in the result.
    pub async fn execute_step(
        &self,
        driver: &dyn PageDriver,
        index: usize,
        step: &Step,
        cursor: &mut ExecutionCursor,
    ) -> StepResult {
        let started = Instant::now();
        let mut trace = StepTrace::new();
        debug!(step = index, action = %step.action, "Executing step: {}", step.describe());

        let outcome = match timeout(
            self.config.step_timeout(),
            self.drive_step(driver, step, cursor, &mut trace),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(FlowError::Timeout(self.config.step_timeout_ms)),
        };

        let result = match outcome {
            Ok(verified) => {
                info!(
                    step = index,
                    sub_goal = %step.sub_goal,
                    verified,
                    attempts = trace.attempts,
                    "Step succeeded"
                );
                StepResult::success(index, step, verified)
            }
            Err(err) => {
                warn!(
                    step = index,
                    sub_goal = %step.sub_goal,
                    attempts = trace.attempts,
                    error = %err,
                    "Step failed"
                );
                StepResult::failure(index, step, err.to_task_error())
            }
        };
        result
            .with_attempts(trace.attempts)
            .with_note(trace.joined_notes())
            .with_duration(started.elapsed())
    }

    /// `Ok(verified)` on success
    async fn drive_step(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        cursor: &mut ExecutionCursor,
        trace: &mut StepTrace,
    ) -> Result<bool, FlowError> {
        let value = self.resolve_value(step).await?;
        let mut recovery = RecoveryState::new();
        let mut action = RecoveryAction::initial();
        trace.enter(StepPhase::InFlight)?;

        loop {
            if action.settle_ms > 0 {
                driver.wait_for_settle(action.settle_ms).await?;
            }
            trace.attempts += 1;

            match self
                .attempt(driver, step, value.as_deref(), &action.targeting, &recovery, cursor)
                .await
            {
                Ok(attempted) => {
                    if !action.note.is_empty() {
                        trace.note(action.note.clone());
                    }
                    if let Some(candidate) = &attempted.located {
                        if matches!(action.targeting, Targeting::Planned)
                            && candidate.strategy != LocatorStrategy::Selector
                        {
                            trace.note(format!("located via {}", candidate.strategy));
                        }
                    }
                    return match self.check_expected(driver, step).await {
                        Verdict::Verified => {
                            trace.enter(StepPhase::VerifiedSuccess)?;
                            Ok(true)
                        }
                        Verdict::Unverified(diagnostic) => {
                            trace.enter(StepPhase::UnverifiedSuccess)?;
                            self.settle_unverified(driver, step, diagnostic, trace).await
                        }
                    };
                }
                Err(failure) => {
                    trace.enter(StepPhase::Failed)?;
                    debug!(error = %failure.error, attempt = trace.attempts, "Attempt failed");
                    recovery.observe_failure(step, failure.located.as_ref());
                    match self
                        .recovery
                        .next_action(driver, step, &mut recovery, &failure.error)
                        .await
                    {
                        Some(next) => {
                            info!(sub_goal = %step.sub_goal, note = %next.note, "Recovering step");
                            trace.enter(StepPhase::InFlight)?;
                            action = next;
                        }
                        None => return Err(failure.error),
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        value: Option<&str>,
        targeting: &Targeting,
        recovery: &RecoveryState,
        cursor: &mut ExecutionCursor,
    ) -> Result<Attempted, AttemptFailure> {
        match step.action {
            StepAction::Navigate => {
                let url = value.ok_or_else(|| {
                    AttemptFailure::bare(FlowError::InvalidStep("navigate without a URL".into()))
                })?;
                self.navigate_with_retry(driver, url)
                    .await
                    .map_err(AttemptFailure::bare)?;
                cursor.previous_dom_index = None;
                self.settle(driver).await.map_err(AttemptFailure::bare)?;
                Ok(Attempted { located: None })
            }
            StepAction::Wait => {
                let ms = value
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        AttemptFailure::bare(FlowError::InvalidStep(
                            "wait needs a millisecond value".into(),
                        ))
                    })?;
                driver
                    .wait_for_settle(ms)
                    .await
                    .map_err(AttemptFailure::bare)?;
                Ok(Attempted { located: None })
            }
            StepAction::ObserveState => Ok(Attempted { located: None }),
            StepAction::Click
            | StepAction::Type
            | StepAction::TypeAndSubmit
            | StepAction::Select => {
                let candidate = self
                    .resolve_target(driver, step, targeting, recovery.excluded(), cursor)
                    .await
                    .map_err(AttemptFailure::bare)?;
                let interaction = step.action.interaction().ok_or_else(|| {
                    AttemptFailure::bare(FlowError::InvalidStep(format!(
                        "{} has no interaction",
                        step.action
                    )))
                })?;
                let outcome = match driver
                    .interact(candidate.element_ref(), interaction, value)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        return Err(AttemptFailure {
                            error: err.into(),
                            located: Some(candidate),
                        })
                    }
                };
                cursor.previous_dom_index =
                    (!outcome.navigated).then_some(candidate.element.dom_index);
                self.settle(driver).await.map_err(|err| AttemptFailure {
                    error: err,
                    located: Some(candidate.clone()),
                })?;
                Ok(Attempted {
                    located: Some(candidate),
                })
            }
        }
    }

    async fn resolve_target(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        targeting: &Targeting,
        excluded: &[ElementRef],
        cursor: &ExecutionCursor,
    ) -> Result<Candidate, FlowError> {
        let request = match targeting {
            Targeting::Element(candidate) => return Ok(candidate.clone()),
            Targeting::Planned => {
                let mut request = LocateRequest::new(step.target.description.clone())
                    .with_fallbacks(step.fallback_hints.clone());
                if let Some(selector) = &step.target.selector {
                    request = request.with_selector(selector.clone());
                }
                request
            }
            Targeting::Hint(idx) => {
                let hint = step.fallback_hints.get(*idx).ok_or_else(|| {
                    FlowError::ElementNotFound(format!("no fallback hint #{}", idx + 1))
                })?;
                LocateRequest::new("").with_selector(hint.clone())
            }
            Targeting::Selector(selector) => LocateRequest::new("").with_selector(selector.clone()),
            Targeting::Description(description) => LocateRequest::new(description.clone()),
        };
        let mut request = request.near(cursor.previous_dom_index);
        if let Some(affordance) = step.action.affordance() {
            request = request.with_affordance(affordance);
        }
        for element in excluded {
            request = request.excluding(element.clone());
        }

        self.locator
            .locate_best(driver, &request)
            .await?
            .ok_or_else(|| FlowError::ElementNotFound(format!("no element for {}", describe_target(step))))
    }

    async fn navigate_with_retry(&self, driver: &dyn PageDriver, url: &str) -> Result<(), FlowError> {
        let max_attempts = self.config.nav_retries.max(1);
        let mut attempt = 1;
        loop {
            match driver.navigate(url).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!(url, attempt, "Navigation succeeded after retry");
                    }
                    return Ok(());
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let backoff = self.config.nav_backoff(attempt);
                    warn!(
                        url,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Navigation failed, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    let reason = match err {
                        DriverError::Navigation(reason) => reason,
                        other => other.to_string(),
                    };
                    return Err(FlowError::NavigationFailed(format!(
                        "{reason} (after {attempt} attempt{})",
                        if attempt == 1 { "" } else { "s" }
                    )));
                }
            }
        }
    }

    async fn settle(&self, driver: &dyn PageDriver) -> Result<(), FlowError> {
        if self.config.settle_ms > 0 {
            driver.wait_for_settle(self.config.settle_ms).await?;
        }
        Ok(())
    }

    /// Planned value, or the best remembered snippet for value-less type steps
    async fn resolve_value(&self, step: &Step) -> Result<Option<String>, FlowError> {
        if let Some(value) = &step.value {
            return Ok(Some(value.clone()));
        }
        match step.action {
            StepAction::Type | StepAction::TypeAndSubmit => {
                let memory = self.memory.as_ref().ok_or_else(|| {
                    FlowError::InvalidStep(format!(
                        "no value to type into {}",
                        describe_target(step)
                    ))
                })?;
                let query = memory_query(step);
                let snippet = memory
                    .retrieve(query)
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| {
                        FlowError::InvalidStep(format!("nothing remembered for '{query}'"))
                    })?;
                debug!(query = %query, score = snippet.score, "Filled value from memory");
                Ok(Some(snippet.text))
            }
            StepAction::Select => Err(FlowError::InvalidStep("select without a value".into())),
            StepAction::Navigate => Err(FlowError::InvalidStep("navigate without a URL".into())),
            _ => Ok(None),
        }
    }

    fn expected_state<'a>(&self, step: &'a Step) -> Option<&'a str> {
        match (&step.expected_state, step.action) {
            (Some(state), _) => Some(state.as_str()),
            (None, StepAction::ObserveState) => Some(state_verifier::PAGE_LOADED),
            (None, _) => None,
        }
    }

    async fn check_expected(&self, driver: &dyn PageDriver, step: &Step) -> Verdict {
        let Some(state) = self.expected_state(step) else {
            return Verdict::Verified;
        };
        match self
            .verifier
            .verify_within(driver, state, self.verify_timeout())
            .await
        {
            Ok(verification) if verification.passed => Verdict::Verified,
            Ok(verification) => Verdict::Unverified(verification.diagnostic),
            Err(err) => Verdict::Unverified(err.to_string()),
        }
    }

    /// Only re-verification after an extended settle is attempted
    async fn settle_unverified(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        diagnostic: String,
        trace: &mut StepTrace,
    ) -> Result<bool, FlowError> {
        let state = self.expected_state(step).unwrap_or(state_verifier::PAGE_LOADED);
        debug!(state, %diagnostic, "Expected state missing, re-verifying");
        trace.enter(StepPhase::InFlight)?;
        driver
            .wait_for_settle(self.recovery.extended_settle_ms())
            .await?;

        let diagnostic = match self.check_expected(driver, step).await {
            Verdict::Verified => {
                trace.note(format!("{state} confirmed after extended settle"));
                trace.enter(StepPhase::VerifiedSuccess)?;
                return Ok(true);
            }
            Verdict::Unverified(latest) => latest,
        };

        if self.recovery.config().strict_verification {
            trace.enter(StepPhase::Failed)?;
            return Err(FlowError::VerificationFailed(format!("{state}: {diagnostic}")));
        }
        trace.note(format!("{state} not confirmed: {diagnostic}"));
        trace.enter(StepPhase::UnverifiedSuccess)?;
        Ok(false)
    }

    fn verify_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.config.verify_timeout_ms)
    }
}

/// Plain words to look a missing value up by
fn memory_query(step: &Step) -> &str {
    let description = step.target.description.trim();
    if description.is_empty() {
        step.sub_goal.as_str()
    } else {
        description
    }
}

fn describe_target(step: &Step) -> String {
    let description = step.target.description.trim();
    if !description.is_empty() {
        format!("'{description}'")
    } else if let Some(selector) = &step.target.selector {
        format!("'{selector}'")
    } else {
        format!("{} step", step.sub_goal)
    }
}

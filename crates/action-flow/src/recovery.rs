//! Error recovery for failed steps
//!
//! Stages run in order and stop at the first attempt that succeeds:
//! next fallback hint, extended settle then full retry, a suggestion
//! re-derived from the current page, then give up.

use std::sync::Arc;

use action_locator::{Candidate, ElementLocator, LocateRequest, LocatorStrategy};
use agent_core::{parse_suggestion, AnalysisProvider, Step};
use page_driver::{ElementRef, PageDriver};
use tracing::{debug, info, warn};

use crate::errors::FlowError;
use crate::types::RecoveryConfig;

/// How an attempt finds its element
#[derive(Debug, Clone)]
pub enum Targeting {
    /// Selector, hints and description as planned
    Planned,
    /// Only the n-th fallback hint
    Hint(usize),
    /// A selector proposed by the analysis provider
    Selector(String),
    /// Text search for a description, no selectors
    Description(String),
    /// A concrete element picked from the current page
    Element(Candidate),
}

/// Next attempt proposed by the recovery manager
#[derive(Debug, Clone)]
pub struct RecoveryAction {
    pub targeting: Targeting,
    /// Extra settle before the attempt
    pub settle_ms: u64,
    pub note: String,
}

impl RecoveryAction {
    pub fn initial() -> Self {
        Self {
            targeting: Targeting::Planned,
            settle_ms: 0,
            note: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FallbackHints,
    ExtendedSettle,
    PageSuggestion,
    ProviderSuggestion,
    Exhausted,
}

/// Per-step recovery progress
#[derive(Debug, Clone)]
pub struct RecoveryState {
    stage: Stage,
    next_hint: Option<usize>,
    excluded: Vec<ElementRef>,
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self {
            stage: Stage::FallbackHints,
            next_hint: None,
            excluded: Vec::new(),
        }
    }
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Elements that already failed for this step
    pub fn excluded(&self) -> &[ElementRef] {
        &self.excluded
    }

    /// Record a failed attempt and the candidate it used, if any
    pub fn observe_failure(&mut self, step: &Step, located: Option<&Candidate>) {
        if let Some(candidate) = located {
            if !self.excluded.contains(candidate.element_ref()) {
                self.excluded.push(candidate.element_ref().clone());
            }
        }
        if self.next_hint.is_none() {
            // the locator already walked every hint up to the one that matched
            self.next_hint = Some(match located.map(|c| c.strategy) {
                Some(LocatorStrategy::Selector) => 0,
                Some(LocatorStrategy::Fallback(idx)) => idx + 1,
                _ => step.fallback_hints.len(),
            });
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.stage == Stage::Exhausted
    }
}

/// Chooses the next attempt for a failing step
pub struct RecoveryManager {
    config: RecoveryConfig,
    extended_settle_ms: u64,
    locator: ElementLocator,
    provider: Option<Arc<dyn AnalysisProvider>>,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig, extended_settle_ms: u64) -> Self {
        Self {
            config,
            extended_settle_ms,
            locator: ElementLocator::new(),
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn AnalysisProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    pub fn extended_settle_ms(&self) -> u64 {
        self.extended_settle_ms
    }

    /// Next attempt, or `None` once every stage is spent
    pub async fn next_action(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        state: &mut RecoveryState,
        failure: &FlowError,
    ) -> Option<RecoveryAction> {
        if !failure.is_recoverable() {
            state.stage = Stage::Exhausted;
            return None;
        }

        loop {
            match state.stage {
                Stage::FallbackHints => {
                    let next = state.next_hint.unwrap_or(step.fallback_hints.len());
                    if step.action.needs_element() && next < step.fallback_hints.len() {
                        state.next_hint = Some(next + 1);
                        return Some(RecoveryAction {
                            targeting: Targeting::Hint(next),
                            settle_ms: 0,
                            note: format!("fallback hint #{} after: {failure}", next + 1),
                        });
                    }
                    state.stage = Stage::ExtendedSettle;
                }
                Stage::ExtendedSettle => {
                    state.stage = Stage::PageSuggestion;
                    return Some(RecoveryAction {
                        targeting: Targeting::Planned,
                        settle_ms: self.extended_settle_ms,
                        note: format!(
                            "retried after {}ms settle following: {failure}",
                            self.extended_settle_ms
                        ),
                    });
                }
                Stage::PageSuggestion => {
                    state.stage = Stage::ProviderSuggestion;
                    if !step.action.needs_element() {
                        continue;
                    }
                    if let Some(action) = self.suggest_from_page(driver, step, state).await {
                        return Some(action);
                    }
                }
                Stage::ProviderSuggestion => {
                    state.stage = Stage::Exhausted;
                    if !step.action.needs_element() || !self.config.use_suggestions {
                        continue;
                    }
                    if let Some(action) = self.suggest_from_provider(driver, step, failure).await {
                        return Some(action);
                    }
                }
                Stage::Exhausted => {
                    info!(sub_goal = %step.sub_goal, "Recovery exhausted");
                    return None;
                }
            }
        }
    }

    /// Local heuristic over fresh candidates: the description (or the
    /// sub-goal words) with the affordance filter relaxed
    async fn suggest_from_page(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        state: &RecoveryState,
    ) -> Option<RecoveryAction> {
        let query = heuristic_query(step);
        if query.is_empty() {
            return None;
        }
        let mut request = LocateRequest::new(query.clone());
        for element in &state.excluded {
            request = request.excluding(element.clone());
        }
        match self.locator.locate_best(driver, &request).await {
            Ok(Some(candidate)) => {
                let note = format!(
                    "used '{}' found on the current page for '{query}'",
                    candidate.element.label()
                );
                debug!(%note, "Page suggestion");
                Some(RecoveryAction {
                    targeting: Targeting::Element(candidate),
                    settle_ms: 0,
                    note,
                })
            }
            Ok(None) => None,
            Err(err) => {
                debug!(error = %err, "Page suggestion failed");
                None
            }
        }
    }

    async fn suggest_from_provider(
        &self,
        driver: &dyn PageDriver,
        step: &Step,
        failure: &FlowError,
    ) -> Option<RecoveryAction> {
        let provider = self.provider.as_ref()?;
        let snapshot = match driver.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "Could not capture page for suggestion");
                return None;
            }
        };
        let value = match provider
            .suggest_step(&snapshot, step, &failure.to_string())
            .await
        {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "Suggestion provider failed");
                return None;
            }
        };
        match parse_suggestion(&value) {
            Ok(Some(suggestion)) => {
                let (targeting, what) = match (suggestion.selector, suggestion.description) {
                    (Some(selector), _) => {
                        let what = format!("selector '{selector}'");
                        (Targeting::Selector(selector), what)
                    }
                    (None, Some(description)) => {
                        let what = format!("target '{description}'");
                        (Targeting::Description(description), what)
                    }
                    (None, None) => return None,
                };
                Some(RecoveryAction {
                    targeting,
                    settle_ms: 0,
                    note: format!("used suggested {what}"),
                })
            }
            Ok(None) => None,
            Err(err) => {
                warn!(error = %err, "Discarding malformed suggestion");
                None
            }
        }
    }
}

fn heuristic_query(step: &Step) -> String {
    let description = step.target.description.trim();
    if !description.is_empty() {
        return description.to_string();
    }
    step.sub_goal.replace(['_', '-'], " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_core::{StepAction, StepTarget};
    use page_driver::memory::{demo_site, InMemoryPage};

    fn page() -> InMemoryPage {
        InMemoryPage::new(Arc::new(demo_site().unwrap()))
    }

    fn search_step() -> Step {
        Step::new(StepAction::Type, "search")
            .with_target(StepTarget::new("search box").with_selector("input[type=search]"))
            .with_fallbacks(["input[name=q]", "#twotabsearchtextbox", "[role=searchbox]"])
    }

    #[tokio::test]
    async fn hints_continue_after_the_one_that_matched() {
        let page = page();
        let manager = RecoveryManager::new(RecoveryConfig::default(), 2_000);
        let step = search_step();
        let mut state = RecoveryState::new();

        page.navigate("https://www.amazon.com").await.unwrap();
        let located = ElementLocator::new()
            .locate_best(&page, &LocateRequest::new("").with_fallbacks(step.fallback_hints.clone()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(located.strategy, LocatorStrategy::Fallback(1));
        state.observe_failure(&step, Some(&located));
        let failure = FlowError::InteractionFailed("rejected".into());

        let first = manager
            .next_action(&page, &step, &mut state, &failure)
            .await
            .unwrap();
        assert!(matches!(first.targeting, Targeting::Hint(2)));
        assert!(first.note.starts_with("fallback hint #3"));

        let second = manager
            .next_action(&page, &step, &mut state, &failure)
            .await
            .unwrap();
        assert!(matches!(second.targeting, Targeting::Planned));
        assert_eq!(second.settle_ms, 2_000);
    }

    #[tokio::test]
    async fn navigation_gets_one_settle_retry() {
        let page = page();
        let manager = RecoveryManager::new(RecoveryConfig::default(), 500);
        let step = Step::navigate("https://unknown.invalid");
        let mut state = RecoveryState::new();
        state.observe_failure(&step, None);
        let failure = FlowError::NavigationFailed("host unreachable".into());

        let retry = manager.next_action(&page, &step, &mut state, &failure).await;
        assert!(matches!(retry.map(|a| a.targeting), Some(Targeting::Planned)));
        assert!(manager
            .next_action(&page, &step, &mut state, &failure)
            .await
            .is_none());
        assert!(state.is_exhausted());
    }

    #[tokio::test]
    async fn unrecoverable_errors_stop_immediately() {
        let page = page();
        let manager = RecoveryManager::new(RecoveryConfig::default(), 500);
        let step = search_step();
        let mut state = RecoveryState::new();
        let failure = FlowError::InvalidStep("no value".into());
        assert!(manager
            .next_action(&page, &step, &mut state, &failure)
            .await
            .is_none());
    }

    #[test]
    fn heuristic_query_falls_back_to_sub_goal() {
        let step = Step::new(StepAction::Click, "cart_operation");
        assert_eq!(heuristic_query(&step), "cart operation");
    }
}

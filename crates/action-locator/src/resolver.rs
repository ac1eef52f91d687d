//! Element locator with fallback chain orchestration

use crate::{errors::LocatorError, strategies::*, types::*};
use page_driver::PageDriver;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Element locator
///
/// Stateless; every call asks the driver for a fresh view of the page.
pub struct ElementLocator {
    chain: Vec<Arc<dyn Strategy>>,
}

impl Default for ElementLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementLocator {
    /// Create a locator with all strategies in fallback order
    pub fn new() -> Self {
        Self {
            chain: vec![
                Arc::new(SelectorStrategy),
                Arc::new(FallbackStrategy),
                Arc::new(TextStrategy),
            ],
        }
    }

    /// Ranked candidates from the first strategy that finds anything
    ///
    /// Empty when nothing qualifies. Driver failures surface as errors.
    pub async fn locate(
        &self,
        driver: &dyn PageDriver,
        request: &LocateRequest,
    ) -> Result<Vec<Candidate>, LocatorError> {
        if request.is_empty() {
            return Err(LocatorError::InvalidRequest(
                "no selector, hints or description".to_string(),
            ));
        }

        for strategy in &self.chain {
            let mut candidates = strategy.resolve(driver, request).await?;
            if candidates.is_empty() {
                debug!("Strategy {} returned no candidates", strategy.name());
                continue;
            }
            rank_candidates(&mut candidates, request.previous_dom_index);
            if let Some(best) = candidates.first() {
                info!(
                    target = %request.description,
                    strategy = %best.strategy,
                    element = %best.element.label(),
                    score = best.score(),
                    "Located element"
                );
            }
            return Ok(candidates);
        }

        debug!(target = %request.description, "No strategy produced candidates");
        Ok(Vec::new())
    }

    /// Best candidate, if any
    pub async fn locate_best(
        &self,
        driver: &dyn PageDriver,
        request: &LocateRequest,
    ) -> Result<Option<Candidate>, LocatorError> {
        Ok(self.locate(driver, request).await?.into_iter().next())
    }
}

/// Order by score, then DOM proximity to the previous element, then DOM order
pub fn rank_candidates(candidates: &mut [Candidate], previous: Option<usize>) {
    candidates.sort_by(|a, b| {
        b.score()
            .partial_cmp(&a.score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                let distance = |c: &Candidate| {
                    previous
                        .map(|prev| c.element.dom_index.abs_diff(prev))
                        .unwrap_or(0)
                };
                distance(a).cmp(&distance(b))
            })
            .then_with(|| a.element.dom_index.cmp(&b.element.dom_index))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_driver::{ElementAttributes, ElementDescriptor, ElementRef};

    fn candidate(idx: usize, score: f64) -> Candidate {
        Candidate::new(
            ElementDescriptor {
                element_ref: ElementRef(format!("p0:e{idx}")),
                tag: "a".to_string(),
                role: None,
                text: String::new(),
                attributes: ElementAttributes::default(),
                visible: true,
                width: 10.0,
                height: 10.0,
                dom_index: idx,
                clickable: true,
                editable: false,
                score: 0.0,
            },
            LocatorStrategy::Text,
            score,
        )
    }

    #[test]
    fn test_rank_by_score_first() {
        let mut list = vec![candidate(1, 1.0), candidate(2, 2.5)];
        rank_candidates(&mut list, None);
        assert_eq!(list[0].element.dom_index, 2);
    }

    #[test]
    fn test_ties_broken_by_proximity() {
        let mut list = vec![candidate(1, 2.0), candidate(9, 2.0), candidate(6, 2.0)];
        rank_candidates(&mut list, Some(7));
        let order: Vec<_> = list.iter().map(|c| c.element.dom_index).collect();
        assert_eq!(order, vec![6, 9, 1]);

        let mut list = vec![candidate(5, 2.0), candidate(3, 2.0)];
        rank_candidates(&mut list, None);
        assert_eq!(list[0].element.dom_index, 3);
    }
}

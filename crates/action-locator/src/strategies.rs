//! Element resolution strategies
//!
//! Three strategies in fallback order:
//! 1. Selector - the step's primary selector
//! 2. Fallback - each fallback hint in order, first hint with hits wins
//! 3. Text - description containment over afforded elements

use crate::{errors::LocatorError, types::*};
use async_trait::async_trait;
use page_driver::{ElementDescriptor, LocateCriteria, PageDriver};
use tracing::debug;

/// Base score for selector hits so they always outrank text matches
const SELECTOR_SCORE: f64 = 10.0;
const FALLBACK_SCORE: f64 = 8.0;

/// Role or attribute named exactly
const ROLE_ATTRIBUTE_WEIGHT: f64 = 3.0;
/// Full description contained in a text source
const SUBSTRING_WEIGHT: f64 = 1.5;
/// Per description keyword found anywhere
const TOKEN_WEIGHT: f64 = 0.5;

/// Strategy trait for element resolution
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Attempt to resolve element using this strategy
    async fn resolve(
        &self,
        driver: &dyn PageDriver,
        request: &LocateRequest,
    ) -> Result<Vec<Candidate>, LocatorError>;

    /// Get strategy name
    fn name(&self) -> &'static str;
}

/// Primary selector strategy
pub struct SelectorStrategy;

#[async_trait]
impl Strategy for SelectorStrategy {
    async fn resolve(
        &self,
        driver: &dyn PageDriver,
        request: &LocateRequest,
    ) -> Result<Vec<Candidate>, LocatorError> {
        let Some(selector) = request.selector.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(Vec::new());
        };
        debug!("Resolving primary selector: {}", selector);
        let found = query_selector(driver, selector, request).await?;
        Ok(found
            .into_iter()
            .map(|el| Candidate::new(el, LocatorStrategy::Selector, SELECTOR_SCORE))
            .collect())
    }

    fn name(&self) -> &'static str {
        "selector"
    }
}

/// Fallback hint strategy
pub struct FallbackStrategy;

#[async_trait]
impl Strategy for FallbackStrategy {
    async fn resolve(
        &self,
        driver: &dyn PageDriver,
        request: &LocateRequest,
    ) -> Result<Vec<Candidate>, LocatorError> {
        for (idx, hint) in request.fallback_hints.iter().enumerate() {
            if hint.trim().is_empty() {
                continue;
            }
            let found = query_selector(driver, hint, request).await?;
            if found.is_empty() {
                debug!("Fallback hint #{} '{}' matched nothing", idx + 1, hint);
                continue;
            }
            debug!("Fallback hint #{} '{}' matched {}", idx + 1, hint, found.len());
            return Ok(found
                .into_iter()
                .map(|el| Candidate::new(el, LocatorStrategy::Fallback(idx), FALLBACK_SCORE))
                .collect());
        }
        Ok(Vec::new())
    }

    fn name(&self) -> &'static str {
        "fallback"
    }
}

/// Text and attribute containment strategy
pub struct TextStrategy;

#[async_trait]
impl Strategy for TextStrategy {
    async fn resolve(
        &self,
        driver: &dyn PageDriver,
        request: &LocateRequest,
    ) -> Result<Vec<Candidate>, LocatorError> {
        if request.description.trim().is_empty() {
            return Ok(Vec::new());
        }
        debug!("Text resolution for description: {}", request.description);

        let criteria = LocateCriteria {
            selector: None,
            affordance: request.affordance,
        };
        let elements = driver.locate_candidates(&criteria).await?;
        Ok(elements
            .into_iter()
            .filter(|el| usable(el, request))
            .filter(|el| {
                request
                    .affordance
                    .map(|affordance| el.affords(affordance))
                    .unwrap_or(el.clickable || el.editable)
            })
            .filter_map(|el| {
                let score = score_element(&el, &request.description)?;
                Some(Candidate::new(el, LocatorStrategy::Text, score))
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "text"
    }
}

async fn query_selector(
    driver: &dyn PageDriver,
    selector: &str,
    request: &LocateRequest,
) -> Result<Vec<ElementDescriptor>, LocatorError> {
    let found = driver
        .locate_candidates(&LocateCriteria::selector(selector))
        .await?;
    Ok(found.into_iter().filter(|el| usable(el, request)).collect())
}

fn usable(el: &ElementDescriptor, request: &LocateRequest) -> bool {
    el.is_interactable() && !request.exclude.contains(&el.element_ref)
}

/// Score an element against a description
///
/// Returns `None` when nothing in the element's text or attributes matches.
/// A role match alone never qualifies an element.
pub fn score_element(el: &ElementDescriptor, description: &str) -> Option<f64> {
    if !el.is_interactable() {
        return None;
    }
    let needle = description.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }

    let sources: Vec<String> = [
        Some(el.text.as_str()),
        el.attributes.placeholder.as_deref(),
        el.attributes.aria_label.as_deref(),
        el.attributes.name.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(|s| s.trim().to_lowercase())
    .filter(|s| !s.is_empty())
    .collect();

    let mut score = 0.0;
    let mut qualified = false;

    let exact_attribute = sources.iter().any(|s| *s == needle)
        || el
            .attributes
            .id
            .as_deref()
            .map(|id| id.eq_ignore_ascii_case(&needle))
            .unwrap_or(false);
    let keywords = extract_keywords(&needle);
    let role_named = element_roles(el)
        .iter()
        .any(|role| needle.split_whitespace().any(|word| word == *role));
    if exact_attribute || role_named {
        score += ROLE_ATTRIBUTE_WEIGHT;
        qualified |= exact_attribute;
    }

    for source in &sources {
        if source.contains(&needle) {
            score += SUBSTRING_WEIGHT;
            qualified = true;
        }
    }

    let haystack = sources.join(" ");
    for keyword in &keywords {
        if haystack.contains(keyword.as_str()) {
            score += TOKEN_WEIGHT;
            qualified = true;
        }
    }

    qualified.then_some(score)
}

/// Role words an element answers to, explicit role first
fn element_roles(el: &ElementDescriptor) -> Vec<&str> {
    let mut roles = Vec::new();
    if let Some(role) = el.role.as_deref() {
        roles.push(role);
    }
    let implicit = match el.tag.as_str() {
        "a" => Some("link"),
        "button" => Some("button"),
        "select" => Some("dropdown"),
        "input" | "textarea" => match el.attributes.input_type.as_deref() {
            Some("submit") | Some("button") => Some("button"),
            Some("search") => Some("searchbox"),
            _ => Some("box"),
        },
        _ => None,
    };
    roles.extend(implicit);
    roles
}

/// Extract matching keywords from a description
///
/// Short words, stop words and role words are dropped.
pub fn extract_keywords(description: &str) -> Vec<String> {
    let cleaned = description
        .to_lowercase()
        .replace(['#', '.', '>', '+', '~', '[', ']', '"', '\'', '(', ')', ','], " ")
        .replace(['-', '_'], " ");

    let mut keywords: Vec<String> = Vec::new();
    for word in cleaned.split_whitespace() {
        let significant = word.chars().any(|c| c.is_ascii_digit()) || word.len() > 2;
        if significant && !is_noise_word(word) && !keywords.iter().any(|k| k == word) {
            keywords.push(word.to_string());
        }
    }
    keywords
}

fn is_noise_word(word: &str) -> bool {
    matches!(
        word,
        "the"
            | "and"
            | "for"
            | "with"
            | "into"
            | "from"
            | "this"
            | "that"
            | "box"
            | "field"
            | "input"
            | "button"
            | "link"
            | "div"
            | "span"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use page_driver::{ElementAttributes, ElementRef};

    fn element(tag: &str, text: &str) -> ElementDescriptor {
        ElementDescriptor {
            element_ref: ElementRef::new("p0:e0"),
            tag: tag.to_string(),
            role: None,
            text: text.to_string(),
            attributes: ElementAttributes::default(),
            visible: true,
            width: 100.0,
            height: 20.0,
            dom_index: 0,
            clickable: true,
            editable: false,
            score: 0.0,
        }
    }

    #[test]
    fn test_extract_keywords() {
        let keywords = extract_keywords("Search box");
        assert_eq!(keywords, vec!["search".to_string()]);

        let keywords = extract_keywords("iPhone 15 (128 GB)");
        assert!(keywords.contains(&"iphone".to_string()));
        assert!(keywords.contains(&"15".to_string()));
        assert!(keywords.contains(&"128".to_string()));
    }

    #[test]
    fn test_substring_beats_tokens() {
        let exact = element("a", "Apple iPhone 15 (128 GB) - Black");
        let partial = element("a", "iPhone case for 15 series");
        let full = score_element(&exact, "iphone 15").unwrap();
        let loose = score_element(&partial, "iphone 15").unwrap();
        assert!(full > loose);
    }

    #[test]
    fn test_attribute_sources_count() {
        let mut input = element("input", "");
        input.attributes.placeholder = Some("Search Amazon".into());
        input.attributes.aria_label = Some("Search Amazon".into());
        // role word "box" adds weight, two substring hits, one token
        let score = score_element(&input, "search").unwrap();
        assert_eq!(score, SUBSTRING_WEIGHT * 2.0 + TOKEN_WEIGHT);
        let with_role = score_element(&input, "search box").unwrap();
        assert_eq!(with_role, ROLE_ATTRIBUTE_WEIGHT + TOKEN_WEIGHT);
    }

    #[test]
    fn test_role_alone_does_not_qualify() {
        let button = element("button", "Checkout");
        assert!(score_element(&button, "search button").is_none());
    }

    #[test]
    fn test_invisible_disqualified() {
        let mut hidden = element("button", "Add to Cart");
        hidden.visible = false;
        assert!(score_element(&hidden, "add to cart").is_none());
        let mut flat = element("button", "Add to Cart");
        flat.height = 0.0;
        assert!(score_element(&flat, "add to cart").is_none());
    }

    #[test]
    fn test_exact_attribute_match() {
        let mut button = element("input", "");
        button.attributes.aria_label = Some("Go".into());
        let score = score_element(&button, "go").unwrap();
        assert!(score >= ROLE_ATTRIBUTE_WEIGHT + SUBSTRING_WEIGHT);
    }
}

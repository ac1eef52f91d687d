//! Core types for locator system

use page_driver::{Affordance, ElementDescriptor, ElementRef};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Locator strategy enumeration
///
/// Defines the three strategies for element location:
/// - Selector: the step's primary selector
/// - Fallback: the n-th fallback hint (zero based)
/// - Text: description containment over afforded elements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Primary selector strategy
    Selector,

    /// Fallback hint strategy
    Fallback(usize),

    /// Text content strategy
    Text,
}

impl LocatorStrategy {
    /// Get strategy name as string
    pub fn name(&self) -> &'static str {
        match self {
            LocatorStrategy::Selector => "selector",
            LocatorStrategy::Fallback(_) => "fallback",
            LocatorStrategy::Text => "text",
        }
    }

    /// True for anything other than the primary selector
    pub fn is_fallback(&self) -> bool {
        !matches!(self, LocatorStrategy::Selector)
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorStrategy::Fallback(idx) => write!(f, "fallback hint #{}", idx + 1),
            other => f.write_str(other.name()),
        }
    }
}

/// What to look for
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocateRequest {
    /// Human readable target, e.g. "search box" or a product name
    pub description: String,

    /// Primary selector
    pub selector: Option<String>,

    /// Alternate selectors tried in order
    pub fallback_hints: Vec<String>,

    /// What the element must afford for the text strategy
    pub affordance: Option<Affordance>,

    /// DOM index of the previously interacted element, used to break ties
    pub previous_dom_index: Option<usize>,

    /// Elements that already failed for this step
    pub exclude: Vec<ElementRef>,
}

impl LocateRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_fallbacks(mut self, hints: Vec<String>) -> Self {
        self.fallback_hints = hints;
        self
    }

    pub fn with_affordance(mut self, affordance: Affordance) -> Self {
        self.affordance = Some(affordance);
        self
    }

    pub fn near(mut self, dom_index: Option<usize>) -> Self {
        self.previous_dom_index = dom_index;
        self
    }

    pub fn excluding(mut self, element: ElementRef) -> Self {
        if !self.exclude.contains(&element) {
            self.exclude.push(element);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.description.trim().is_empty()
            && self.selector.as_deref().map(str::is_empty).unwrap_or(true)
            && self.fallback_hints.is_empty()
    }
}

/// Element candidate for locator resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Matched element, `score` filled in
    pub element: ElementDescriptor,

    /// Strategy used to find this candidate
    pub strategy: LocatorStrategy,
}

impl Candidate {
    pub fn new(mut element: ElementDescriptor, strategy: LocatorStrategy, score: f64) -> Self {
        element.score = score;
        Self { element, strategy }
    }

    pub fn score(&self) -> f64 {
        self.element.score
    }

    pub fn element_ref(&self) -> &ElementRef {
        &self.element.element_ref
    }
}

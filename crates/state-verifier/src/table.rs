//! Symbolic state table

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::conditions::Condition;
use crate::types::StateSpec;

pub const PAGE_LOADED: &str = "page_loaded";
pub const SEARCH_RESULTS_PAGE: &str = "search_results_page";
pub const PRODUCT_PAGE: &str = "product_page";
pub const CART_UPDATED: &str = "cart_updated";
pub const FORM_EDITOR: &str = "form_editor";
pub const QUESTION_ADDED: &str = "question_added";

/// Name -> spec mapping, extendable at runtime
pub struct StateTable {
    specs: RwLock<HashMap<String, StateSpec>>,
}

impl Default for StateTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl StateTable {
    /// Empty table
    pub fn empty() -> Self {
        Self {
            specs: RwLock::new(HashMap::new()),
        }
    }

    /// Table preloaded with the built-in states
    pub fn with_builtins() -> Self {
        let table = Self::empty();
        for (name, spec) in builtin_states() {
            table.register(name, spec);
        }
        table
    }

    /// Add or replace a state
    pub fn register(&self, name: impl Into<String>, spec: StateSpec) {
        self.specs.write().insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Option<StateSpec> {
        self.specs.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs.read().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.specs.read().keys().cloned().collect();
        names.sort();
        names
    }
}

fn builtin_states() -> Vec<(&'static str, StateSpec)> {
    use Condition::*;

    vec![
        (PAGE_LOADED, StateSpec::new().require(UrlNotBlank)),
        (
            SEARCH_RESULTS_PAGE,
            StateSpec::new()
                .require(UrlNotBlank)
                .accept(ElementPresent(".s-result-item".into()))
                .accept(ElementPresent("#search".into()))
                .accept(ElementPresent("[data-component-type=s-search-result]".into()))
                .accept(UrlContains("/s?".into()))
                .accept(UrlContains("/search".into()))
                .accept(UrlContains("Special:Search".into())),
        ),
        (
            PRODUCT_PAGE,
            StateSpec::new()
                .accept(ElementPresent("#productTitle".into()))
                .accept(ElementPresent("#add-to-cart-button".into()))
                .accept(UrlContains("/dp/".into()))
                .accept(UrlContains("/product".into())),
        ),
        (
            CART_UPDATED,
            StateSpec::new()
                .accept(TextPresent("Added to Cart".into()))
                .accept(ElementPresent("#sw-atc-confirmation".into()))
                .accept(UrlContains("/cart".into()))
                .reject(TextPresent("Your cart is empty".into())),
        ),
        (
            FORM_EDITOR,
            StateSpec::new()
                .accept(ElementPresent("#form-title".into()))
                .accept(ElementPresent("[aria-label=\"Form title\"]".into()))
                .accept(UrlContains("/forms".into())),
        ),
        (
            QUESTION_ADDED,
            StateSpec::new()
                .accept(ElementPresent(".question-card".into()))
                .accept(ElementPresent("[data-item-type=question]".into())),
        ),
    ]
}

//! Fixture-backed page driver
//!
//! Models a small multi-page site described in YAML. Pages are matched by the
//! longest URL prefix, elements can navigate on click or submit, reveal hidden
//! elements, or reject interactions. Good enough to drive the engine end to
//! end without a browser.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabpilot_core_types::OriginId;
use tracing::debug;

use crate::driver::{PageContextProvider, PageDriver};
use crate::errors::DriverError;
use crate::types::{
    Affordance, ElementAttributes, ElementDescriptor, ElementRef, InteractOutcome, Interaction,
    LocateCriteria,
};

pub const BLANK_URL: &str = "about:blank";

const DEMO_SITE: &str = include_str!("../fixtures/demo-shop.yaml");

/// Built-in demo site covering search, product, cart and form-builder pages
pub fn demo_site() -> Result<SiteFixture, DriverError> {
    SiteFixture::from_yaml_str(DEMO_SITE)
}

/// A whole site
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteFixture {
    pub name: String,

    /// Page loaded when a context is first acquired
    #[serde(default)]
    pub start_url: Option<String>,

    #[serde(default)]
    pub pages: Vec<PageFixture>,

    /// URL prefix -> number of navigations that fail before one succeeds
    #[serde(default)]
    pub flaky_navigation: HashMap<String, u32>,
}

impl SiteFixture {
    pub fn from_yaml_str(raw: &str) -> Result<Self, DriverError> {
        serde_yaml::from_str(raw).map_err(|err| DriverError::Io(format!("invalid fixture: {err}")))
    }

    pub fn load(path: &Path) -> Result<Self, DriverError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| DriverError::Io(format!("{}: {err}", path.display())))?;
        Self::from_yaml_str(&raw)
    }

    /// Index of the page whose URL is the longest prefix of `url`
    fn page_for(&self, url: &str) -> Option<usize> {
        self.pages
            .iter()
            .enumerate()
            .filter(|(_, page)| url.starts_with(page.url.as_str()))
            .max_by_key(|(_, page)| page.url.len())
            .map(|(idx, _)| idx)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageFixture {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<ElementFixture>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElementFixture {
    #[serde(default)]
    pub id: Option<String>,
    pub tag: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub input_type: Option<String>,

    /// Extra selectors this element answers to verbatim
    #[serde(default)]
    pub selectors: Vec<String>,

    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,

    #[serde(default)]
    pub clickable: Option<bool>,
    #[serde(default)]
    pub editable: Option<bool>,

    /// URL loaded when clicked; `{value}` is replaced by the last typed text
    #[serde(default)]
    pub on_click: Option<String>,

    /// URL loaded on type-and-submit; `{value}` is replaced by the typed text
    #[serde(default)]
    pub on_submit: Option<String>,

    /// Element ids made visible when clicked
    #[serde(default)]
    pub reveals: Vec<String>,

    /// Every interaction is rejected with this reason
    #[serde(default)]
    pub reject: Option<String>,

    /// Allowed values for select
    #[serde(default)]
    pub options: Vec<String>,
}

fn default_visible() -> bool {
    true
}

fn default_width() -> f64 {
    120.0
}

fn default_height() -> f64 {
    32.0
}

const CLICKABLE_TAGS: &[&str] = &["button", "a", "summary", "option"];
const CLICKABLE_ROLES: &[&str] = &["button", "link", "menuitem", "tab", "option", "checkbox"];
const EDITABLE_TAGS: &[&str] = &["input", "textarea", "select"];
const EDITABLE_ROLES: &[&str] = &["textbox", "searchbox", "combobox", "listbox"];

impl ElementFixture {
    fn is_clickable(&self) -> bool {
        self.clickable.unwrap_or_else(|| {
            CLICKABLE_TAGS.contains(&self.tag.as_str())
                || self
                    .role
                    .as_deref()
                    .map(|role| CLICKABLE_ROLES.contains(&role))
                    .unwrap_or(false)
                || self.on_click.is_some()
                || !self.reveals.is_empty()
                || (self.tag == "input"
                    && matches!(self.input_type.as_deref(), Some("submit" | "button")))
        })
    }

    fn is_editable(&self) -> bool {
        self.editable.unwrap_or_else(|| {
            let button_like = self.tag == "input"
                && matches!(self.input_type.as_deref(), Some("submit" | "button"));
            (!button_like && EDITABLE_TAGS.contains(&self.tag.as_str()))
                || self
                    .role
                    .as_deref()
                    .map(|role| EDITABLE_ROLES.contains(&role))
                    .unwrap_or(false)
        })
    }

    fn matches_selector(&self, selector: &str) -> bool {
        selector
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .any(|part| {
                self.selectors.iter().any(|own| own == part)
                    || parse_simple_selector(part)
                        .map(|simple| simple.matches(self))
                        .unwrap_or(false)
            })
    }
}

/// `tag#id.class[attr=value]` with every part optional
#[derive(Debug, Default)]
struct SimpleSelector {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<(String, Option<String>)>,
}

fn parse_simple_selector(raw: &str) -> Option<SimpleSelector> {
    if raw.contains(' ') && !raw.contains('[') {
        // descendant combinators are not modelled
        return None;
    }
    let mut selector = SimpleSelector::default();
    let mut chars = raw.chars().peekable();

    let mut tag = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '-' {
            tag.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if !tag.is_empty() {
        selector.tag = Some(tag.to_ascii_lowercase());
    }

    while let Some(c) = chars.next() {
        match c {
            '#' | '.' => {
                let mut ident = String::new();
                while let Some(&n) = chars.peek() {
                    if n.is_ascii_alphanumeric() || n == '-' || n == '_' {
                        ident.push(n);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if ident.is_empty() {
                    return None;
                }
                if c == '#' {
                    selector.id = Some(ident);
                } else {
                    selector.classes.push(ident);
                }
            }
            '[' => {
                let mut body = String::new();
                for n in chars.by_ref() {
                    if n == ']' {
                        break;
                    }
                    body.push(n);
                }
                let (name, value) = match body.split_once('=') {
                    Some((name, value)) => (
                        name.trim().to_string(),
                        Some(value.trim().trim_matches(|q| q == '"' || q == '\'').to_string()),
                    ),
                    None => (body.trim().to_string(), None),
                };
                if name.is_empty() {
                    return None;
                }
                selector.attrs.push((name, value));
            }
            _ => return None,
        }
    }

    Some(selector)
}

impl SimpleSelector {
    fn matches(&self, el: &ElementFixture) -> bool {
        if self.tag.is_none() && self.id.is_none() && self.classes.is_empty() && self.attrs.is_empty()
        {
            return false;
        }
        if let Some(tag) = &self.tag {
            if !el.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if el.id.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        let own_classes: Vec<&str> = el
            .class
            .as_deref()
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default();
        if !self.classes.iter().all(|c| own_classes.contains(&c.as_str())) {
            return false;
        }
        self.attrs.iter().all(|(name, expected)| {
            let actual = match name.as_str() {
                "id" => el.id.as_deref(),
                "name" => el.name.as_deref(),
                "placeholder" => el.placeholder.as_deref(),
                "aria-label" => el.aria_label.as_deref(),
                "role" => el.role.as_deref(),
                "type" => el.input_type.as_deref(),
                _ => None,
            };
            match (actual, expected) {
                (Some(actual), Some(expected)) => actual == expected,
                (Some(_), None) => true,
                (None, _) => false,
            }
        })
    }
}

/// One recorded interaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRecord {
    pub element: ElementRef,
    pub interaction: Interaction,
    pub value: Option<String>,
}

#[derive(Debug, Default)]
struct PageState {
    url: String,
    page: Option<usize>,
    typed: HashMap<usize, String>,
    revealed: HashSet<String>,
    last_typed: Option<String>,
    nav_failures: HashMap<String, u32>,
    interactions: Vec<InteractionRecord>,
    navigations: Vec<String>,
}

/// In-memory page over a [`SiteFixture`]
pub struct InMemoryPage {
    site: Arc<SiteFixture>,
    state: Mutex<PageState>,
}

impl InMemoryPage {
    /// New page showing `about:blank`
    pub fn new(site: Arc<SiteFixture>) -> Self {
        Self {
            site,
            state: Mutex::new(PageState {
                url: BLANK_URL.to_string(),
                ..PageState::default()
            }),
        }
    }

    /// New page already showing the site's start URL, if any
    pub fn at_start(site: Arc<SiteFixture>) -> Self {
        let page = Self::new(site);
        if let Some(start) = page.site.start_url.clone() {
            let mut state = page.state.lock();
            if let Some(idx) = page.site.page_for(&start) {
                state.page = Some(idx);
                state.url = start;
            }
        }
        page
    }

    /// Interactions dispatched so far, in order
    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.state.lock().interactions.clone()
    }

    /// URLs successfully loaded so far
    pub fn navigations(&self) -> Vec<String> {
        self.state.lock().navigations.clone()
    }

    /// Value typed into the element with the given fixture id on the current page
    pub fn typed_value(&self, element_id: &str) -> Option<String> {
        let state = self.state.lock();
        let page = &self.site.pages[state.page?];
        let idx = page
            .elements
            .iter()
            .position(|el| el.id.as_deref() == Some(element_id))?;
        state.typed.get(&idx).cloned()
    }

    fn load(&self, state: &mut PageState, url: &str) -> Result<(), DriverError> {
        if let Some((prefix, failures)) = self
            .site
            .flaky_navigation
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
        {
            let seen = state.nav_failures.entry(prefix.clone()).or_insert(0);
            if *seen < *failures {
                *seen += 1;
                return Err(DriverError::Navigation(format!(
                    "{url}: connection reset (attempt {seen})"
                )));
            }
        }

        let idx = self
            .site
            .page_for(url)
            .ok_or_else(|| DriverError::Navigation(format!("{url}: host unreachable")))?;
        state.page = Some(idx);
        state.url = url.to_string();
        state.typed.clear();
        state.revealed.clear();
        state.last_typed = None;
        state.navigations.push(url.to_string());
        debug!(url = %url, page = idx, "fixture page loaded");
        Ok(())
    }

    fn describe(&self, state: &PageState, page_idx: usize, idx: usize) -> ElementDescriptor {
        let el = &self.site.pages[page_idx].elements[idx];
        let revealed = el
            .id
            .as_ref()
            .map(|id| state.revealed.contains(id))
            .unwrap_or(false);
        ElementDescriptor {
            element_ref: ElementRef(format!("p{page_idx}:e{idx}")),
            tag: el.tag.clone(),
            role: el.role.clone(),
            text: el.text.clone(),
            attributes: ElementAttributes {
                id: el.id.clone(),
                name: el.name.clone(),
                placeholder: el.placeholder.clone(),
                aria_label: el.aria_label.clone(),
                class: el.class.clone(),
                input_type: el.input_type.clone(),
            },
            visible: el.visible || revealed,
            width: el.width,
            height: el.height,
            dom_index: idx,
            clickable: el.is_clickable(),
            editable: el.is_editable(),
            score: 0.0,
        }
    }

    fn resolve(&self, state: &PageState, element: &ElementRef) -> Result<usize, DriverError> {
        let current = state
            .page
            .ok_or_else(|| DriverError::StaleElement(format!("{element}: no document loaded")))?;
        let (page, idx) = element
            .0
            .strip_prefix('p')
            .and_then(|rest| rest.split_once(":e"))
            .and_then(|(page, idx)| Some((page.parse::<usize>().ok()?, idx.parse::<usize>().ok()?)))
            .ok_or_else(|| DriverError::StaleElement(format!("{element}: malformed reference")))?;
        if page != current || idx >= self.site.pages[current].elements.len() {
            return Err(DriverError::StaleElement(format!(
                "{element}: not in current document"
            )));
        }
        Ok(idx)
    }
}

#[async_trait]
impl PageDriver for InMemoryPage {
    async fn locate_candidates(
        &self,
        criteria: &LocateCriteria,
    ) -> Result<Vec<ElementDescriptor>, DriverError> {
        let state = self.state.lock();
        let Some(page_idx) = state.page else {
            return Ok(Vec::new());
        };
        let page = &self.site.pages[page_idx];
        Ok(page
            .elements
            .iter()
            .enumerate()
            .filter(|(_, el)| {
                criteria
                    .selector
                    .as_deref()
                    .map(|sel| el.matches_selector(sel))
                    .unwrap_or(true)
            })
            .filter(|(_, el)| match criteria.affordance {
                Some(Affordance::Clickable) => el.is_clickable(),
                Some(Affordance::Editable) => el.is_editable(),
                None => true,
            })
            .map(|(idx, _)| self.describe(&state, page_idx, idx))
            .collect())
    }

    async fn interact(
        &self,
        element: &ElementRef,
        interaction: Interaction,
        value: Option<&str>,
    ) -> Result<InteractOutcome, DriverError> {
        let mut state = self.state.lock();
        let idx = self.resolve(&state, element)?;
        let page_idx = state.page.unwrap_or_default();
        let descriptor = self.describe(&state, page_idx, idx);
        let el = self.site.pages[page_idx].elements[idx].clone();

        if let Some(reason) = &el.reject {
            return Err(DriverError::InteractionRejected(reason.clone()));
        }
        if !descriptor.is_interactable() {
            return Err(DriverError::InteractionRejected(format!(
                "{element} is not visible"
            )));
        }

        state.interactions.push(InteractionRecord {
            element: element.clone(),
            interaction,
            value: value.map(str::to_string),
        });

        let target = match interaction {
            Interaction::Click => {
                if !descriptor.clickable {
                    return Err(DriverError::InteractionRejected(format!(
                        "{element} does not accept clicks"
                    )));
                }
                for id in &el.reveals {
                    state.revealed.insert(id.clone());
                }
                let typed = state.last_typed.clone().unwrap_or_default();
                el.on_click
                    .as_ref()
                    .map(|url| url.replace("{value}", &encode_query(&typed)))
            }
            Interaction::Type | Interaction::TypeAndSubmit => {
                if !descriptor.editable {
                    return Err(DriverError::InteractionRejected(format!(
                        "{element} is not editable"
                    )));
                }
                let text = value.unwrap_or_default().to_string();
                state.typed.insert(idx, text.clone());
                state.last_typed = Some(text.clone());
                if interaction == Interaction::TypeAndSubmit {
                    el.on_submit
                        .as_ref()
                        .map(|url| url.replace("{value}", &encode_query(&text)))
                } else {
                    None
                }
            }
            Interaction::Select => {
                let choice = value.unwrap_or_default();
                if !el.options.is_empty() && !el.options.iter().any(|opt| opt == choice) {
                    return Err(DriverError::InteractionRejected(format!(
                        "{element} has no option '{choice}'"
                    )));
                }
                state.typed.insert(idx, choice.to_string());
                None
            }
        };

        match target {
            Some(url) => {
                self.load(&mut state, &url)?;
                Ok(InteractOutcome {
                    navigated: true,
                    url_after: Some(url),
                })
            }
            None => Ok(InteractOutcome {
                navigated: false,
                url_after: Some(state.url.clone()),
            }),
        }
    }

    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        self.load(&mut state, url)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().url.clone())
    }

    async fn page_title(&self) -> Result<String, DriverError> {
        let state = self.state.lock();
        Ok(state
            .page
            .map(|idx| self.site.pages[idx].title.clone())
            .unwrap_or_default())
    }

    async fn wait_for_settle(&self, ms: u64) -> Result<(), DriverError> {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(())
    }
}

fn encode_query(text: &str) -> String {
    text.trim().replace(' ', "+")
}

/// Provider handing out one [`InMemoryPage`] per origin
pub struct FixtureContextProvider {
    site: Arc<SiteFixture>,
    pages: Mutex<HashMap<OriginId, Arc<InMemoryPage>>>,
    released: AtomicUsize,
}

impl FixtureContextProvider {
    pub fn new(site: SiteFixture) -> Self {
        Self {
            site: Arc::new(site),
            pages: Mutex::new(HashMap::new()),
            released: AtomicUsize::new(0),
        }
    }

    /// Live page for an origin
    pub fn page(&self, origin: &OriginId) -> Option<Arc<InMemoryPage>> {
        self.pages.lock().get(origin).cloned()
    }

    /// Number of handles released so far
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.pages.lock().len()
    }
}

#[async_trait]
impl PageContextProvider for FixtureContextProvider {
    async fn acquire(&self, origin: &OriginId) -> Result<Arc<dyn PageDriver>, DriverError> {
        let page = self
            .pages
            .lock()
            .entry(origin.clone())
            .or_insert_with(|| Arc::new(InMemoryPage::at_start(self.site.clone())))
            .clone();
        Ok(page)
    }

    async fn release(&self, origin: &OriginId, _handle: Arc<dyn PageDriver>) {
        if self.pages.lock().remove(origin).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
            debug!(origin = %origin, "fixture page released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(tag: &str) -> ElementFixture {
        serde_yaml::from_str(&format!("tag: {tag}")).unwrap()
    }

    #[test]
    fn selector_forms() {
        let mut el = element("input");
        el.id = Some("q".into());
        el.name = Some("field-keywords".into());
        el.class = Some("nav-input search".into());
        el.selectors = vec!["input#q:focus".into()];

        assert!(el.matches_selector("#q"));
        assert!(el.matches_selector("input"));
        assert!(el.matches_selector("input#q.search"));
        assert!(el.matches_selector("[name=field-keywords]"));
        assert!(el.matches_selector("[name=\"field-keywords\"]"));
        assert!(el.matches_selector("#missing, .nav-input"));
        assert!(el.matches_selector("input#q:focus"));
        assert!(!el.matches_selector("button"));
        assert!(!el.matches_selector("#other"));
        assert!(!el.matches_selector("div input"));
    }

    #[test]
    fn affordance_defaults() {
        let input = element("input");
        assert!(input.is_editable());
        assert!(!input.is_clickable());

        let mut submit = element("input");
        submit.input_type = Some("submit".into());
        assert!(submit.is_clickable());
        assert!(!submit.is_editable());

        let mut div = element("div");
        div.role = Some("button".into());
        assert!(div.is_clickable());
    }

    #[test]
    fn longest_prefix_page_wins() {
        let site = SiteFixture {
            name: "t".into(),
            pages: vec![
                PageFixture {
                    url: "https://shop.test".into(),
                    ..Default::default()
                },
                PageFixture {
                    url: "https://shop.test/s".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert_eq!(site.page_for("https://shop.test/s?k=x"), Some(1));
        assert_eq!(site.page_for("https://shop.test/"), Some(0));
        assert_eq!(site.page_for("https://elsewhere.test"), None);
    }
}

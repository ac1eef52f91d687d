//! Rule-table goal analyzer.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::model::{Goal, TaskType};

type Extractor = fn(&str) -> BTreeMap<String, String>;

/// One classification rule. The first rule whose pattern matches decides the
/// goal; if its required parameters cannot be extracted the goal is generic.
struct GoalRule {
    task_type: TaskType,
    pattern: Regex,
    extract: Extractor,
}

static RULES: Lazy<Vec<GoalRule>> = Lazy::new(|| {
    vec![
        GoalRule {
            task_type: TaskType::ComplexCartFlow,
            pattern: Regex::new(r"(?i)\b(?:find|search\s+for|look\s+for|get)\b.*\badd\b.*\bcart\b")
                .expect("cart rule"),
            extract: extract_cart,
        },
        GoalRule {
            task_type: TaskType::FormCreation,
            pattern: Regex::new(r"(?i)\bcreate\b.*\bform\b.*\bwith\b.*\bquestions?\b")
                .expect("form rule"),
            extract: extract_form,
        },
        GoalRule {
            task_type: TaskType::GenericSearch,
            pattern: Regex::new(r"(?i)^\s*(?:please\s+)?(?:search(?:\s+for)?|look\s+up|find)\s+\S")
                .expect("search rule"),
            extract: extract_search,
        },
        GoalRule {
            task_type: TaskType::Navigate,
            pattern: Regex::new(r"(?i)^\s*(?:please\s+)?(?:go\s+to|open|navigate\s+to|visit)\s+\S")
                .expect("navigate rule"),
            extract: extract_navigate,
        },
    ]
});

static URL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://[^\s]+").expect("url regex"));
static QUOTED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("quoted regex"));
static SITE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bon\s+(?:the\s+)?(?P<site>[a-z0-9][a-z0-9.\-]*)").expect("site regex")
});
static CART_PRODUCT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:find|search\s+for|look\s+for|get)\s+(?:me\s+)?(?:an?\s+|the\s+|some\s+)?(?P<product>.+?)(?:\s+on\s+(?:the\s+)?[a-z0-9.\-]+)?\s*(?:,|\band\b|\bthen\b|&)",
    )
    .expect("cart product regex")
});
static CART_ADD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\badd\s+(?:an?\s+|the\s+)?(?P<product>.+?)\s+to\s+(?:the\s+|my\s+)?cart")
        .expect("cart add regex")
});
static FORM_COUNT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bwith\s+(?P<count>\d+|one|two|three|four|five|six|seven|eight|nine|ten)\s+(?P<qtype>[a-z][a-z\- ]*?\s+)?questions?\b")
        .expect("form count regex")
});
static FORM_TOPIC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bform\s+(?:about|on|for)\s+(?P<topic>.+?)\s+with\b").expect("form topic regex")
});
static FORM_TRAILING_TOPIC_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bquestions?\s+(?:about|on|regarding)\s+(?P<topic>.+?)\s*[.!?]?\s*$")
        .expect("form trailing topic regex")
});
static SEARCH_QUERY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:search(?:\s+for)?|look\s+up|find)\s+(?P<query>.+?)(?:\s+on\s+(?:the\s+)?(?P<site>[a-z0-9][a-z0-9.\-]*))?\s*[.!?]?\s*$",
    )
    .expect("search query regex")
});
static NAVIGATE_TARGET_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+)?(?:go\s+to|open|navigate\s+to|visit)\s+(?:the\s+)?(?P<target>.+?)(?:\s+(?:website|web\s+site|site|homepage|home\s+page|page))?\s*[.!?]?\s*$",
    )
    .expect("navigate target regex")
});

/// Words that stand in for a product without naming one.
const PLACEHOLDER_PRODUCTS: &[&str] = &["product", "it", "item", "something", "this", "that", "them"];

const KNOWN_SITES: &[(&str, &str)] = &[
    ("amazon", "https://www.amazon.com"),
    ("google", "https://www.google.com"),
    ("ebay", "https://www.ebay.com"),
    ("youtube", "https://www.youtube.com"),
    ("wikipedia", "https://www.wikipedia.org"),
    ("github", "https://github.com"),
    ("walmart", "https://www.walmart.com"),
    ("bing", "https://www.bing.com"),
    ("google forms", "https://docs.google.com/forms/create"),
];

/// Start URL for a site name, URL or bare domain.
pub fn known_site_url(site: &str) -> String {
    let cleaned = site.trim().trim_end_matches(['.', '/']).to_lowercase();
    if cleaned.starts_with("http://") || cleaned.starts_with("https://") {
        return site.trim().to_string();
    }
    if let Some((_, url)) = KNOWN_SITES.iter().find(|(name, _)| *name == cleaned) {
        return (*url).to_string();
    }
    let bare = cleaned
        .strip_suffix(".com")
        .unwrap_or(&cleaned)
        .to_string();
    if let Some((_, url)) = KNOWN_SITES.iter().find(|(name, _)| *name == bare) {
        return (*url).to_string();
    }
    if cleaned.contains('.') {
        return format!("https://{cleaned}");
    }
    let slug: String = cleaned.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    format!("https://www.{slug}.com")
}

/// Classifies goals with the rule table. Pure and deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct GoalAnalyzer;

impl GoalAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, text: &str) -> Goal {
        let text = text.trim();
        for rule in RULES.iter() {
            if !rule.pattern.is_match(text) {
                continue;
            }
            let parameters = (rule.extract)(text);
            let missing: Vec<&str> = rule
                .task_type
                .required_parameters()
                .iter()
                .copied()
                .filter(|name| !parameters.contains_key(*name))
                .collect();
            if missing.is_empty() {
                debug!(task_type = %rule.task_type, ?parameters, "goal classified");
                return Goal {
                    text: text.to_string(),
                    task_type: rule.task_type,
                    parameters,
                };
            }
            debug!(
                task_type = %rule.task_type,
                ?missing,
                "rule matched without required parameters, using generic"
            );
            return generic_goal(text);
        }
        generic_goal(text)
    }
}

fn generic_goal(text: &str) -> Goal {
    let mut parameters = BTreeMap::new();
    if let Some(url) = URL_REGEX.find(text) {
        parameters.insert("url".to_string(), clean_url(url.as_str()));
    }
    Goal {
        text: text.to_string(),
        task_type: TaskType::Generic,
        parameters,
    }
}

fn first_quoted(text: &str) -> Option<String> {
    QUOTED_REGEX.captures(text).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

fn clean_url(raw: &str) -> String {
    raw.trim_end_matches(['.', ',', ')', '!', '?', '"', '\''])
        .to_string()
}

/// Strips articles and trailing punctuation; rejects placeholder words.
fn clean_phrase(raw: &str) -> Option<String> {
    let mut phrase = raw
        .trim()
        .trim_end_matches(['.', ',', '!', '?'])
        .trim();
    for article in ["a ", "an ", "the ", "some "] {
        let starts_with_article = phrase.len() > article.len()
            && phrase
                .get(..article.len())
                .map(|head| head.eq_ignore_ascii_case(article))
                .unwrap_or(false);
        if starts_with_article {
            phrase = phrase[article.len()..].trim();
        }
    }
    if phrase.is_empty() {
        return None;
    }
    let lower = phrase.to_lowercase();
    let placeholder = lower
        .split_whitespace()
        .all(|word| PLACEHOLDER_PRODUCTS.contains(&word) || matches!(word, "a" | "an" | "the" | "one"));
    if placeholder {
        return None;
    }
    Some(phrase.to_string())
}

fn insert_site(params: &mut BTreeMap<String, String>, site: &str) {
    let site = site.trim().trim_end_matches(['.', ',', '!', '?']).to_lowercase();
    if site.is_empty() {
        return;
    }
    params.insert("siteUrl".to_string(), known_site_url(&site));
    params.insert("site".to_string(), site);
}

fn last_site(text: &str) -> Option<String> {
    SITE_REGEX
        .captures_iter(text)
        .last()
        .and_then(|caps| caps.name("site"))
        .map(|m| m.as_str().to_string())
}

fn extract_cart(text: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let product = first_quoted(text)
        .and_then(|q| clean_phrase(&q))
        .or_else(|| {
            CART_PRODUCT_REGEX
                .captures(text)
                .and_then(|caps| caps.name("product"))
                .and_then(|m| clean_phrase(m.as_str()))
        })
        .or_else(|| {
            CART_ADD_REGEX
                .captures(text)
                .and_then(|caps| caps.name("product"))
                .and_then(|m| clean_phrase(m.as_str()))
        });
    if let Some(product) = product {
        params.insert("productName".to_string(), product);
    }
    if let Some(site) = last_site(text) {
        insert_site(&mut params, &site);
    }
    params
}

fn parse_count(raw: &str) -> Option<u32> {
    let lower = raw.to_lowercase();
    let words = [
        "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
    ];
    if let Some(pos) = words.iter().position(|w| *w == lower) {
        return Some(pos as u32 + 1);
    }
    lower.parse::<u32>().ok().filter(|n| *n > 0)
}

fn extract_form(text: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(caps) = FORM_COUNT_REGEX.captures(text) {
        if let Some(count) = caps.name("count").and_then(|m| parse_count(m.as_str())) {
            params.insert("count".to_string(), count.to_string());
        }
        if let Some(qtype) = caps
            .name("qtype")
            .map(|m| m.as_str().trim().to_lowercase())
            .filter(|s| !s.is_empty())
        {
            params.insert("questionType".to_string(), qtype);
        }
    }
    let topic = first_quoted(text)
        .or_else(|| {
            FORM_TOPIC_REGEX
                .captures(text)
                .and_then(|caps| caps.name("topic"))
                .map(|m| m.as_str().trim().to_string())
        })
        .or_else(|| {
            FORM_TRAILING_TOPIC_REGEX
                .captures(text)
                .and_then(|caps| caps.name("topic"))
                .map(|m| m.as_str().trim().to_string())
        });
    if let Some(topic) = topic.filter(|t| !t.is_empty()) {
        params.insert("topic".to_string(), topic);
    }
    params
}

fn extract_search(text: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let caps = SEARCH_QUERY_REGEX.captures(text);
    let query = first_quoted(text).or_else(|| {
        caps.as_ref()
            .and_then(|caps| caps.name("query"))
            .map(|m| m.as_str().trim().to_string())
    });
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        params.insert("query".to_string(), query);
    }
    if let Some(site) = caps.as_ref().and_then(|caps| caps.name("site")) {
        insert_site(&mut params, site.as_str());
    }
    params
}

fn extract_navigate(text: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(url) = URL_REGEX.find(text) {
        let url = clean_url(url.as_str());
        params.insert("target".to_string(), url.clone());
        params.insert("siteUrl".to_string(), url);
        return params;
    }
    if let Some(target) = NAVIGATE_TARGET_REGEX
        .captures(text)
        .and_then(|caps| caps.name("target"))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
    {
        params.insert("siteUrl".to_string(), known_site_url(&target));
        params.insert("target".to_string(), target);
    }
    params
}

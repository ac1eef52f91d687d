//! Condition types for state verification

use page_driver::{LocateCriteria, PageDriver};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::VerifyError;

/// Condition enumeration for validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Condition {
    /// A visible element answers to the selector
    ElementPresent(String),

    /// Text appears in the title or any visible element (case-insensitive)
    TextPresent(String),

    /// URL contains substring
    UrlContains(String),

    /// URL matches regex pattern
    UrlMatches(String),

    /// Title contains substring (case-insensitive)
    TitleContains(String),

    /// Something other than `about:blank` is loaded
    UrlNotBlank,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::ElementPresent(sel) => write!(f, "element '{sel}' present"),
            Condition::TextPresent(text) => write!(f, "text '{text}' present"),
            Condition::UrlContains(part) => write!(f, "url contains '{part}'"),
            Condition::UrlMatches(pattern) => write!(f, "url matches /{pattern}/"),
            Condition::TitleContains(part) => write!(f, "title contains '{part}'"),
            Condition::UrlNotBlank => f.write_str("page loaded"),
        }
    }
}

/// Page facts gathered once per poll
#[derive(Debug, Clone, Default)]
pub struct PageView {
    pub url: String,
    pub title: String,
    pub visible_text: Vec<String>,
}

impl PageView {
    pub async fn capture(driver: &dyn PageDriver) -> Result<Self, VerifyError> {
        let url = driver.current_url().await?;
        let title = driver.page_title().await?;
        let visible_text = driver
            .locate_candidates(&LocateCriteria::all())
            .await?
            .into_iter()
            .filter(|el| el.visible)
            .map(|el| el.text.to_lowercase())
            .filter(|text| !text.is_empty())
            .collect();
        Ok(Self {
            url,
            title,
            visible_text,
        })
    }
}

impl Condition {
    /// Evaluate against the live page
    ///
    /// `view` must be captured from the same driver in the same poll.
    pub async fn evaluate(
        &self,
        driver: &dyn PageDriver,
        view: &PageView,
    ) -> Result<bool, VerifyError> {
        match self {
            Condition::ElementPresent(selector) => {
                if selector.trim().is_empty() {
                    return Err(VerifyError::InvalidCondition("empty selector".to_string()));
                }
                let found = driver
                    .locate_candidates(&LocateCriteria::selector(selector.clone()))
                    .await?;
                Ok(found.iter().any(|el| el.is_interactable()))
            }
            Condition::TextPresent(text) => {
                let needle = text.to_lowercase();
                Ok(view.title.to_lowercase().contains(&needle)
                    || view.visible_text.iter().any(|t| t.contains(&needle)))
            }
            Condition::UrlContains(part) => Ok(view.url.contains(part.as_str())),
            Condition::UrlMatches(pattern) => {
                let re = Regex::new(pattern)
                    .map_err(|err| VerifyError::InvalidCondition(format!("{pattern}: {err}")))?;
                Ok(re.is_match(&view.url))
            }
            Condition::TitleContains(part) => {
                Ok(view.title.to_lowercase().contains(&part.to_lowercase()))
            }
            Condition::UrlNotBlank => {
                let url = view.url.trim();
                Ok(!url.is_empty() && url != "about:blank")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_serde_shape() {
        let cond: Condition =
            serde_json::from_str(r#"{"type":"url_contains","value":"/cart"}"#).unwrap();
        assert_eq!(cond, Condition::UrlContains("/cart".into()));
        let blank: Condition = serde_json::from_str(r#"{"type":"url_not_blank"}"#).unwrap();
        assert_eq!(blank, Condition::UrlNotBlank);
    }

    #[test]
    fn condition_display() {
        assert_eq!(
            Condition::ElementPresent("#productTitle".into()).to_string(),
            "element '#productTitle' present"
        );
        assert_eq!(Condition::UrlNotBlank.to_string(), "page loaded");
    }
}

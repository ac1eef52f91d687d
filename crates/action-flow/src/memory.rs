//! Memory lookup for type steps planned without a value

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::FlowError;

/// Ranked piece of remembered text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub text: String,
    pub score: f64,
    #[serde(default)]
    pub source: Option<String>,
}

impl Snippet {
    pub fn new(text: impl Into<String>, score: f64) -> Self {
        Self {
            text: text.into(),
            score,
            source: None,
        }
    }
}

/// Source of snippets, best first
#[async_trait]
pub trait MemoryRetriever: Send + Sync {
    async fn retrieve(&self, query: &str) -> Result<Vec<Snippet>, FlowError>;
}

/// Fixed set of keyed entries ranked by word overlap with the query
#[derive(Debug, Clone, Default)]
pub struct StaticMemory {
    entries: Vec<(String, String)>,
}

impl StaticMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `text` under a free-form `key` (e.g. "shipping email")
    pub fn with_entry(mut self, key: impl Into<String>, text: impl Into<String>) -> Self {
        self.entries.push((key.into(), text.into()));
        self
    }
}

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl MemoryRetriever for StaticMemory {
    async fn retrieve(&self, query: &str) -> Result<Vec<Snippet>, FlowError> {
        let query_words = words(query);
        if query_words.is_empty() {
            return Ok(Vec::new());
        }
        let mut snippets: Vec<Snippet> = self
            .entries
            .iter()
            .filter_map(|(key, text)| {
                let key_words = words(key);
                let hits = query_words.iter().filter(|w| key_words.contains(w)).count();
                (hits > 0).then(|| Snippet {
                    text: text.clone(),
                    score: hits as f64 / query_words.len() as f64,
                    source: Some(key.clone()),
                })
            })
            .collect();
        snippets.sort_by(|a, b| b.score.total_cmp(&a.score));
        Ok(snippets)
    }
}

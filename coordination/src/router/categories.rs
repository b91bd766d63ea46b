//! Category tables: intents and knowledge domains described as data.
//!
//! Both the heuristic scorer and the oracle prompt builders read the same
//! `{key, description, keywords}` tuples, so registering a new domain is a
//! data change only.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task::IntentKind;

/// Errors raised while building a category table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CategoryError {
    #[error("category table must contain at least one entry")]
    Empty,

    #[error("category key must not be blank")]
    BlankKey,

    #[error("duplicate category key: {0}")]
    DuplicateKey(String),

    #[error("unknown default category: {0}")]
    UnknownDefault(String),
}

/// One classifiable category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub key: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl CategoryEntry {
    pub fn new(key: &str, description: &str, keywords: &[&str]) -> Self {
        Self {
            key: key.to_string(),
            description: description.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Non-empty ordered set of categories with unique keys.
///
/// Order matters: it is the tie-break order for scoring and the listing
/// order in prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CategoryEntry>", into = "Vec<CategoryEntry>")]
pub struct CategoryTable {
    entries: Vec<CategoryEntry>,
}

impl TryFrom<Vec<CategoryEntry>> for CategoryTable {
    type Error = CategoryError;

    fn try_from(entries: Vec<CategoryEntry>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<CategoryTable> for Vec<CategoryEntry> {
    fn from(table: CategoryTable) -> Self {
        table.entries
    }
}

impl CategoryTable {
    /// Validate and build a table.
    pub fn new(entries: Vec<CategoryEntry>) -> Result<Self, CategoryError> {
        if entries.is_empty() {
            return Err(CategoryError::Empty);
        }
        let mut seen: Vec<&str> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let key = entry.key.trim();
            if key.is_empty() {
                return Err(CategoryError::BlankKey);
            }
            if seen.contains(&key) {
                return Err(CategoryError::DuplicateKey(key.to_string()));
            }
            seen.push(key);
        }
        Ok(Self { entries })
    }

    /// Built-in table for the three intent kinds.
    pub fn intents() -> Self {
        let entries = IntentKind::ALL
            .into_iter()
            .map(|kind| CategoryEntry::new(kind.key(), kind.description(), intent_keywords(kind)))
            .collect();
        Self { entries }
    }

    /// Built-in knowledge domains used when no registry is configured.
    pub fn default_domains() -> Self {
        Self {
            entries: vec![
                CategoryEntry::new(
                    "economy",
                    "Macroeconomic indicators, prices, monetary policy and markets",
                    &[
                        "ppi", "cpi", "gdp", "inflation", "interest rate", "monetary",
                        "economy", "economic", "price index", "exchange rate", "物价", "通胀",
                        "经济",
                    ],
                ),
                CategoryEntry::new(
                    "technology",
                    "Software, hardware, AI and engineering topics",
                    &[
                        "software", "hardware", "programming", "algorithm", "database",
                        "machine learning", "artificial intelligence", "rust", "cloud",
                        "技术", "编程",
                    ],
                ),
                CategoryEntry::new(
                    "general",
                    "General knowledge that does not fit a specialised domain",
                    &["history", "who is", "what is", "definition", "explain", "常识"],
                ),
            ],
        }
    }

    pub fn entries(&self) -> &[CategoryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&CategoryEntry> {
        let key = key.trim();
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    /// First entry; tables are never empty.
    pub fn first(&self) -> &CategoryEntry {
        &self.entries[0]
    }

    /// Render `- key: description` lines for prompt building.
    pub fn prompt_listing(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("- {}: {}", e.key, e.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn intent_keywords(kind: IntentKind) -> &'static [&'static str] {
    match kind {
        IntentKind::KnowledgeQuery => &[
            "what is", "what are", "explain", "who", "why", "how does", "tell me",
            "define", "describe", "什么", "介绍", "为什么",
        ],
        IntentKind::Calculation => &[
            "calculate", "compute", "multiply", "multiplied", "times", "plus", "sum",
            "add", "product", "*", "+", "×", "计算", "乘", "加",
        ],
        IntentKind::WeatherLookup => &[
            "weather", "temperature", "forecast", "rain", "humidity", "sunny", "天气",
            "气温", "下雨",
        ],
    }
}

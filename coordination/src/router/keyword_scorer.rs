//! Deterministic keyword scoring over a category table.
//!
//! Each distinct keyword found in the text contributes a weight that grows
//! with keyword length; every match after the first adds a small bonus. The
//! total is capped at 1.0.

use serde::{Deserialize, Serialize};

use super::categories::CategoryTable;

/// Score of one category against one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordScore {
    pub key: String,
    /// Capped score in [0, 1].
    pub score: f64,
    /// Keywords that matched, in table order.
    pub matched: Vec<String>,
}

impl KeywordScore {
    /// Short rationale, e.g. `economy scored 0.70 (ppi, inflation)`.
    pub fn explain(&self) -> String {
        if self.matched.is_empty() {
            format!("{} scored {:.2} (no keyword matches)", self.key, self.score)
        } else {
            format!(
                "{} scored {:.2} ({})",
                self.key,
                self.score,
                self.matched.join(", ")
            )
        }
    }
}

/// Keyword weights and bonus used by the heuristic classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeywordScorer {
    /// Weight for keywords of at most 3 characters.
    pub short_weight: f64,
    /// Weight for keywords of 4 to 7 characters.
    pub medium_weight: f64,
    /// Weight for keywords of 8 or more characters.
    pub long_weight: f64,
    /// Added for each distinct match beyond the first.
    pub distinct_bonus: f64,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self {
            short_weight: 0.2,
            medium_weight: 0.3,
            long_weight: 0.4,
            distinct_bonus: 0.1,
        }
    }
}

impl KeywordScorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Weight contributed by a single keyword match.
    pub fn keyword_weight(&self, keyword: &str) -> f64 {
        match keyword.trim().chars().count() {
            0..=3 => self.short_weight,
            4..=7 => self.medium_weight,
            _ => self.long_weight,
        }
    }

    /// Score `text` against one keyword list.
    pub fn score(&self, text: &str, keywords: &[String]) -> (f64, Vec<String>) {
        let haystack = text.to_lowercase();
        let mut matched: Vec<String> = Vec::new();

        for keyword in keywords {
            let needle = keyword.trim().to_lowercase();
            if needle.is_empty() || matched.contains(&needle) {
                continue;
            }
            if haystack.contains(&needle) {
                matched.push(needle);
            }
        }

        if matched.is_empty() {
            return (0.0, matched);
        }

        let base: f64 = matched.iter().map(|k| self.keyword_weight(k)).sum();
        let bonus = self.distinct_bonus * (matched.len() - 1) as f64;
        ((base + bonus).min(1.0), matched)
    }

    /// Score every entry, preserving table order.
    pub fn score_table(&self, text: &str, table: &CategoryTable) -> Vec<KeywordScore> {
        table
            .entries()
            .iter()
            .map(|entry| {
                let (score, matched) = self.score(text, &entry.keywords);
                KeywordScore {
                    key: entry.key.clone(),
                    score,
                    matched,
                }
            })
            .collect()
    }

    /// Highest-scoring entry; ties go to the earlier entry.
    pub fn best(&self, text: &str, table: &CategoryTable) -> KeywordScore {
        let mut scores = self.score_table(text, table).into_iter();
        // Tables are non-empty.
        let mut best = scores.next().unwrap_or_else(|| KeywordScore {
            key: table.first().key.clone(),
            score: 0.0,
            matched: Vec::new(),
        });
        for candidate in scores {
            if candidate.score > best.score {
                best = candidate;
            }
        }
        best
    }
}

//! Intent and domain classification.
//!
//! Two strategies share the [`Classifier`] trait:
//! - [`HeuristicClassifier`]: deterministic keyword scoring, never fails.
//! - [`OracleClassifier`]: one oracle call, strict validation of the reply.
//!
//! Neither retries. Callers decide what a failure means.

use std::sync::Arc;

use async_trait::async_trait;
use coordination::{CategoryTable, KeywordScorer};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::PipelineError;
use crate::oracle::{parse_oracle_json, validate_confidence, Oracle};
use crate::prompts;

/// Category chosen for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: String,
    pub confidence: f64,
    pub rationale: String,
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        table: &CategoryTable,
    ) -> Result<Classification, PipelineError>;
}

/// Keyword-scoring classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicClassifier {
    scorer: KeywordScorer,
}

impl HeuristicClassifier {
    pub fn new(scorer: KeywordScorer) -> Self {
        Self { scorer }
    }

    pub fn scorer(&self) -> &KeywordScorer {
        &self.scorer
    }

    /// Synchronous form of [`Classifier::classify`]; always succeeds.
    pub fn classify_now(&self, text: &str, table: &CategoryTable) -> Classification {
        let best = self.scorer.best(text, table);
        Classification {
            rationale: best.explain(),
            category: best.key,
            confidence: best.score,
        }
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(
        &self,
        text: &str,
        table: &CategoryTable,
    ) -> Result<Classification, PipelineError> {
        Ok(self.classify_now(text, table))
    }
}

/// Oracle reply shape. Every field is required.
#[derive(Debug, Deserialize)]
struct ClassificationReply {
    category: String,
    confidence: f64,
    rationale: String,
}

/// Classifier backed by one oracle call per request.
pub struct OracleClassifier {
    oracle: Arc<dyn Oracle>,
}

impl OracleClassifier {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Classifier for OracleClassifier {
    async fn classify(
        &self,
        text: &str,
        table: &CategoryTable,
    ) -> Result<Classification, PipelineError> {
        let prompt = prompts::classification_prompt(text, table);
        let raw = self.oracle.complete(&prompt).await?;
        let classification = parse_classification(&raw, table)?;
        debug!(
            category = %classification.category,
            confidence = classification.confidence,
            "Oracle classification accepted"
        );
        Ok(classification)
    }
}

/// Parse and validate an oracle classification against `table`.
pub fn parse_classification(
    raw: &str,
    table: &CategoryTable,
) -> Result<Classification, PipelineError> {
    let reply: ClassificationReply = parse_oracle_json(raw)?;
    let category = reply.category.trim();
    if !table.contains(category) {
        return Err(PipelineError::contract(format!(
            "unknown category '{category}'"
        )));
    }
    Ok(Classification {
        category: category.to_string(),
        confidence: validate_confidence(reply.confidence)?,
        rationale: reply.rationale,
    })
}

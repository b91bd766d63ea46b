//! Request decomposition.
//!
//! One oracle call splits the request into typed sub-requests. The keyword
//! heuristic runs first and its intent scores go into the prompt as hints.
//! Any oracle or contract failure degrades to a single `KnowledgeQuery`
//! wrapping the whole request, so `decompose` never fails.

use std::collections::HashSet;
use std::sync::Arc;

use coordination::task::{clamp_unit, generate_id};
use coordination::{CategoryTable, DecompositionOutcome, IntentKind, SubRequest};
use serde::Deserialize;
use tracing::{info, warn};

use crate::classifier::HeuristicClassifier;
use crate::errors::PipelineError;
use crate::oracle::{parse_oracle_json, Oracle};
use crate::prompts;

#[derive(Debug, Deserialize)]
struct DecompositionReply {
    rationale: String,
    sub_requests: Vec<RawSubRequest>,
}

#[derive(Debug, Deserialize)]
struct RawSubRequest {
    #[serde(default)]
    id: Option<String>,
    text: String,
    kind: String,
    #[serde(default)]
    priority: Option<i32>,
    confidence: f64,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    domain: Option<String>,
}

pub struct Decomposer {
    oracle: Arc<dyn Oracle>,
    heuristic: HeuristicClassifier,
    intents: CategoryTable,
    domains: Arc<CategoryTable>,
    fallback_confidence: f64,
}

impl Decomposer {
    pub fn new(oracle: Arc<dyn Oracle>, domains: Arc<CategoryTable>) -> Self {
        Self {
            oracle,
            heuristic: HeuristicClassifier::default(),
            intents: CategoryTable::intents(),
            domains,
            fallback_confidence: 0.5,
        }
    }

    pub fn with_fallback_confidence(mut self, confidence: f64) -> Self {
        self.fallback_confidence = clamp_unit(confidence);
        self
    }

    pub async fn decompose(&self, text: &str) -> DecompositionOutcome {
        if text.trim().is_empty() {
            return DecompositionOutcome::empty(text, "empty request, nothing to decompose");
        }

        match self.try_decompose(text).await {
            Ok(outcome) => {
                info!(
                    sub_requests = outcome.sub_requests.len(),
                    is_composite = outcome.is_composite,
                    "Request decomposed"
                );
                outcome
            }
            Err(e) => {
                warn!(error = %e, "Decomposition failed, treating request as one knowledge query");
                self.fallback(text, &e)
            }
        }
    }

    async fn try_decompose(&self, text: &str) -> Result<DecompositionOutcome, PipelineError> {
        let hints = self.heuristic.scorer().score_table(text, &self.intents);
        let prompt = prompts::decomposition_prompt(text, &hints, &self.domains);
        let raw = self.oracle.complete(&prompt).await?;
        parse_decomposition(text, &raw)
    }

    fn fallback(&self, text: &str, cause: &PipelineError) -> DecompositionOutcome {
        let request = SubRequest::new(text, IntentKind::KnowledgeQuery)
            .with_confidence(self.fallback_confidence)
            .with_rationale("decomposition unavailable, whole request routed as knowledge query");
        DecompositionOutcome::new(
            text,
            vec![request],
            format!("fallback to single knowledge query: {cause}"),
        )
    }
}

/// Parse and normalize an oracle decomposition.
///
/// Ids are made unique, confidences clamped, missing priorities set to the
/// emission position, and the list stable-sorted by priority.
pub fn parse_decomposition(
    original_text: &str,
    raw: &str,
) -> Result<DecompositionOutcome, PipelineError> {
    let reply: DecompositionReply = parse_oracle_json(raw)?;
    if reply.sub_requests.is_empty() {
        return Err(PipelineError::contract("sub_requests is empty"));
    }

    let mut seen = HashSet::new();
    let mut requests = Vec::with_capacity(reply.sub_requests.len());
    for (idx, item) in reply.sub_requests.into_iter().enumerate() {
        let text = item.text.trim();
        if text.is_empty() {
            return Err(PipelineError::contract(format!(
                "sub_requests[{idx}] has empty text"
            )));
        }
        let kind = IntentKind::from_key(&item.kind).ok_or_else(|| {
            PipelineError::contract(format!(
                "sub_requests[{idx}] has unknown kind '{}'",
                item.kind
            ))
        })?;

        let id = match item.id.map(|id| id.trim().to_string()) {
            Some(id) if !id.is_empty() && !seen.contains(&id) => id,
            _ => generate_id(),
        };
        seen.insert(id.clone());

        let mut request = SubRequest::new(text, kind)
            .with_id(id)
            .with_priority(item.priority.unwrap_or(idx as i32 + 1))
            .with_confidence(item.confidence)
            .with_rationale(item.rationale.unwrap_or_default());
        if let Some(domain) = item.domain.map(|d| d.trim().to_string()) {
            if !domain.is_empty() {
                request = request.with_domain_hint(domain);
            }
        }
        requests.push(request);
    }

    requests.sort_by_key(|r| r.priority);
    Ok(DecompositionOutcome::new(
        original_text,
        requests,
        reply.rationale,
    ))
}

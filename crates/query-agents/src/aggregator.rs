//! Merge sub-results into one answer.
//!
//! Zero and one result never reach the oracle. Several results go through
//! one synthesis call; if that fails the outputs are joined deterministically.

use std::sync::Arc;

use coordination::{AggregationOutcome, ExecutionSummary, SubResult};
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::PipelineError;
use crate::oracle::{parse_oracle_json, Oracle};
use crate::prompts;

pub const NO_SUB_QUERIES_MESSAGE: &str = "No sub-queries were produced for this request.";
pub const ALL_FAILED_MESSAGE: &str = "All sub-queries failed; no answer could be produced.";

#[derive(Debug, Deserialize)]
struct SynthesisReply {
    final_text: String,
    rationale: String,
}

pub struct Aggregator {
    oracle: Arc<dyn Oracle>,
}

impl Aggregator {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    pub async fn aggregate(&self, original_text: &str, results: &[SubResult]) -> AggregationOutcome {
        let summary = ExecutionSummary::from_results(results);

        match results {
            [] => AggregationOutcome {
                final_text: NO_SUB_QUERIES_MESSAGE.to_string(),
                rationale: "no sub-queries to aggregate".to_string(),
                summary,
                used_fallback: false,
            },
            [only] => AggregationOutcome {
                final_text: render_single(only),
                rationale: "single result, no synthesis needed".to_string(),
                summary,
                used_fallback: false,
            },
            _ => match self.synthesize(original_text, results).await {
                Ok(reply) => {
                    info!(results = results.len(), "Synthesized final answer");
                    AggregationOutcome {
                        final_text: reply.final_text,
                        rationale: reply.rationale,
                        summary,
                        used_fallback: false,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Synthesis failed, joining sub-results");
                    AggregationOutcome {
                        final_text: fallback_join(results),
                        rationale: format!("deterministic fallback join used: {e}"),
                        summary,
                        used_fallback: true,
                    }
                }
            },
        }
    }

    async fn synthesize(
        &self,
        original_text: &str,
        results: &[SubResult],
    ) -> Result<SynthesisReply, PipelineError> {
        let prompt = prompts::aggregation_prompt(original_text, results);
        let raw = self.oracle.complete(&prompt).await?;
        let reply: SynthesisReply = parse_oracle_json(&raw)?;
        if reply.final_text.trim().is_empty() {
            return Err(PipelineError::contract("final_text is empty"));
        }
        Ok(reply)
    }
}

fn render_single(result: &SubResult) -> String {
    if result.succeeded {
        result.output.clone()
    } else {
        format!(
            "Could not answer \"{}\": {}",
            result.text,
            failure_reason(result)
        )
    }
}

fn failure_reason(result: &SubResult) -> &str {
    result.failure_reason.as_deref().unwrap_or("unknown failure")
}

/// Successful outputs separated by blank lines, then one failure line.
pub fn fallback_join(results: &[SubResult]) -> String {
    let outputs: Vec<&str> = results
        .iter()
        .filter(|r| r.succeeded)
        .map(|r| r.output.as_str())
        .collect();
    if outputs.is_empty() {
        return ALL_FAILED_MESSAGE.to_string();
    }

    let mut text = outputs.join("\n\n");
    let failures: Vec<&str> = results
        .iter()
        .filter(|r| !r.succeeded)
        .map(failure_reason)
        .collect();
    if !failures.is_empty() {
        text.push_str(&format!(
            "\n\n{} of {} sub-queries failed: {}",
            failures.len(),
            results.len(),
            failures.join("; ")
        ));
    }
    text
}

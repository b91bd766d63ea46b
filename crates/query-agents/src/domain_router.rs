//! Knowledge-domain routing for `KnowledgeQuery` sub-requests.
//!
//! Selection ladder, first rung that answers wins:
//!
//! | Rung      | Condition                                | Confidence          |
//! |-----------|------------------------------------------|---------------------|
//! | Hint      | `domain_hint` names a registered domain  | `hint_confidence`   |
//! | Heuristic | best keyword score > threshold           | `min(score, cap)`   |
//! | Oracle    | oracle classifier succeeds               | as returned         |
//! | Default   | oracle failed                            | `default_confidence`|
//!
//! Retrieval errors never propagate: they are rendered into the output text.

use std::sync::Arc;

use coordination::{CategoryTable, SubRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, HeuristicClassifier};
use crate::config::RouterConfig;
use crate::services::KnowledgeService;

/// Which rung of the ladder chose the domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSource {
    Hint,
    Heuristic,
    Oracle,
    Default,
}

impl std::fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hint => write!(f, "hint"),
            Self::Heuristic => write!(f, "heuristic"),
            Self::Oracle => write!(f, "oracle"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainSelection {
    pub domain: String,
    pub confidence: f64,
    pub rationale: String,
    pub source: SelectionSource,
}

/// Result of routing and querying one knowledge sub-request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOutcome {
    /// Answer text, or a formatted retrieval failure.
    pub output: String,
    pub domain: String,
    pub rationale: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_error: Option<String>,
}

pub struct DomainRouter {
    domains: Arc<CategoryTable>,
    heuristic: HeuristicClassifier,
    oracle_classifier: Arc<dyn Classifier>,
    knowledge: Arc<dyn KnowledgeService>,
    config: RouterConfig,
}

impl DomainRouter {
    pub fn new(
        domains: Arc<CategoryTable>,
        oracle_classifier: Arc<dyn Classifier>,
        knowledge: Arc<dyn KnowledgeService>,
        config: RouterConfig,
    ) -> Self {
        Self {
            domains,
            heuristic: HeuristicClassifier::default(),
            oracle_classifier,
            knowledge,
            config,
        }
    }

    /// Pick the domain for `request`. Always returns a registered domain
    /// unless the configured default itself is unregistered.
    pub async fn select_domain(&self, request: &SubRequest) -> DomainSelection {
        if let Some(hint) = request.domain_hint.as_deref().map(str::trim) {
            if self.domains.contains(hint) {
                return DomainSelection {
                    domain: hint.to_string(),
                    confidence: self.config.hint_confidence,
                    rationale: "hint accepted".to_string(),
                    source: SelectionSource::Hint,
                };
            }
            debug!(sub_request_id = %request.id, hint, "Ignoring unregistered domain hint");
        }

        let best = self.heuristic.scorer().best(&request.text, &self.domains);
        if best.score > self.config.heuristic_threshold {
            return DomainSelection {
                confidence: best.score.min(self.config.heuristic_confidence_cap),
                rationale: format!(
                    "keyword heuristic: {} (threshold {:.2})",
                    best.explain(),
                    self.config.heuristic_threshold
                ),
                domain: best.key,
                source: SelectionSource::Heuristic,
            };
        }

        match self
            .oracle_classifier
            .classify(&request.text, &self.domains)
            .await
        {
            Ok(c) => DomainSelection {
                domain: c.category,
                confidence: c.confidence,
                rationale: c.rationale,
                source: SelectionSource::Oracle,
            },
            Err(e) => {
                warn!(
                    sub_request_id = %request.id,
                    error = %e,
                    default_domain = %self.config.default_domain,
                    "Domain classification failed, using default domain"
                );
                DomainSelection {
                    domain: self.config.default_domain.clone(),
                    confidence: self.config.default_confidence,
                    rationale: format!("domain classification failed ({e}); using default domain"),
                    source: SelectionSource::Default,
                }
            }
        }
    }

    /// Select a domain and query it.
    pub async fn route(&self, request: &SubRequest) -> RouteOutcome {
        let selection = self.select_domain(request).await;
        info!(
            sub_request_id = %request.id,
            domain = %selection.domain,
            source = %selection.source,
            confidence = selection.confidence,
            "Routed knowledge query"
        );

        match self.knowledge.query(&request.text, &selection.domain).await {
            Ok(answer) => RouteOutcome {
                output: answer,
                domain: selection.domain,
                rationale: selection.rationale,
                confidence: selection.confidence,
                retrieval_error: None,
            },
            Err(e) => {
                warn!(
                    sub_request_id = %request.id,
                    domain = %selection.domain,
                    error = %e,
                    "Knowledge retrieval failed"
                );
                RouteOutcome {
                    output: format!(
                        "Knowledge retrieval from domain '{}' failed: {}",
                        selection.domain, e
                    ),
                    domain: selection.domain,
                    rationale: selection.rationale,
                    confidence: selection.confidence,
                    retrieval_error: Some(e.to_string()),
                }
            }
        }
    }
}

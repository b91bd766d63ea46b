//! Sub-task data model shared by every pipeline stage.
//!
//! A request flows through three immutable records:
//!
//! ```text
//! original text ──decompose──▶ DecompositionOutcome { SubRequest* }
//!                ──execute───▶ SubResult*            (same order as SubRequest*)
//!                ──aggregate─▶ AggregationOutcome    { final_text, ExecutionSummary }
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Closed set of intents a sub-request can carry.
///
/// Adding a variant requires a matching handler in the executor registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Question answered from a knowledge domain.
    KnowledgeQuery,
    /// Two-operand arithmetic.
    Calculation,
    /// Current weather for a city.
    WeatherLookup,
}

impl IntentKind {
    /// Every variant, in the order used for prompts and tie-breaking.
    pub const ALL: [IntentKind; 3] = [
        IntentKind::KnowledgeQuery,
        IntentKind::Calculation,
        IntentKind::WeatherLookup,
    ];

    /// Stable wire key (matches the serde representation).
    pub fn key(self) -> &'static str {
        match self {
            Self::KnowledgeQuery => "knowledge_query",
            Self::Calculation => "calculation",
            Self::WeatherLookup => "weather_lookup",
        }
    }

    /// Parse a wire key. Unknown keys are rejected rather than coerced.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.key() == key.trim())
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::KnowledgeQuery => {
                "A factual or domain question answered from the knowledge base"
            }
            Self::Calculation => "An arithmetic request over two numbers (addition or multiplication)",
            Self::WeatherLookup => "A request for the current weather in a city",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// One atomic unit of work extracted from the original request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubRequest {
    pub id: String,
    /// Self-contained payload for this unit.
    pub text: String,
    pub kind: IntentKind,
    /// Lower sorts first. Presentation only, never a scheduling constraint.
    pub priority: i32,
    /// Confidence in `kind`, always within [0, 1].
    pub confidence: f64,
    pub rationale: String,
    /// Knowledge domain suggested upstream, validated by the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain_hint: Option<String>,
}

impl SubRequest {
    /// Create a sub-request with a freshly generated id.
    pub fn new(text: impl Into<String>, kind: IntentKind) -> Self {
        Self {
            id: generate_id(),
            text: text.into(),
            kind,
            priority: 1,
            confidence: 1.0,
            rationale: String::new(),
            domain_hint: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set confidence, clamped into [0, 1]. NaN becomes 0.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = clamp_unit(confidence);
        self
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_domain_hint(mut self, domain: impl Into<String>) -> Self {
        self.domain_hint = Some(domain.into());
        self
    }
}

/// Generate an opaque unique sub-request id.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Clamp a confidence value into [0, 1], mapping NaN to 0.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Outcome of executing one [`SubRequest`].
///
/// `failure_reason` is present iff `succeeded` is false; the constructors
/// are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubResult {
    pub id: String,
    pub kind: IntentKind,
    pub text: String,
    pub output: String,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub duration_millis: u64,
    /// Knowledge domain that served this result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl SubResult {
    pub fn success(request: &SubRequest, output: impl Into<String>, duration_millis: u64) -> Self {
        Self {
            id: request.id.clone(),
            kind: request.kind,
            text: request.text.clone(),
            output: output.into(),
            succeeded: true,
            failure_reason: None,
            duration_millis,
            domain: None,
        }
    }

    pub fn failure(request: &SubRequest, reason: impl Into<String>, duration_millis: u64) -> Self {
        Self {
            id: request.id.clone(),
            kind: request.kind,
            text: request.text.clone(),
            output: String::new(),
            succeeded: false,
            failure_reason: Some(reason.into()),
            duration_millis,
            domain: None,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

/// Result of splitting one request into sub-requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionOutcome {
    pub original_text: String,
    pub sub_requests: Vec<SubRequest>,
    /// True iff more than one sub-request was produced.
    pub is_composite: bool,
    pub rationale: String,
}

impl DecompositionOutcome {
    /// Build an outcome, deriving `is_composite` from the sub-request count.
    pub fn new(
        original_text: impl Into<String>,
        sub_requests: Vec<SubRequest>,
        rationale: impl Into<String>,
    ) -> Self {
        let is_composite = sub_requests.len() > 1;
        Self {
            original_text: original_text.into(),
            sub_requests,
            is_composite,
            rationale: rationale.into(),
        }
    }

    /// An outcome with no sub-requests, used only by the degraded path.
    pub fn empty(original_text: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self::new(original_text, Vec::new(), rationale)
    }

    /// Mean confidence across sub-requests (0 when there are none).
    pub fn mean_confidence(&self) -> f64 {
        if self.sub_requests.is_empty() {
            return 0.0;
        }
        self.sub_requests.iter().map(|r| r.confidence).sum::<f64>()
            / self.sub_requests.len() as f64
    }
}

/// Counts and timing across a set of sub-results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_duration_millis: u64,
}

impl ExecutionSummary {
    /// Pure reduction over the results. `succeeded + failed == total` always.
    pub fn from_results(results: &[SubResult]) -> Self {
        results.iter().fold(Self::default(), |mut acc, r| {
            acc.total += 1;
            if r.succeeded {
                acc.succeeded += 1;
            } else {
                acc.failed += 1;
            }
            acc.total_duration_millis = acc.total_duration_millis.saturating_add(r.duration_millis);
            acc
        })
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Final merged answer for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationOutcome {
    pub final_text: String,
    pub rationale: String,
    pub summary: ExecutionSummary,
    /// Whether the deterministic join replaced oracle synthesis.
    #[serde(default)]
    pub used_fallback: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(succeeded: bool, ms: u64) -> SubResult {
        let req = SubRequest::new("q", IntentKind::KnowledgeQuery);
        if succeeded {
            SubResult::success(&req, "ok", ms)
        } else {
            SubResult::failure(&req, "RetrievalFailed: down", ms)
        }
    }

    #[test]
    fn test_intent_kind_keys_roundtrip() {
        for kind in IntentKind::ALL {
            assert_eq!(IntentKind::from_key(kind.key()), Some(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.key()));
        }
        assert_eq!(IntentKind::from_key("translation"), None);
    }

    #[test]
    fn test_confidence_clamping() {
        let req = SubRequest::new("x", IntentKind::Calculation).with_confidence(1.7);
        assert_eq!(req.confidence, 1.0);
        let req = req.with_confidence(-0.2);
        assert_eq!(req.confidence, 0.0);
        let req = req.with_confidence(f64::NAN);
        assert_eq!(req.confidence, 0.0);
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = SubRequest::new("x", IntentKind::Calculation);
        let b = SubRequest::new("x", IntentKind::Calculation);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_failure_reason_iff_not_succeeded() {
        let ok = result(true, 5);
        assert!(ok.succeeded && ok.failure_reason.is_none());
        let bad = result(false, 5);
        assert!(!bad.succeeded && bad.failure_reason.is_some());
        assert!(bad.output.is_empty());
    }

    #[test]
    fn test_summary_invariant() {
        let results = vec![result(true, 10), result(false, 7), result(true, 3), result(false, 0)];
        let summary = ExecutionSummary::from_results(&results);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.succeeded + summary.failed, summary.total);
        assert_eq!(summary.total_duration_millis, 20);
        assert!(!summary.all_succeeded());
    }

    #[test]
    fn test_summary_of_empty_set() {
        let summary = ExecutionSummary::from_results(&[]);
        assert_eq!(summary, ExecutionSummary::default());
        assert!(summary.all_succeeded());
    }

    #[test]
    fn test_decomposition_composite_flag_and_mean() {
        let single = DecompositionOutcome::new(
            "a",
            vec![SubRequest::new("a", IntentKind::Calculation).with_confidence(0.8)],
            "one",
        );
        assert!(!single.is_composite);

        let multi = DecompositionOutcome::new(
            "a and b",
            vec![
                SubRequest::new("a", IntentKind::Calculation).with_confidence(0.8),
                SubRequest::new("b", IntentKind::WeatherLookup).with_confidence(0.4),
            ],
            "two",
        );
        assert!(multi.is_composite);
        assert!((multi.mean_confidence() - 0.6).abs() < 1e-9);

        assert_eq!(DecompositionOutcome::empty("x", "none").mean_confidence(), 0.0);
    }
}

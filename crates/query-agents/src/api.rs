//! Public request/response shapes (camelCase JSON).

use coordination::{DecompositionOutcome, ExecutionSummary, SubResult};
use serde::{Deserialize, Serialize};

use crate::orchestrator::{Orchestrator, QueryResponse};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    MultiIntent,
    SingleIntent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    pub query_type: QueryType,
    /// Mean sub-request confidence, 0 when there are none.
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiExecutionSummary {
    pub total_sub_queries: usize,
    pub successful_queries: usize,
    pub failed_queries: usize,
    /// Sum of sub-task durations in milliseconds.
    pub total_execution_time: u64,
}

impl From<ExecutionSummary> for ApiExecutionSummary {
    fn from(s: ExecutionSummary) -> Self {
        Self {
            total_sub_queries: s.total,
            successful_queries: s.succeeded,
            failed_queries: s.failed,
            total_execution_time: s.total_duration_millis,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub response: String,
    pub analysis: Analysis,
    pub decomposition: DecompositionOutcome,
    pub sub_results: Vec<SubResult>,
    pub execution_summary: ApiExecutionSummary,
}

impl From<&QueryResponse> for ApiResponse {
    fn from(r: &QueryResponse) -> Self {
        let query_type = if r.decomposition.is_composite {
            QueryType::MultiIntent
        } else {
            QueryType::SingleIntent
        };
        Self {
            response: r.final_text.clone(),
            analysis: Analysis {
                query_type,
                confidence: r.decomposition.mean_confidence(),
                reasoning: r.decomposition.rationale.clone(),
            },
            decomposition: r.decomposition.clone(),
            sub_results: r.sub_results.clone(),
            execution_summary: r.summary.into(),
        }
    }
}

/// Run one request end to end and shape the answer for callers.
pub async fn handle_query(orchestrator: &Orchestrator, request: &QueryRequest) -> ApiResponse {
    let response = orchestrator.process_query(&request.query).await;
    ApiResponse::from(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordination::{AggregationOutcome, IntentKind, SubRequest};

    fn response(requests: Vec<SubRequest>) -> QueryResponse {
        let results: Vec<SubResult> = requests
            .iter()
            .map(|r| SubResult::success(r, "out", 7))
            .collect();
        let summary = ExecutionSummary::from_results(&results);
        QueryResponse {
            text: "q".into(),
            final_text: "answer".into(),
            decomposition: DecompositionOutcome::new("q", requests, "split"),
            sub_results: results,
            aggregation: AggregationOutcome {
                final_text: "answer".into(),
                rationale: "r".into(),
                summary,
                used_fallback: false,
            },
            summary,
            transitions: Vec::new(),
            degraded: false,
        }
    }

    #[test]
    fn composite_response_is_multi_intent() {
        let r = response(vec![
            SubRequest::new("a", IntentKind::Calculation).with_confidence(0.9),
            SubRequest::new("b", IntentKind::WeatherLookup).with_confidence(0.7),
        ]);
        let api = ApiResponse::from(&r);
        assert_eq!(api.analysis.query_type, QueryType::MultiIntent);
        assert!((api.analysis.confidence - 0.8).abs() < 1e-9);
        assert_eq!(api.execution_summary.total_sub_queries, 2);
        assert_eq!(api.execution_summary.total_execution_time, 14);
    }

    #[test]
    fn json_uses_camel_case() {
        let r = response(vec![SubRequest::new("a", IntentKind::Calculation)]);
        let json = serde_json::to_value(ApiResponse::from(&r)).unwrap();
        assert_eq!(json["analysis"]["queryType"], "single_intent");
        assert_eq!(json["executionSummary"]["successfulQueries"], 1);
        assert!(json.get("subResults").is_some());
        assert_eq!(json["response"], "answer");
    }

    #[test]
    fn empty_decomposition_has_zero_confidence() {
        let api = ApiResponse::from(&response(Vec::new()));
        assert_eq!(api.analysis.confidence, 0.0);
        assert_eq!(api.analysis.query_type, QueryType::SingleIntent);
    }

    #[test]
    fn request_deserializes() {
        let req: QueryRequest = serde_json::from_str(r#"{"query": "12 * 8"}"#).unwrap();
        assert_eq!(req.query, "12 * 8");
    }
}

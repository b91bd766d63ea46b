//! End-to-end pipeline tests with scripted collaborators.
//!
//! The oracle, knowledge service and weather service are hand-written mocks
//! that record every call, so each test can assert both the answer and how
//! many oracle round-trips it took.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use coordination::{IntentKind, LookupError, WeatherReport};
use query_agents::config::OrchestratorConfig;
use query_agents::oracle::{Oracle, OracleError};
use query_agents::services::{KnowledgeService, WeatherService};
use query_agents::state_machine::RequestStage;
use query_agents::{Orchestrator, PipelineError};

const PPI_QUERY: &str =
    "What is the PPI this month? Also compute 123*456, and what's the weather in Beijing?";

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
    Panic,
}

impl Reply {
    fn text(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Oracle that answers by prompt kind and records every prompt.
struct ScriptedOracle {
    decompose: Reply,
    classify: Reply,
    aggregate: Reply,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedOracle {
    fn new(decompose: Reply, classify: Reply, aggregate: Reply) -> Arc<Self> {
        Arc::new(Self {
            decompose,
            classify,
            aggregate,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn always_failing() -> Arc<Self> {
        Self::new(Reply::Fail, Reply::Fail, Reply::Fail)
    }

    fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let reply = if prompt.starts_with("Decide whether") {
            &self.decompose
        } else if prompt.starts_with("Classify") {
            &self.classify
        } else {
            &self.aggregate
        };
        match reply {
            Reply::Text(t) => Ok(t.clone()),
            Reply::Fail => Err(OracleError::RequestFailed("connection refused".into())),
            Reply::Panic => panic!("oracle crashed"),
        }
    }
}

/// Knowledge service that records `(text, domain)` pairs.
struct RecordingKnowledge {
    answer: String,
    panic: bool,
    calls: Mutex<Vec<(String, String)>>,
}

impl RecordingKnowledge {
    fn answering(answer: &str) -> Arc<Self> {
        Arc::new(Self {
            answer: answer.to_string(),
            panic: false,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn panicking() -> Arc<Self> {
        Arc::new(Self {
            answer: String::new(),
            panic: true,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl KnowledgeService for RecordingKnowledge {
    async fn query(&self, text: &str, domain: &str) -> Result<String, PipelineError> {
        self.calls
            .lock()
            .unwrap()
            .push((text.to_string(), domain.to_string()));
        if self.panic {
            panic!("vector index crashed");
        }
        Ok(self.answer.clone())
    }
}

/// Weather service that knows a single city.
struct OneCityWeather {
    city: String,
    lookups: Mutex<Vec<String>>,
}

impl OneCityWeather {
    fn beijing() -> Arc<Self> {
        Arc::new(Self {
            city: "Beijing".into(),
            lookups: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl WeatherService for OneCityWeather {
    async fn lookup(&self, city: &str) -> Result<WeatherReport, LookupError> {
        self.lookups.lock().unwrap().push(city.to_string());
        if city != self.city {
            return Err(LookupError::UnknownCity(city.to_string()));
        }
        Ok(WeatherReport {
            temperature_c: 18.0,
            condition_text: "Light rain".into(),
            humidity_pct: 80.0,
            wind_kph: 12.0,
            feels_like_c: 16.0,
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("query_agents=debug")
        .try_init();
}

fn test_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.router.default_domain = "general".into();
    config.fallback_city = "Beijing".into();
    config
}

fn orchestrator(
    oracle: Arc<ScriptedOracle>,
    knowledge: Arc<RecordingKnowledge>,
    weather: Arc<OneCityWeather>,
) -> Orchestrator {
    Orchestrator::from_components(&test_config(), oracle, knowledge, weather)
}

fn three_way_decomposition() -> Reply {
    Reply::text(
        r#"{"rationale": "knowledge, arithmetic and weather intents", "sub_requests": [
            {"id": "ppi", "text": "What is the PPI this month?", "kind": "knowledge_query", "priority": 1, "confidence": 0.9, "domain": "economy"},
            {"id": "calc", "text": "compute 123*456", "kind": "calculation", "priority": 2, "confidence": 0.95},
            {"id": "wx", "text": "what's the weather in Beijing?", "kind": "weather_lookup", "priority": 3, "confidence": 0.9}
        ]}"#,
    )
}

#[tokio::test]
async fn test_composite_query_fallback_join() {
    init_tracing();
    let oracle = ScriptedOracle::new(three_way_decomposition(), Reply::Fail, Reply::Fail);
    let knowledge = RecordingKnowledge::answering("PPI: N/A");
    let weather = OneCityWeather::beijing();
    let orch = orchestrator(oracle.clone(), knowledge.clone(), weather.clone());

    let response = orch.process_query(PPI_QUERY).await;

    assert!(!response.degraded);
    assert!(response.decomposition.is_composite);
    let kinds: Vec<_> = response.decomposition.sub_requests.iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            IntentKind::KnowledgeQuery,
            IntentKind::Calculation,
            IntentKind::WeatherLookup
        ]
    );

    let outputs: Vec<_> = response.sub_results.iter().map(|r| r.output.as_str()).collect();
    assert_eq!(outputs[0], "PPI: N/A");
    assert_eq!(outputs[1], "123 × 456 = 56088");
    assert!(outputs[2].starts_with("Beijing: 18°C, light rain"));

    assert!(response.aggregation.used_fallback);
    let joined = &response.final_text;
    assert!(joined.starts_with("PPI: N/A\n\n123 × 456 = 56088\n\nBeijing: 18°C, light rain"));

    // Hint accepted: knowledge queried in the hinted domain.
    assert_eq!(
        knowledge.calls.lock().unwrap().as_slice(),
        &[("What is the PPI this month?".to_string(), "economy".to_string())]
    );
    assert_eq!(response.sub_results[0].domain.as_deref(), Some("economy"));
    assert_eq!(weather.lookups.lock().unwrap().as_slice(), &["Beijing".to_string()]);

    // Decomposition + synthesis, no classification (hint won).
    assert_eq!(oracle.call_count(), 2);

    assert_eq!(response.summary.total, 3);
    assert_eq!(response.summary.succeeded, 3);
    let stages: Vec<_> = response.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        stages,
        vec![
            RequestStage::Decomposing,
            RequestStage::Executing,
            RequestStage::Aggregating,
            RequestStage::Completed
        ]
    );
}

#[tokio::test]
async fn test_synthesized_answer_is_used() {
    let oracle = ScriptedOracle::new(
        three_way_decomposition(),
        Reply::Fail,
        Reply::text(r#"{"final_text": "PPI is not available; 123 × 456 = 56088; light rain in Beijing.", "rationale": "merged in order"}"#),
    );
    let orch = orchestrator(oracle, RecordingKnowledge::answering("PPI: N/A"), OneCityWeather::beijing());
    let response = orch.process_query(PPI_QUERY).await;
    assert!(!response.aggregation.used_fallback);
    assert_eq!(
        response.final_text,
        "PPI is not available; 123 × 456 = 56088; light rain in Beijing."
    );
}

#[tokio::test]
async fn test_single_calculation_needs_one_oracle_call() {
    let oracle = ScriptedOracle::new(
        Reply::text(r#"{"rationale": "arithmetic only", "sub_requests": [{"text": "12 * 8", "kind": "calculation", "confidence": 0.97}]}"#),
        Reply::Fail,
        Reply::Panic,
    );
    let orch = orchestrator(oracle.clone(), RecordingKnowledge::answering("unused"), OneCityWeather::beijing());

    let response = orch.process_query("12 * 8").await;

    assert!(!response.decomposition.is_composite);
    assert_eq!(response.decomposition.sub_requests[0].kind, IntentKind::Calculation);
    assert_eq!(response.final_text, "12 × 8 = 96");
    assert_eq!(oracle.call_count(), 1);
}

#[tokio::test]
async fn test_unbounded_task_timeout_does_not_break_execution() {
    let oracle = ScriptedOracle::new(
        Reply::text(r#"{"rationale": "arithmetic only", "sub_requests": [{"text": "12 * 8", "kind": "calculation", "confidence": 0.97}]}"#),
        Reply::Fail,
        Reply::Fail,
    );
    let mut config = test_config();
    config.task_timeout = Duration::MAX;
    let orch = Orchestrator::from_components(
        &config,
        oracle,
        RecordingKnowledge::answering("unused"),
        OneCityWeather::beijing(),
    );

    let response = orch.process_query("12 * 8").await;

    assert!(!response.degraded);
    assert_eq!(response.sub_results.len(), 1);
    assert!(response.sub_results[0].succeeded);
    assert_eq!(response.final_text, "12 × 8 = 96");
}

#[tokio::test]
async fn test_missing_operands_reported() {
    let oracle = ScriptedOracle::new(
        Reply::text(r#"{"rationale": "arithmetic", "sub_requests": [{"text": "please compute", "kind": "calculation", "confidence": 0.6}]}"#),
        Reply::Fail,
        Reply::Fail,
    );
    let orch = orchestrator(oracle, RecordingKnowledge::answering("unused"), OneCityWeather::beijing());

    let response = orch.process_query("please compute").await;

    let result = &response.sub_results[0];
    assert!(!result.succeeded);
    assert_eq!(
        result.failure_reason.as_deref(),
        Some("InsufficientOperands: expected two numeric operands, found 0")
    );
    assert!(response.final_text.contains("InsufficientOperands"));
    assert_eq!(response.summary.failed, 1);
}

#[tokio::test]
async fn test_always_failing_oracle_degrades_gracefully() {
    let oracle = ScriptedOracle::always_failing();
    let knowledge = RecordingKnowledge::answering("PPI: N/A");
    let orch = orchestrator(oracle, knowledge.clone(), OneCityWeather::beijing());

    let response = orch.process_query(PPI_QUERY).await;

    assert!(!response.degraded);
    assert!(!response.decomposition.is_composite);
    assert_eq!(response.decomposition.sub_requests.len(), 1);
    let only = &response.decomposition.sub_requests[0];
    assert_eq!(only.kind, IntentKind::KnowledgeQuery);
    assert_eq!(only.text, PPI_QUERY);
    assert_eq!(only.confidence, 0.5);

    // Classification failed too, so the default domain answered.
    let calls = knowledge.calls.lock().unwrap().clone();
    assert_eq!(calls, vec![(PPI_QUERY.to_string(), "general".to_string())]);
    assert_eq!(response.final_text, "PPI: N/A");
}

#[tokio::test]
async fn test_unknown_city_fails_only_its_sub_task() {
    let oracle = ScriptedOracle::new(
        Reply::text(r#"{"rationale": "two intents", "sub_requests": [
            {"text": "2 plus 3", "kind": "calculation", "confidence": 0.9},
            {"text": "weather in Atlantis", "kind": "weather_lookup", "confidence": 0.9}
        ]}"#),
        Reply::Fail,
        Reply::Fail,
    );
    let orch = orchestrator(oracle, RecordingKnowledge::answering("unused"), OneCityWeather::beijing());

    let response = orch.process_query("2 plus 3, and the weather in Atlantis").await;

    assert_eq!(response.summary.succeeded, 1);
    assert_eq!(response.summary.failed, 1);
    assert_eq!(response.sub_results[0].output, "2 + 3 = 5");
    assert!(response.sub_results[1]
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.starts_with("LookupFailed")));
    assert!(response.final_text.starts_with("2 + 3 = 5\n\n1 of 2 sub-queries failed: LookupFailed"));
}

#[tokio::test]
async fn test_panic_in_decomposition_yields_degraded_response() {
    let oracle = ScriptedOracle::new(Reply::Panic, Reply::Fail, Reply::Fail);
    let orch = orchestrator(oracle, RecordingKnowledge::answering("unused"), OneCityWeather::beijing());

    let response = orch.process_query(PPI_QUERY).await;

    assert!(response.degraded);
    assert!(!response.final_text.is_empty());
    assert!(response.final_text.contains("InternalOrchestrationFailure"));
    assert!(response.decomposition.sub_requests.is_empty());
    assert!(response.sub_results.is_empty());
    assert_eq!(response.summary.total, 0);
    let last = response.transitions.last().unwrap();
    assert_eq!(last.from, RequestStage::Decomposing);
    assert_eq!(last.to, RequestStage::Completed);
}

#[tokio::test]
async fn test_panic_in_aggregation_yields_degraded_response() {
    let oracle = ScriptedOracle::new(three_way_decomposition(), Reply::Fail, Reply::Panic);
    let orch = orchestrator(oracle, RecordingKnowledge::answering("PPI: N/A"), OneCityWeather::beijing());

    let response = orch.process_query(PPI_QUERY).await;

    assert!(response.degraded);
    assert!(response.final_text.contains("aggregation stage failed"));
    assert_eq!(
        response.transitions.last().map(|t| t.from),
        Some(RequestStage::Aggregating)
    );
}

#[tokio::test]
async fn test_panic_in_handler_is_isolated() {
    let oracle = ScriptedOracle::new(three_way_decomposition(), Reply::Fail, Reply::Fail);
    let orch = orchestrator(oracle, RecordingKnowledge::panicking(), OneCityWeather::beijing());

    let response = orch.process_query(PPI_QUERY).await;

    assert!(!response.degraded);
    assert_eq!(response.summary.failed, 1);
    assert!(response.sub_results[0]
        .failure_reason
        .as_deref()
        .is_some_and(|r| r.contains("vector index crashed")));
    assert!(response.sub_results[1].succeeded);
    assert!(response.sub_results[2].succeeded);
    assert!(!response.final_text.is_empty());
}

#[tokio::test]
async fn test_blank_query_produces_fixed_message() {
    let oracle = ScriptedOracle::always_failing();
    let orch = orchestrator(oracle.clone(), RecordingKnowledge::answering("unused"), OneCityWeather::beijing());

    let response = orch.process_query("   ").await;

    assert_eq!(response.final_text, query_agents::aggregator::NO_SUB_QUERIES_MESSAGE);
    assert_eq!(oracle.call_count(), 0);
}

//! Orchestration: decompose → execute → aggregate for one request.
//!
//! Each stage runs in its own spawned task so a panic anywhere in the
//! pipeline surfaces as a `JoinError` here instead of unwinding into the
//! caller. `process_query` always returns a well-formed [`QueryResponse`].

use std::sync::Arc;

use anyhow::{Context as _, Result};
use coordination::{AggregationOutcome, DecompositionOutcome, ExecutionSummary, SubResult};
use serde::{Deserialize, Serialize};
use tokio::task::JoinError;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::classifier::OracleClassifier;
use crate::config::OrchestratorConfig;
use crate::decomposer::Decomposer;
use crate::domain_router::DomainRouter;
use crate::errors::PipelineError;
use crate::executor::{join_error_message, Executor};
use crate::handlers::HandlerRegistry;
use crate::oracle::{OpenAiOracle, Oracle, RetryingOracle};
use crate::services::{HttpKnowledgeService, HttpWeatherService, KnowledgeService, WeatherService};
use crate::state_machine::{RequestStage, RequestStateMachine, TransitionRecord};

/// Everything produced while answering one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub text: String,
    pub final_text: String,
    pub decomposition: DecompositionOutcome,
    pub sub_results: Vec<SubResult>,
    pub aggregation: AggregationOutcome,
    pub summary: ExecutionSummary,
    pub transitions: Vec<TransitionRecord>,
    /// Set when a stage crashed and the pipeline was cut short.
    #[serde(default)]
    pub degraded: bool,
}

pub struct Orchestrator {
    decomposer: Arc<Decomposer>,
    executor: Arc<Executor>,
    aggregator: Arc<Aggregator>,
}

impl Orchestrator {
    pub fn new(decomposer: Decomposer, executor: Executor, aggregator: Aggregator) -> Self {
        Self {
            decomposer: Arc::new(decomposer),
            executor: Arc::new(executor),
            aggregator: Arc::new(aggregator),
        }
    }

    /// Wire the standard pipeline around the given collaborators.
    pub fn from_components(
        config: &OrchestratorConfig,
        oracle: Arc<dyn Oracle>,
        knowledge: Arc<dyn KnowledgeService>,
        weather: Arc<dyn WeatherService>,
    ) -> Self {
        let domains = Arc::new(config.domains.clone());
        let router = DomainRouter::new(
            domains.clone(),
            Arc::new(OracleClassifier::new(oracle.clone())),
            knowledge,
            config.router.clone(),
        );
        let registry =
            HandlerRegistry::standard(Arc::new(router), weather, config.fallback_city.clone());

        Self::new(
            Decomposer::new(oracle.clone(), domains)
                .with_fallback_confidence(config.fallback_decomposition_confidence),
            Executor::new(Arc::new(registry), config.task_timeout),
            Aggregator::new(oracle),
        )
    }

    /// Build the HTTP-backed pipeline described by `config`.
    pub fn from_config(config: &OrchestratorConfig) -> Result<Self> {
        let base = OpenAiOracle::new(config.oracle.clone()).context("Failed to build oracle client")?;
        let oracle: Arc<dyn Oracle> = if config.oracle.max_retries > 0 {
            Arc::new(RetryingOracle::new(base, config.oracle.max_retries))
        } else {
            Arc::new(base)
        };
        let knowledge = HttpKnowledgeService::new(&config.knowledge)
            .context("Failed to build knowledge service client")?;
        let weather = HttpWeatherService::new(&config.weather)
            .context("Failed to build weather service client")?;

        info!(
            oracle = %config.oracle.url,
            model = %config.oracle.model,
            knowledge = %config.knowledge.url,
            domains = config.domains.len(),
            "Orchestrator configured"
        );
        Ok(Self::from_components(
            config,
            oracle,
            Arc::new(knowledge),
            Arc::new(weather),
        ))
    }

    /// Answer one request. Never fails.
    pub async fn process_query(&self, text: &str) -> QueryResponse {
        let mut sm = RequestStateMachine::new();
        info!(chars = text.chars().count(), "Processing query");

        step(&mut sm, RequestStage::Decomposing, None);
        let decomposer = self.decomposer.clone();
        let owned = text.to_string();
        let decomposition = match tokio::spawn(async move { decomposer.decompose(&owned).await }).await
        {
            Ok(d) => d,
            Err(e) => return degraded(text, sm, "decomposition", e),
        };

        let reason = format!("{} sub-request(s)", decomposition.sub_requests.len());
        step(&mut sm, RequestStage::Executing, Some(&reason));
        let executor = self.executor.clone();
        let requests = decomposition.sub_requests.clone();
        let sub_results = match tokio::spawn(async move { executor.execute_all(&requests).await }).await
        {
            Ok(r) => r,
            Err(e) => return degraded(text, sm, "execution", e),
        };

        step(&mut sm, RequestStage::Aggregating, None);
        let aggregator = self.aggregator.clone();
        let owned = text.to_string();
        let results = sub_results.clone();
        let aggregation =
            match tokio::spawn(async move { aggregator.aggregate(&owned, &results).await }).await {
                Ok(a) => a,
                Err(e) => return degraded(text, sm, "aggregation", e),
            };

        step(&mut sm, RequestStage::Completed, None);
        info!(
            total = aggregation.summary.total,
            failed = aggregation.summary.failed,
            used_fallback = aggregation.used_fallback,
            path = %sm.summary(),
            "Query processed"
        );

        QueryResponse {
            text: text.to_string(),
            final_text: aggregation.final_text.clone(),
            summary: aggregation.summary,
            decomposition,
            sub_results,
            aggregation,
            transitions: sm.into_transitions(),
            degraded: false,
        }
    }
}

fn step(sm: &mut RequestStateMachine, to: RequestStage, reason: Option<&str>) {
    if let Err(e) = sm.advance(to, reason) {
        warn!(error = %e, "Unexpected stage transition");
    }
}

fn degraded(text: &str, mut sm: RequestStateMachine, stage: &str, err: JoinError) -> QueryResponse {
    let failure = PipelineError::InternalOrchestrationFailure(format!(
        "{stage} stage failed: {}",
        join_error_message(err)
    ));
    error!(stage, error = %failure, "Pipeline stage crashed, returning degraded response");
    if let Err(e) = sm.complete_degraded(&failure.to_string()) {
        warn!(error = %e, "Unexpected stage transition");
    }

    let final_text = format!("The request could not be processed. {failure}");
    QueryResponse {
        text: text.to_string(),
        final_text: final_text.clone(),
        decomposition: DecompositionOutcome::empty(text, failure.to_string()),
        sub_results: Vec::new(),
        aggregation: AggregationOutcome {
            final_text,
            rationale: failure.to_string(),
            summary: ExecutionSummary::default(),
            used_fallback: true,
        },
        summary: ExecutionSummary::default(),
        transitions: sm.into_transitions(),
        degraded: true,
    }
}

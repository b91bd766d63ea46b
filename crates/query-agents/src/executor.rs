//! Concurrent sub-task execution.
//!
//! Every sub-request runs in its own tokio task under a shared deadline
//! measured from fan-out. Handler errors, panics and timeouts all become
//! failed [`SubResult`]s; none of them affects sibling tasks. Results are
//! collected in input order.

use std::sync::Arc;
use std::time::Duration;

use coordination::{SubRequest, SubResult};
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::errors::PipelineError;
use crate::handlers::{HandlerOutput, HandlerRegistry};

type TaskOutcome = (Result<HandlerOutput, PipelineError>, Duration);

/// Deadline offset used when `started + task_timeout` overflows the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

pub struct Executor {
    registry: Arc<HandlerRegistry>,
    task_timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<HandlerRegistry>, task_timeout: Duration) -> Self {
        let missing = registry.missing_kinds();
        if !missing.is_empty() {
            warn!(missing = ?missing, "Handler registry is incomplete; these kinds will fail");
        }
        Self {
            registry,
            task_timeout,
        }
    }

    /// Run every request concurrently; the output is index-aligned with `requests`.
    pub async fn execute_all(&self, requests: &[SubRequest]) -> Vec<SubResult> {
        let started = Instant::now();
        let deadline = started
            .checked_add(self.task_timeout)
            .unwrap_or(started + FAR_FUTURE);

        let handles: Vec<_> = requests
            .iter()
            .map(|request| {
                let handler = self.registry.get(request.kind);
                let request = request.clone();
                info!(sub_request_id = %request.id, kind = %request.kind, "Sub-task started");
                tokio::spawn(async move {
                    let task_start = Instant::now();
                    let result = match handler {
                        Some(handler) => handler.handle(&request).await,
                        None => Err(PipelineError::InternalOrchestrationFailure(format!(
                            "no handler registered for {}",
                            request.kind
                        ))),
                    };
                    (result, task_start.elapsed())
                })
            })
            .collect();

        let mut results = Vec::with_capacity(requests.len());
        for (request, mut handle) in requests.iter().zip(handles) {
            let joined = tokio::time::timeout_at(deadline, &mut handle).await;
            let result = match joined {
                Ok(Ok(outcome)) => settle(request, outcome),
                Ok(Err(join_error)) => {
                    let elapsed = started.elapsed();
                    let err = PipelineError::InternalOrchestrationFailure(join_error_message(
                        join_error,
                    ));
                    error!(sub_request_id = %request.id, kind = %request.kind, error = %err, "Sub-task crashed");
                    SubResult::failure(request, err.to_string(), millis(elapsed))
                }
                Err(_) => {
                    handle.abort();
                    let err = PipelineError::Timeout(self.task_timeout);
                    warn!(sub_request_id = %request.id, kind = %request.kind, error = %err, "Sub-task timed out");
                    SubResult::failure(request, err.to_string(), millis(self.task_timeout))
                }
            };
            results.push(result);
        }

        info!(
            total = results.len(),
            failed = results.iter().filter(|r| !r.succeeded).count(),
            elapsed_ms = millis(started.elapsed()),
            "All sub-tasks settled"
        );
        results
    }
}

fn settle(request: &SubRequest, (result, elapsed): TaskOutcome) -> SubResult {
    let duration_ms = millis(elapsed);
    match result {
        Ok(output) => {
            info!(sub_request_id = %request.id, kind = %request.kind, duration_ms, "Sub-task succeeded");
            let result = SubResult::success(request, output.output, duration_ms);
            match output.domain {
                Some(domain) => result.with_domain(domain),
                None => result,
            }
        }
        Err(e) => {
            warn!(sub_request_id = %request.id, kind = %request.kind, duration_ms, error = %e, "Sub-task failed");
            SubResult::failure(request, e.to_string(), duration_ms)
        }
    }
}

pub(crate) fn join_error_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            format!("task panicked: {detail}")
        }
        Err(err) => format!("task failed to join: {err}"),
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u64::MAX as u128) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{CalculationHandler, SubTaskHandler};
    use async_trait::async_trait;
    use coordination::IntentKind;

    struct PanickingHandler;

    #[async_trait]
    impl SubTaskHandler for PanickingHandler {
        async fn handle(&self, _request: &SubRequest) -> Result<HandlerOutput, PipelineError> {
            panic!("weather backend exploded");
        }
    }

    #[tokio::test]
    async fn missing_handler_is_internal_failure() {
        let registry = HandlerRegistry::new().register(IntentKind::Calculation, Arc::new(CalculationHandler));
        let executor = Executor::new(Arc::new(registry), Duration::from_secs(5));
        let results = executor
            .execute_all(&[SubRequest::new("weather in Paris", IntentKind::WeatherLookup)])
            .await;
        assert!(!results[0].succeeded);
        assert!(results[0]
            .failure_reason
            .as_deref()
            .is_some_and(|r| r.starts_with("InternalOrchestrationFailure")));
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let registry = HandlerRegistry::new()
            .register(IntentKind::Calculation, Arc::new(CalculationHandler))
            .register(IntentKind::WeatherLookup, Arc::new(PanickingHandler));
        let executor = Executor::new(Arc::new(registry), Duration::from_secs(5));
        let results = executor
            .execute_all(&[
                SubRequest::new("weather in Paris", IntentKind::WeatherLookup),
                SubRequest::new("2 + 3", IntentKind::Calculation),
            ])
            .await;
        assert_eq!(results.len(), 2);
        let reason = results[0].failure_reason.as_deref().unwrap();
        assert!(reason.starts_with("InternalOrchestrationFailure"));
        assert!(reason.contains("weather backend exploded"));
        assert!(results[1].succeeded);
        assert_eq!(results[1].output, "2 + 3 = 5");
    }

    #[tokio::test]
    async fn empty_input_yields_empty_output() {
        let executor = Executor::new(Arc::new(HandlerRegistry::new()), Duration::from_secs(1));
        assert!(executor.execute_all(&[]).await.is_empty());
    }
}

//! Sub-task handlers, one per [`IntentKind`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use coordination::{calculator, weather, IntentKind, SubRequest};
use tracing::debug;

use crate::domain_router::DomainRouter;
use crate::errors::PipelineError;
use crate::services::WeatherService;

/// Successful handler output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutput {
    pub output: String,
    /// Knowledge domain that answered, for knowledge queries.
    pub domain: Option<String>,
}

impl HandlerOutput {
    pub fn text(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            domain: None,
        }
    }
}

#[async_trait]
pub trait SubTaskHandler: Send + Sync {
    async fn handle(&self, request: &SubRequest) -> Result<HandlerOutput, PipelineError>;
}

/// Maps each intent kind to exactly one handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<IntentKind, Arc<dyn SubTaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The production wiring: router, calculator, weather service.
    pub fn standard(
        router: Arc<DomainRouter>,
        weather: Arc<dyn WeatherService>,
        fallback_city: impl Into<String>,
    ) -> Self {
        Self::new()
            .register(IntentKind::KnowledgeQuery, Arc::new(KnowledgeHandler::new(router)))
            .register(IntentKind::Calculation, Arc::new(CalculationHandler))
            .register(
                IntentKind::WeatherLookup,
                Arc::new(WeatherHandler::new(weather, fallback_city)),
            )
    }

    /// Register `handler` for `kind`, replacing any previous one.
    pub fn register(mut self, kind: IntentKind, handler: Arc<dyn SubTaskHandler>) -> Self {
        self.handlers.insert(kind, handler);
        self
    }

    pub fn get(&self, kind: IntentKind) -> Option<Arc<dyn SubTaskHandler>> {
        self.handlers.get(&kind).cloned()
    }

    /// Kinds with no registered handler, in declaration order.
    pub fn missing_kinds(&self) -> Vec<IntentKind> {
        IntentKind::ALL
            .into_iter()
            .filter(|k| !self.handlers.contains_key(k))
            .collect()
    }
}

/// Knowledge queries go through the domain router.
pub struct KnowledgeHandler {
    router: Arc<DomainRouter>,
}

impl KnowledgeHandler {
    pub fn new(router: Arc<DomainRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl SubTaskHandler for KnowledgeHandler {
    async fn handle(&self, request: &SubRequest) -> Result<HandlerOutput, PipelineError> {
        let outcome = self.router.route(request).await;
        Ok(HandlerOutput {
            output: outcome.output,
            domain: Some(outcome.domain),
        })
    }
}

/// Two-operand arithmetic.
pub struct CalculationHandler;

#[async_trait]
impl SubTaskHandler for CalculationHandler {
    async fn handle(&self, request: &SubRequest) -> Result<HandlerOutput, PipelineError> {
        let calculation = calculator::evaluate(&request.text)?;
        Ok(HandlerOutput::text(calculation.to_string()))
    }
}

/// Current weather for the city named in the request.
pub struct WeatherHandler {
    service: Arc<dyn WeatherService>,
    fallback_city: String,
}

impl WeatherHandler {
    pub fn new(service: Arc<dyn WeatherService>, fallback_city: impl Into<String>) -> Self {
        Self {
            service,
            fallback_city: fallback_city.into(),
        }
    }
}

#[async_trait]
impl SubTaskHandler for WeatherHandler {
    async fn handle(&self, request: &SubRequest) -> Result<HandlerOutput, PipelineError> {
        let city = weather::extract_city(&request.text, &self.fallback_city);
        debug!(sub_request_id = %request.id, city = %city, "Resolved weather city");
        let report = self.service.lookup(&city).await?;
        Ok(HandlerOutput::text(weather::format_report(&city, &report)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MockWeatherService;
    use coordination::{LookupError, WeatherReport};

    fn beijing_report() -> WeatherReport {
        WeatherReport {
            temperature_c: 18.0,
            condition_text: "Light rain".into(),
            humidity_pct: 80.0,
            wind_kph: 12.0,
            feels_like_c: 16.0,
        }
    }

    #[tokio::test]
    async fn calculation_handler_formats_product() {
        let req = SubRequest::new("12 * 8", IntentKind::Calculation);
        let out = CalculationHandler.handle(&req).await.unwrap();
        assert_eq!(out.output, "12 × 8 = 96");
        assert!(out.domain.is_none());
    }

    #[tokio::test]
    async fn calculation_handler_rejects_missing_operands() {
        let req = SubRequest::new("please compute", IntentKind::Calculation);
        let err = CalculationHandler.handle(&req).await.unwrap_err();
        assert!(err.to_string().starts_with("InsufficientOperands"));
    }

    #[tokio::test]
    async fn weather_handler_translates_city() {
        let mut service = MockWeatherService::new();
        service
            .expect_lookup()
            .withf(|city: &str| city == "Beijing")
            .times(1)
            .returning(|_| Ok(beijing_report()));
        let handler = WeatherHandler::new(Arc::new(service), "Shanghai");
        let req = SubRequest::new("北京天气怎么样", IntentKind::WeatherLookup);
        let out = handler.handle(&req).await.unwrap();
        assert!(out.output.starts_with("Beijing: 18°C, light rain"));
    }

    #[tokio::test]
    async fn weather_handler_uses_fallback_city() {
        let mut service = MockWeatherService::new();
        service
            .expect_lookup()
            .withf(|city: &str| city == "Shanghai")
            .returning(|_| Ok(beijing_report()));
        let handler = WeatherHandler::new(Arc::new(service), "上海");
        let req = SubRequest::new("how is the weather", IntentKind::WeatherLookup);
        assert!(handler.handle(&req).await.is_ok());
    }

    #[tokio::test]
    async fn weather_lookup_error_is_lookup_failed() {
        let mut service = MockWeatherService::new();
        service
            .expect_lookup()
            .returning(|city| Err(LookupError::UnknownCity(city.to_string())));
        let handler = WeatherHandler::new(Arc::new(service), "Beijing");
        let req = SubRequest::new("weather in Atlantis", IntentKind::WeatherLookup);
        let err = handler.handle(&req).await.unwrap_err();
        assert_eq!(err.code(), "LookupFailed");
        assert!(err.to_string().contains("Atlantis"));
    }

    #[test]
    fn registry_reports_missing_kinds() {
        let registry = HandlerRegistry::new().register(IntentKind::Calculation, Arc::new(CalculationHandler));
        assert!(registry.get(IntentKind::Calculation).is_some());
        assert_eq!(
            registry.missing_kinds(),
            vec![IntentKind::KnowledgeQuery, IntentKind::WeatherLookup]
        );
    }
}

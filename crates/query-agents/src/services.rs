//! External collaborators reached over HTTP: knowledge retrieval and weather.

use async_trait::async_trait;
use coordination::{LookupError, WeatherReport};
use tracing::debug;

use crate::config::ServiceEndpoint;
use crate::errors::PipelineError;

/// WeatherAPI error code for "No matching location found".
const WEATHER_UNKNOWN_LOCATION: i64 = 1006;

/// Answers a question from one knowledge domain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeService: Send + Sync {
    async fn query(&self, text: &str, domain: &str) -> Result<String, PipelineError>;
}

/// Current weather for a city, in the service's locale.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn lookup(&self, city: &str) -> Result<WeatherReport, LookupError>;
}

/// POSTs `{"query", "dataset"}` to `<base>/query` and reads `answer`.
pub struct HttpKnowledgeService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpKnowledgeService {
    pub fn new(endpoint: &ServiceEndpoint) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }
}

#[async_trait]
impl KnowledgeService for HttpKnowledgeService {
    async fn query(&self, text: &str, domain: &str) -> Result<String, PipelineError> {
        let body = serde_json::json!({ "query": text, "dataset": domain });
        let mut request = self
            .client
            .post(format!("{}/query", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::retrieval(domain, e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::retrieval(
                domain,
                format!("HTTP {status}: {}", body.trim()),
            ));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| PipelineError::retrieval(domain, format!("invalid body: {e}")))?;

        match json["answer"].as_str().map(str::trim) {
            Some(answer) if !answer.is_empty() => {
                debug!(domain, chars = answer.len(), "Knowledge answer received");
                Ok(answer.to_string())
            }
            _ => Err(PipelineError::retrieval(domain, "response has no answer")),
        }
    }
}

/// WeatherAPI-style `current.json?key=&q=` client.
pub struct HttpWeatherService {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWeatherService {
    pub fn new(endpoint: &ServiceEndpoint) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: endpoint.url.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }
}

#[async_trait]
impl WeatherService for HttpWeatherService {
    async fn lookup(&self, city: &str) -> Result<WeatherReport, LookupError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LookupError::Unavailable("no weather API key configured".into()))?;

        let response = self
            .client
            .get(format!("{}/current.json", self.base_url))
            .query(&[("key", key), ("q", city)])
            .send()
            .await
            .map_err(|e| LookupError::Unavailable(e.to_string()))?;

        let status = response.status();
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LookupError::Unavailable(format!("invalid body: {e}")))?;

        if !status.is_success() {
            return Err(weather_error(city, status.as_u16(), &json));
        }
        parse_weather_report(&json)
    }
}

fn weather_error(city: &str, status: u16, json: &serde_json::Value) -> LookupError {
    if json["error"]["code"].as_i64() == Some(WEATHER_UNKNOWN_LOCATION) {
        return LookupError::UnknownCity(city.to_string());
    }
    let message = json["error"]["message"].as_str().unwrap_or("no error message");
    LookupError::Unavailable(format!("HTTP {status}: {message}"))
}

/// Read the `current` block of a WeatherAPI response.
pub fn parse_weather_report(json: &serde_json::Value) -> Result<WeatherReport, LookupError> {
    let current = &json["current"];
    let number = |field: &str| {
        current[field]
            .as_f64()
            .ok_or_else(|| LookupError::Unavailable(format!("response missing current.{field}")))
    };

    Ok(WeatherReport {
        temperature_c: number("temp_c")?,
        condition_text: current["condition"]["text"]
            .as_str()
            .unwrap_or("unknown")
            .trim()
            .to_string(),
        humidity_pct: number("humidity")?,
        wind_kph: number("wind_kph")?,
        feels_like_c: number("feelslike_c")?,
    })
}

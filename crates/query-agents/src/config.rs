use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use coordination::CategoryTable;
use serde::Deserialize;

/// Upper bound on the per-sub-task deadline.
pub const MAX_TASK_TIMEOUT: Duration = Duration::from_secs(3600);
/// Upper bound on oracle retry attempts.
pub const MAX_ORACLE_RETRIES: u32 = 10;

/// Language-model endpoint (OpenAI-compatible).
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Extra attempts on transient errors. 0 keeps single-attempt semantics.
    pub max_retries: u32,
}

/// Plain HTTP collaborator (knowledge index, weather service).
#[derive(Debug, Clone)]
pub struct ServiceEndpoint {
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

/// Thresholds for the domain-selection ladder.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterConfig {
    /// Heuristic score must exceed this to skip the oracle.
    pub heuristic_threshold: f64,
    /// Upper bound on confidence reported for heuristic picks.
    pub heuristic_confidence_cap: f64,
    /// Confidence reported when a valid domain hint is accepted.
    pub hint_confidence: f64,
    /// Confidence reported when falling back to `default_domain`.
    pub default_confidence: f64,
    pub default_domain: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            heuristic_threshold: 0.6,
            heuristic_confidence_cap: 0.95,
            hint_confidence: 0.9,
            default_confidence: 0.4,
            default_domain: std::env::var("QUERY_DEFAULT_DOMAIN")
                .unwrap_or_else(|_| "general".into()),
        }
    }
}

/// Top-level orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub oracle: OracleConfig,
    pub knowledge: ServiceEndpoint,
    pub weather: ServiceEndpoint,
    /// City used when a weather request names none.
    pub fallback_city: String,
    /// Per-sub-task deadline.
    pub task_timeout: Duration,
    /// Confidence of the single-element decomposition used on oracle failure.
    pub fallback_decomposition_confidence: f64,
    pub router: RouterConfig,
    /// Registered knowledge domains.
    pub domains: CategoryTable,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            oracle: OracleConfig {
                url: std::env::var("QUERY_ORACLE_URL")
                    .unwrap_or_else(|_| "http://localhost:8000/v1".into()),
                model: std::env::var("QUERY_ORACLE_MODEL")
                    .unwrap_or_else(|_| "qwen2.5-14b-instruct".into()),
                api_key: std::env::var("QUERY_ORACLE_API_KEY").ok(),
                timeout: timeout_from_env("QUERY_ORACLE_TIMEOUT_SECS", 60),
                temperature: 0.1,
                max_tokens: 1024,
                max_retries: u32_from_env("QUERY_ORACLE_RETRIES", 0),
            },
            knowledge: ServiceEndpoint {
                url: std::env::var("QUERY_KNOWLEDGE_URL")
                    .unwrap_or_else(|_| "http://localhost:8100".into()),
                api_key: std::env::var("QUERY_KNOWLEDGE_API_KEY").ok(),
                timeout: timeout_from_env("QUERY_KNOWLEDGE_TIMEOUT_SECS", 30),
            },
            weather: ServiceEndpoint {
                url: std::env::var("QUERY_WEATHER_URL")
                    .unwrap_or_else(|_| "https://api.weatherapi.com/v1".into()),
                api_key: std::env::var("QUERY_WEATHER_API_KEY").ok(),
                timeout: timeout_from_env("QUERY_WEATHER_TIMEOUT_SECS", 10),
            },
            fallback_city: std::env::var("QUERY_FALLBACK_CITY")
                .unwrap_or_else(|_| "Beijing".into()),
            task_timeout: timeout_from_env("QUERY_TASK_TIMEOUT_SECS", 30),
            fallback_decomposition_confidence: 0.5,
            router: RouterConfig::default(),
            domains: CategoryTable::default_domains(),
        }
    }
}

/// On-disk overlay. Every field is optional; unset fields keep the
/// environment/default value.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub fallback_city: Option<String>,
    pub task_timeout_secs: Option<u64>,
    pub fallback_decomposition_confidence: Option<f64>,
    pub oracle: OracleSection,
    pub knowledge: EndpointSection,
    pub weather: EndpointSection,
    pub router: RouterSection,
    pub domains: Option<CategoryTable>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OracleSection {
    pub url: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct EndpointSection {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RouterSection {
    pub heuristic_threshold: Option<f64>,
    pub heuristic_confidence_cap: Option<f64>,
    pub hint_confidence: Option<f64>,
    pub default_confidence: Option<f64>,
    pub default_domain: Option<String>,
}

impl OrchestratorConfig {
    /// Environment/defaults, overlaid by `path` when given, then validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = Self::default();
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                config.overlay_toml(&content)?
            }
            None => config,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply a TOML overlay without validating.
    pub fn overlay_toml(self, content: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(content).context("Failed to parse orchestrator config TOML")?;
        Ok(self.overlay(file))
    }

    pub fn overlay(mut self, file: ConfigFile) -> Self {
        if let Some(city) = file.fallback_city {
            self.fallback_city = city;
        }
        if let Some(secs) = file.task_timeout_secs {
            self.task_timeout = Duration::from_secs(secs);
        }
        if let Some(c) = file.fallback_decomposition_confidence {
            self.fallback_decomposition_confidence = c;
        }

        let o = file.oracle;
        set(&mut self.oracle.url, o.url);
        set(&mut self.oracle.model, o.model);
        if o.api_key.is_some() {
            self.oracle.api_key = o.api_key;
        }
        if let Some(secs) = o.timeout_secs {
            self.oracle.timeout = Duration::from_secs(secs);
        }
        set(&mut self.oracle.temperature, o.temperature);
        set(&mut self.oracle.max_tokens, o.max_tokens);
        set(&mut self.oracle.max_retries, o.max_retries);

        overlay_endpoint(&mut self.knowledge, file.knowledge);
        overlay_endpoint(&mut self.weather, file.weather);

        let r = file.router;
        set(&mut self.router.heuristic_threshold, r.heuristic_threshold);
        set(&mut self.router.heuristic_confidence_cap, r.heuristic_confidence_cap);
        set(&mut self.router.hint_confidence, r.hint_confidence);
        set(&mut self.router.default_confidence, r.default_confidence);
        set(&mut self.router.default_domain, r.default_domain);

        if let Some(domains) = file.domains {
            self.domains = domains;
        }
        self
    }

    /// Reject configurations the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if !self.domains.contains(&self.router.default_domain) {
            bail!(
                "default domain '{}' is not registered (known: {})",
                self.router.default_domain,
                self.domains.keys().collect::<Vec<_>>().join(", ")
            );
        }
        let unit_values = [
            ("router.heuristic_threshold", self.router.heuristic_threshold),
            ("router.heuristic_confidence_cap", self.router.heuristic_confidence_cap),
            ("router.hint_confidence", self.router.hint_confidence),
            ("router.default_confidence", self.router.default_confidence),
            (
                "fallback_decomposition_confidence",
                self.fallback_decomposition_confidence,
            ),
        ];
        for (name, value) in unit_values {
            if !(0.0..=1.0).contains(&value) {
                bail!("{name} must be within [0, 1], got {value}");
            }
        }
        if self.task_timeout.is_zero() {
            bail!("task timeout must be greater than zero");
        }
        if self.task_timeout > MAX_TASK_TIMEOUT {
            bail!(
                "task timeout must be at most {}s, got {}s",
                MAX_TASK_TIMEOUT.as_secs(),
                self.task_timeout.as_secs()
            );
        }
        if self.oracle.max_retries > MAX_ORACLE_RETRIES {
            bail!(
                "oracle.max_retries must be at most {MAX_ORACLE_RETRIES}, got {}",
                self.oracle.max_retries
            );
        }
        if self.fallback_city.trim().is_empty() {
            bail!("fallback city must not be blank");
        }
        Ok(())
    }
}

fn set<T>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

fn overlay_endpoint(endpoint: &mut ServiceEndpoint, section: EndpointSection) {
    set(&mut endpoint.url, section.url);
    if section.api_key.is_some() {
        endpoint.api_key = section.api_key;
    }
    if let Some(secs) = section.timeout_secs {
        endpoint.timeout = Duration::from_secs(secs);
    }
}

fn timeout_from_env(var: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

fn u32_from_env(var: &str, default: u32) -> u32 {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Check if an HTTP endpoint answers at all (any non-5xx status).
pub async fn check_endpoint(url: &str) -> bool {
    match reqwest::Client::new()
        .get(url)
        .timeout(Duration::from_secs(5))
        .send()
        .await
    {
        Ok(resp) => !resp.status().is_server_error(),
        Err(_) => false,
    }
}

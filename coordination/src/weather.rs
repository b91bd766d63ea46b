//! City extraction and formatting for weather sub-requests.
//!
//! City resolution order:
//! 1. the token right before a weather marker ("Beijing weather", "北京天气")
//! 2. an `in <City>` phrase ("weather in New York")
//! 3. any known city name anywhere in the text
//! 4. the configured fallback city
//!
//! Resolved names go through a static table that maps local and alternate
//! spellings to the names the weather service expects.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calculator::format_number;

const WEATHER_MARKERS: &[&str] = &["weather", "forecast", "天气"];

/// Tokens that can precede a marker without naming a city.
const STOPWORDS: &[&str] = &[
    "the", "what's", "whats", "what", "is", "how", "how's", "today's", "todays", "current",
    "check", "get", "a", "me", "show", "tell", "about", "and", "also", "today", "tomorrow",
    "今天", "明天", "现在",
];

/// Capitalised word(s) following "in", e.g. `in Beijing`, `in New York`.
static IN_CITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[Ii]n\s+([A-Z][A-Za-z'\-]+(?:\s+[A-Z][A-Za-z'\-]+)*)")
        .expect("IN_CITY_RE regex should compile")
});

/// `(alias, service name)` pairs. Aliases are matched case-insensitively.
const CITY_TABLE: &[(&str, &str)] = &[
    ("北京", "Beijing"),
    ("beijing", "Beijing"),
    ("peking", "Beijing"),
    ("上海", "Shanghai"),
    ("shanghai", "Shanghai"),
    ("广州", "Guangzhou"),
    ("guangzhou", "Guangzhou"),
    ("canton", "Guangzhou"),
    ("深圳", "Shenzhen"),
    ("shenzhen", "Shenzhen"),
    ("杭州", "Hangzhou"),
    ("hangzhou", "Hangzhou"),
    ("成都", "Chengdu"),
    ("chengdu", "Chengdu"),
    ("武汉", "Wuhan"),
    ("wuhan", "Wuhan"),
    ("西安", "Xi'an"),
    ("xian", "Xi'an"),
    ("xi'an", "Xi'an"),
    ("南京", "Nanjing"),
    ("nanjing", "Nanjing"),
    ("重庆", "Chongqing"),
    ("chongqing", "Chongqing"),
    ("天津", "Tianjin"),
    ("tianjin", "Tianjin"),
    ("香港", "Hong Kong"),
    ("hong kong", "Hong Kong"),
    ("东京", "Tokyo"),
    ("tokyo", "Tokyo"),
    ("纽约", "New York"),
    ("new york", "New York"),
    ("伦敦", "London"),
    ("london", "London"),
    ("巴黎", "Paris"),
    ("paris", "Paris"),
];

/// Current conditions returned by the weather service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub temperature_c: f64,
    pub condition_text: String,
    pub humidity_pct: f64,
    pub wind_kph: f64,
    pub feels_like_c: f64,
}

/// Weather lookup failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Service unreachable, misconfigured, or returned an unusable body.
    #[error("weather service unavailable: {0}")]
    Unavailable(String),

    #[error("city not recognized: {0}")]
    UnknownCity(String),
}

/// Translate a city name to the service's locale, if known.
pub fn translate_city(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();
    CITY_TABLE
        .iter()
        .find(|(alias, _)| alias.to_lowercase() == needle)
        .map(|(_, canonical)| *canonical)
}

/// Resolve the city a weather request is about.
pub fn extract_city(text: &str, fallback: &str) -> String {
    if let Some(city) = city_before_marker(text) {
        return city;
    }
    if let Some(caps) = IN_CITY_RE.captures(text) {
        let raw = caps[1].trim();
        return translate_city(raw).map(str::to_string).unwrap_or_else(|| raw.to_string());
    }
    if let Some(city) = known_city_anywhere(text) {
        return city.to_string();
    }
    translate_city(fallback)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

fn city_before_marker(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let marker_pos = WEATHER_MARKERS.iter().filter_map(|m| lower.find(m)).min()?;
    // Lowercasing can shift byte offsets for some scripts; fall back to the
    // lowercase text when the offset is not a boundary of the original.
    let before = if text.is_char_boundary(marker_pos) && text.len() == lower.len() {
        &text[..marker_pos]
    } else {
        &lower[..marker_pos]
    };

    let token = before.split_whitespace().last()?;
    let token = token
        .trim_matches(|c: char| c.is_ascii_punctuation() || "，。？！、".contains(c))
        .trim_end_matches("'s")
        .trim_end_matches('的');
    if token.is_empty() || STOPWORDS.contains(&token.to_lowercase().as_str()) {
        return None;
    }

    if let Some(city) = translate_city(token) {
        return Some(city.to_string());
    }
    // CJK text has no spaces: "今天北京" should still resolve to Beijing.
    if let Some((_, canonical)) = CITY_TABLE.iter().find(|(alias, _)| token.ends_with(alias)) {
        return Some(canonical.to_string());
    }
    if token.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(token.to_string())
}

fn known_city_anywhere(text: &str) -> Option<&'static str> {
    let lower = text.to_lowercase();
    CITY_TABLE
        .iter()
        .find(|(alias, _)| lower.contains(&alias.to_lowercase()))
        .map(|(_, canonical)| *canonical)
}

/// One-line summary, e.g. `Beijing: 18°C, light rain (feels like 16°C, humidity 80%, wind 12 km/h)`.
pub fn format_report(city: &str, report: &WeatherReport) -> String {
    format!(
        "{}: {}°C, {} (feels like {}°C, humidity {}%, wind {} km/h)",
        city,
        format_number(report.temperature_c),
        report.condition_text.to_lowercase(),
        format_number(report.feels_like_c),
        format_number(report.humidity_pct),
        format_number(report.wind_kph)
    )
}

//! Deterministic core for multi-intent query orchestration.
//!
//! This crate holds everything in the pipeline that does not need a language
//! model or the network:
//! - the sub-task data model shared by every stage ([`task`])
//! - category tables and the keyword heuristic used for intent and domain
//!   routing ([`router`])
//! - the two-operand calculator behind calculation sub-requests
//!   ([`calculator`])
//! - city extraction, locale translation and report formatting for weather
//!   sub-requests ([`weather`])
//!
//! The async, oracle-backed stages live in the `query-agents` crate.

#![allow(clippy::uninlined_format_args)]

pub mod calculator;
pub mod router;
pub mod task;
pub mod weather;

pub use calculator::{CalcError, Calculation, Operator};
pub use router::{CategoryEntry, CategoryError, CategoryTable, KeywordScore, KeywordScorer};
pub use task::{
    AggregationOutcome, DecompositionOutcome, ExecutionSummary, IntentKind, SubRequest, SubResult,
};
pub use weather::{LookupError, WeatherReport};

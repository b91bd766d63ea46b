//! Pipeline error taxonomy.
//!
//! Every stage catches its own category and degrades locally; these values
//! surface to callers only as `SubResult::failure_reason` strings or as
//! rationale text. The rendered message always starts with the taxonomy
//! code so callers can match on the prefix without parsing prose.
//!
//! | Code                           | Raised by                                  |
//! |--------------------------------|--------------------------------------------|
//! | `OracleUnavailable`            | classifier, decomposer, aggregator oracle  |
//! | `InsufficientOperands`         | calculation handler                        |
//! | `RetrievalFailed`              | knowledge service                          |
//! | `LookupFailed`                 | weather service                            |
//! | `Timeout`                      | executor per-task deadline                 |
//! | `InternalOrchestrationFailure` | task panics, orchestrator boundary         |

use std::time::Duration;

use coordination::{CalcError, LookupError};
use thiserror::Error;

use crate::oracle::OracleError;

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// Oracle call failed or its output violated the expected schema.
    #[error("OracleUnavailable: {0}")]
    OracleUnavailable(String),

    /// Fewer than two numbers in a calculation request.
    #[error("InsufficientOperands: expected two numeric operands, found {found}")]
    InsufficientOperands { found: usize },

    /// Knowledge domain query errored.
    #[error("RetrievalFailed: domain '{domain}': {message}")]
    RetrievalFailed { domain: String, message: String },

    /// Weather service errored or did not recognize the city.
    #[error("LookupFailed: {0}")]
    LookupFailed(#[from] LookupError),

    /// A sub-task exceeded its deadline and was cancelled.
    #[error("Timeout: sub-task exceeded {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Anything unexpected, including task panics.
    #[error("InternalOrchestrationFailure: {0}")]
    InternalOrchestrationFailure(String),
}

impl PipelineError {
    /// Taxonomy code, identical to the message prefix.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OracleUnavailable(_) => "OracleUnavailable",
            Self::InsufficientOperands { .. } => "InsufficientOperands",
            Self::RetrievalFailed { .. } => "RetrievalFailed",
            Self::LookupFailed(_) => "LookupFailed",
            Self::Timeout(_) => "Timeout",
            Self::InternalOrchestrationFailure(_) => "InternalOrchestrationFailure",
        }
    }

    /// Build an `OracleUnavailable` for a schema violation.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::OracleUnavailable(format!("contract violation: {}", message.into()))
    }

    pub fn retrieval(domain: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RetrievalFailed {
            domain: domain.into(),
            message: message.into(),
        }
    }
}

impl From<OracleError> for PipelineError {
    fn from(err: OracleError) -> Self {
        Self::OracleUnavailable(err.to_string())
    }
}

impl From<CalcError> for PipelineError {
    fn from(err: CalcError) -> Self {
        match err {
            CalcError::InsufficientOperands { found } => Self::InsufficientOperands { found },
        }
    }
}

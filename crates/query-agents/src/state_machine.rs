//! Request state machine: explicit stages and legal transition guards.
//!
//! Every `process_query` call owns one machine. Each stage change is
//! validated and recorded, so a response carries an auditable trace of how
//! it was produced.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages of one request.
///
/// Every request starts at `Received` and ends at `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStage {
    Received,
    Decomposing,
    Executing,
    Aggregating,
    /// Terminal. Reached on success and on the degraded path.
    Completed,
}

impl RequestStage {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Received => write!(f, "Received"),
            Self::Decomposing => write!(f, "Decomposing"),
            Self::Executing => write!(f, "Executing"),
            Self::Aggregating => write!(f, "Aggregating"),
            Self::Completed => write!(f, "Completed"),
        }
    }
}

/// Legal edges:
/// ```text
/// Received → Decomposing
/// Decomposing → Executing
/// Executing → Aggregating
/// Aggregating → Completed
/// any non-terminal → Completed   (degraded path)
/// ```
fn is_legal_transition(from: RequestStage, to: RequestStage) -> bool {
    use RequestStage::*;

    if to == Completed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Received, Decomposing) | (Decomposing, Executing) | (Executing, Aggregating)
    )
}

/// A single recorded stage change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: RequestStage,
    pub to: RequestStage,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal stage transition: {from} → {to}")]
pub struct IllegalTransition {
    pub from: RequestStage,
    pub to: RequestStage,
}

pub struct RequestStateMachine {
    current: RequestStage,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl RequestStateMachine {
    pub fn new() -> Self {
        Self {
            current: RequestStage::Received,
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> RequestStage {
        self.current
    }

    /// Move to `to` if the edge is legal, recording the transition.
    pub fn advance(
        &mut self,
        to: RequestStage,
        reason: Option<&str>,
    ) -> Result<(), IllegalTransition> {
        if !is_legal_transition(self.current, to) {
            return Err(IllegalTransition {
                from: self.current,
                to,
            });
        }

        tracing::debug!(from = %self.current, to = %to, "Request stage transition");
        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Jump straight to `Completed` from any non-terminal stage.
    pub fn complete_degraded(&mut self, reason: &str) -> Result<(), IllegalTransition> {
        self.advance(RequestStage::Completed, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Consume the machine, returning its transition log.
    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    /// e.g. `Received → Completed (12ms) [Decomposing → Executing → Aggregating → Completed]`
    pub fn summary(&self) -> String {
        let path: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        let mut summary = format!(
            "{} → {} ({}ms)",
            RequestStage::Received,
            self.current,
            self.created_at.elapsed().as_millis()
        );
        if !path.is_empty() {
            summary.push_str(&format!(" [{}]", path.join(" → ")));
        }
        summary
    }
}

impl Default for RequestStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

//! Deterministic routing primitives.
//!
//! Category tables describe what can be routed to (intents, knowledge
//! domains); the keyword scorer is the fast, oracle-free first tier of every
//! routing decision.
//!
//! ```text
//! text ──▶ KeywordScorer::best(text, table) ──▶ KeywordScore { key, score, matched }
//! ```

pub mod categories;
pub mod keyword_scorer;

pub use categories::{CategoryEntry, CategoryError, CategoryTable};
pub use keyword_scorer::{KeywordScore, KeywordScorer};

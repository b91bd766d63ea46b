//! Oracle-backed multi-intent query orchestration.
//!
//! A request is split into typed sub-requests ([`decomposer`]), each one is
//! dispatched to its handler concurrently ([`executor`], [`handlers`]), with
//! knowledge queries routed to a data domain first ([`domain_router`]), and
//! the partial results are merged into one answer ([`aggregator`]).
//! [`orchestrator::Orchestrator::process_query`] ties the stages together
//! and never fails.

pub mod aggregator;
pub mod api;
pub mod classifier;
pub mod config;
pub mod decomposer;
pub mod domain_router;
pub mod errors;
pub mod executor;
pub mod handlers;
pub mod oracle;
pub mod orchestrator;
pub mod prompts;
pub mod services;
pub mod state_machine;

pub use errors::PipelineError;
pub use orchestrator::{Orchestrator, QueryResponse};

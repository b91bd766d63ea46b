use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use query_agents::api::{handle_query, QueryRequest};
use query_agents::config::{check_endpoint, OrchestratorConfig};
use query_agents::orchestrator::Orchestrator;
use tracing::{info, warn};

/// Answer a natural-language request that may mix several intents.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML file overlaid on the environment defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON response
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// The request text
    #[arg(required = true, trailing_var_arg = true)]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let query = args.query.join(" ");
    if query.trim().is_empty() {
        bail!("query text must not be empty");
    }

    let config = OrchestratorConfig::load(args.config.as_deref())?;
    if !check_endpoint(&config.oracle.url).await {
        warn!(url = %config.oracle.url, "Oracle endpoint not reachable; answers will use fallbacks");
    }

    let orchestrator = Orchestrator::from_config(&config)?;
    let response = handle_query(&orchestrator, &QueryRequest { query }).await;
    info!(
        total = response.execution_summary.total_sub_queries,
        failed = response.execution_summary.failed_queries,
        "Query answered"
    );

    let json = if args.pretty {
        serde_json::to_string_pretty(&response)
    } else {
        serde_json::to_string(&response)
    }
    .context("Failed to serialize response")?;
    println!("{json}");
    Ok(())
}

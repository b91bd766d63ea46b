//! Prompt text for every oracle call site.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever a template changes so a
//! logged response can be traced back to the prompt that produced it.

use coordination::{CategoryTable, IntentKind, KeywordScore, SubResult};

/// Prompt version. Bump on any template change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// System message sent with every completion.
pub const ORACLE_SYSTEM_PREAMBLE: &str = "\
You are a precise routing and synthesis component inside a query-answering service. \
Follow the output format exactly. When a JSON object is requested, reply with exactly \
one JSON object and nothing else: no prose, no markdown headings, no second object.";

/// Ask the oracle to pick one category from `table`.
pub fn classification_prompt(text: &str, table: &CategoryTable) -> String {
    format!(
        "Classify the request into exactly one of the categories below.\n\n\
         ## Categories\n{listing}\n\n\
         ## Request\n{text}\n\n\
         ## Output\n\
         Reply with one JSON object:\n\
         {{\"category\": \"<one of: {keys}>\", \"confidence\": <number between 0 and 1>, \
         \"rationale\": \"<one sentence>\"}}",
        listing = table.prompt_listing(),
        keys = table.keys().collect::<Vec<_>>().join(", "),
        text = text.trim(),
    )
}

/// Ask the oracle to split a request into typed sub-requests.
pub fn decomposition_prompt(
    text: &str,
    intent_hints: &[KeywordScore],
    domains: &CategoryTable,
) -> String {
    let kinds = IntentKind::ALL
        .iter()
        .map(|k| format!("- {}: {}", k.key(), k.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let hints = intent_hints
        .iter()
        .map(|s| format!("- {}", s.explain()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Decide whether the request contains one or several independent intents and \
         split it into self-contained sub-requests, one per intent.\n\n\
         ## Intent kinds\n{kinds}\n\n\
         ## Knowledge domains (optional \"domain\" for knowledge_query items)\n{domains}\n\n\
         ## Keyword pre-analysis (hints only, may be wrong)\n{hints}\n\n\
         ## Request\n{text}\n\n\
         ## Rules\n\
         - Each sub-request text must be answerable on its own; restate any shared context.\n\
         - Keep numbers, city names and terms exactly as written.\n\
         - priority: 1 for the first thing the user asked, increasing in reading order.\n\
         - confidence: how sure you are about the kind, between 0 and 1.\n\n\
         ## Output\n\
         Reply with one JSON object:\n\
         {{\"rationale\": \"<why you split it this way>\", \"sub_requests\": [\
         {{\"text\": \"...\", \"kind\": \"knowledge_query|calculation|weather_lookup\", \
         \"priority\": 1, \"confidence\": 0.9, \"rationale\": \"...\", \"domain\": \"<optional>\"}}]}}",
        domains = domains.prompt_listing(),
        text = text.trim(),
    )
}

/// Ask the oracle to merge sub-results into one answer.
pub fn aggregation_prompt(original_text: &str, results: &[SubResult]) -> String {
    let mut answered = Vec::new();
    let mut failed = Vec::new();
    for (idx, r) in results.iter().enumerate() {
        if r.succeeded {
            answered.push(format!(
                "{}. [{}] {}\n   Answer: {}",
                idx + 1,
                r.kind,
                r.text,
                r.output
            ));
        } else {
            failed.push(format!(
                "{}. [{}] {}\n   Failure: {}",
                idx + 1,
                r.kind,
                r.text,
                r.failure_reason.as_deref().unwrap_or("unknown failure")
            ));
        }
    }

    let answered = if answered.is_empty() {
        "(none)".to_string()
    } else {
        answered.join("\n")
    };
    let failed = if failed.is_empty() {
        "(none)".to_string()
    } else {
        failed.join("\n")
    };

    format!(
        "Write one coherent answer to the user's original request using the partial \
         results below. Address every part in the order asked. Use only the facts given; \
         for failed parts, say briefly that they could not be answered and why.\n\n\
         ## Original request\n{original}\n\n\
         ## Answered parts\n{answered}\n\n\
         ## Failed parts\n{failed}\n\n\
         ## Output\n\
         Reply with one JSON object:\n\
         {{\"final_text\": \"<the answer for the user>\", \"rationale\": \"<how you combined the parts>\"}}",
        original = original_text.trim(),
    )
}

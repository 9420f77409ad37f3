use dossier_core::{EvidenceItem, InvestigationLog};
use dossier_mcp::{SearchPayload, ToolSelector, ToolSession};
use serde_json::{json, Map, Value};
use tracing::debug;

pub const QUERY_TOPICS: [&str; 3] = ["noise complaints", "crime reports", "permit violations"];

pub fn search_queries(address: &str) -> Vec<String> {
    QUERY_TOPICS.iter().map(|topic| format!("\"{address}\" {topic}")).collect()
}

fn search_arguments(query: &str) -> Map<String, Value> {
    let mut arguments = Map::new();
    arguments.insert("query".to_string(), json!(query));
    arguments.insert("numResults".to_string(), json!(1));
    arguments.insert("useAutoprompt".to_string(), json!(true));
    arguments
}

/// Runs the fixed query set against the selected search tool, one query at a time. A failed
/// query is logged and skipped; the rest still run.
pub async fn collect_evidence(
    session: &mut dyn ToolSession,
    selector: &dyn ToolSelector,
    address: &str,
    log: &mut InvestigationLog,
) -> Vec<EvidenceItem> {
    let catalog = match session.list_tools().await {
        Ok(catalog) => catalog,
        Err(error) => {
            log.warn(format!("⚠️ MCP gateway unavailable: {error}"));
            return Vec::new();
        }
    };
    log.push(format!("🛠️ Available MCP tools: {}", catalog.names().join(", ")));

    let Some(tool) = selector.select(&catalog) else {
        log.warn("⚠️ Search tool not found in gateway tool list. Check the sandbox template.");
        return Vec::new();
    };
    log.push(format!("🔍 Using search tool: {}...", tool.name));

    let mut evidence = Vec::new();
    for query in search_queries(address) {
        log.push(format!("🔍 Searching: {query}..."));

        let output = match session.call_tool(&tool.name, search_arguments(&query)).await {
            Ok(output) if output.is_error => {
                log.warn(format!("⚠️ MCP search step failed: {}", output.error_message()));
                continue;
            }
            Ok(output) => output,
            Err(error) => {
                log.warn(format!("⚠️ MCP search step failed: {error}"));
                continue;
            }
        };

        for text in output.text_blocks() {
            let payload = SearchPayload::parse(text);
            if let Some(line) = payload.found_line() {
                log.push(line);
            }
            if let Some(item) = payload.evidence() {
                evidence.push(item);
            }
        }
    }

    debug!(
        event_name = "investigation.evidence.collected",
        correlation_id = %log.correlation_id(),
        items = evidence.len(),
        "evidence collection finished"
    );
    evidence
}

use std::sync::Arc;

use crate::commands::CommandResult;
use dossier_agent::InvestigationRuntime;
use dossier_core::config::{AppConfig, LoadOptions};
use dossier_core::{InvestigationId, InvestigationLog, InvestigationRequest, LogSink};

/// Progress goes to stderr so stdout stays a single JSON document.
struct StderrSink;

impl LogSink for StderrSink {
    fn emit(&self, line: &str) {
        eprintln!("{line}");
    }
}

pub fn run(address: &str, price: &str) -> CommandResult {
    let request = match InvestigationRequest::new(address, price) {
        Ok(request) => request,
        Err(error) => {
            return CommandResult::failure(
                "investigate",
                "invalid_request",
                format!("Address and price are required: {error}"),
                2,
            );
        }
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "investigate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let investigation = match InvestigationRuntime::from_config(&config) {
        Ok(investigation) => investigation,
        Err(error) => {
            return CommandResult::failure("investigate", "config_validation", error.to_string(), 2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "investigate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let log = InvestigationLog::with_sink(InvestigationId::generate().as_str(), Arc::new(StderrSink));
    match runtime.block_on(investigation.investigate(&request, log)) {
        Ok(result) => CommandResult::payload(0, &result),
        Err(failure) => CommandResult::payload(4, &failure),
    }
}

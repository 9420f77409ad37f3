use std::sync::Arc;

use dossier_agent::InvestigationRuntime;
use dossier_core::config::{AppConfig, ConfigError};
use dossier_core::InvestigationError;
use thiserror::Error;
use tracing::{info, warn};

use crate::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("investigation runtime could not be built: {0}")]
    Runtime(#[source] InvestigationError),
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let credentials = config.credential_status();
    for (name, present) in
        [("sandbox", credentials.sandbox), ("search", credentials.search), ("llm", credentials.llm)]
    {
        if !present {
            warn!(
                event_name = "system.bootstrap.credential_missing",
                correlation_id = "bootstrap",
                credential = name,
                "API key not configured; investigations will fail where it is needed"
            );
        }
    }

    let runtime = InvestigationRuntime::from_config(&config).map_err(BootstrapError::Runtime)?;
    info!(
        event_name = "system.bootstrap.runtime_ready",
        correlation_id = "bootstrap",
        llm_model = %config.llm.model,
        sandbox_template = %config.sandbox.template,
        "investigation runtime initialized"
    );

    Ok(Application { state: AppState { investigator: Arc::new(runtime), credentials }, config })
}

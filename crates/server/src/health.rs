use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use dossier_core::config::CredentialStatus;
use serde::Serialize;

use crate::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CredentialReport {
    pub sandbox: &'static str,
    pub search: &'static str,
    pub llm: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub credentials: CredentialReport,
    pub checked_at: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.credentials.all_present();

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "dossier-server runtime initialized".to_string(),
        },
        credentials: credential_report(&state.credentials),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn credential_report(credentials: &CredentialStatus) -> CredentialReport {
    let check = |present: bool| if present { "ready" } else { "missing" };
    CredentialReport {
        sandbox: check(credentials.sandbox),
        search: check(credentials.search),
        llm: check(credentials.llm),
    }
}

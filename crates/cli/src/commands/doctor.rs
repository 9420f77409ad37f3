use crate::commands::CommandResult;
use dossier_core::config::{AppConfig, LoadOptions};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

const CREDENTIAL_CHECKS: [(&str, &str); 3] = [
    ("sandbox_credentials", "DOSSIER_SANDBOX_API_KEY or E2B_API_KEY"),
    ("search_credentials", "DOSSIER_SEARCH_API_KEY or EXA_API_KEY"),
    ("llm_credentials", "DOSSIER_LLM_API_KEY or GROQ_API_KEY"),
];

/// Exit code is 1 when any check fails so scripts can gate on readiness.
pub fn run(json_output: bool) -> CommandResult {
    let report = build_report();
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    if json_output {
        return CommandResult::payload(exit_code, &report);
    }

    CommandResult { exit_code, output: render_human(&report) }
}

fn build_report() -> DoctorReport {
    let mut checks = Vec::new();

    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Pass,
                details: "configuration loaded and validated".to_string(),
            });

            let credentials = config.credential_status();
            let present = [credentials.sandbox, credentials.search, credentials.llm];
            for ((name, variables), present) in CREDENTIAL_CHECKS.into_iter().zip(present) {
                checks.push(if present {
                    DoctorCheck {
                        name,
                        status: CheckStatus::Pass,
                        details: "API key configured".to_string(),
                    }
                } else {
                    DoctorCheck {
                        name,
                        status: CheckStatus::Fail,
                        details: format!("API key missing; set {variables}"),
                    }
                });
            }
        }
        Err(error) => {
            checks.push(DoctorCheck {
                name: "config_validation",
                status: CheckStatus::Fail,
                details: error.to_string(),
            });
            for (name, _) in CREDENTIAL_CHECKS {
                checks.push(DoctorCheck {
                    name,
                    status: CheckStatus::Skipped,
                    details: "skipped because configuration did not load".to_string(),
                });
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

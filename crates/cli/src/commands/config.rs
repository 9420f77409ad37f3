use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dossier_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

struct Field<'a> {
    key_path: &'static str,
    value: String,
    env_keys: &'a [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let fields = [
        Field {
            key_path: "sandbox.api_key",
            value: redact_secret(config.sandbox.api_key.as_ref()),
            env_keys: &["DOSSIER_SANDBOX_API_KEY", "E2B_API_KEY"],
        },
        Field {
            key_path: "sandbox.api_url",
            value: config.sandbox.api_url.clone(),
            env_keys: &["DOSSIER_SANDBOX_API_URL"],
        },
        Field {
            key_path: "sandbox.template",
            value: config.sandbox.template.clone(),
            env_keys: &["DOSSIER_SANDBOX_TEMPLATE"],
        },
        Field {
            key_path: "sandbox.lifetime_secs",
            value: config.sandbox.lifetime_secs.to_string(),
            env_keys: &["DOSSIER_SANDBOX_LIFETIME_SECS"],
        },
        Field {
            key_path: "sandbox.request_timeout_secs",
            value: config.sandbox.request_timeout_secs.to_string(),
            env_keys: &["DOSSIER_SANDBOX_REQUEST_TIMEOUT_SECS"],
        },
        Field {
            key_path: "search.api_key",
            value: redact_secret(config.search.api_key.as_ref()),
            env_keys: &["DOSSIER_SEARCH_API_KEY", "EXA_API_KEY"],
        },
        Field {
            key_path: "search.server",
            value: config.search.server.clone(),
            env_keys: &["DOSSIER_SEARCH_SERVER"],
        },
        Field {
            key_path: "search.tool_hints",
            value: config.search.tool_hints.join(","),
            env_keys: &["DOSSIER_SEARCH_TOOL_HINTS"],
        },
        Field {
            key_path: "llm.api_key",
            value: redact_secret(config.llm.api_key.as_ref()),
            env_keys: &["DOSSIER_LLM_API_KEY", "GROQ_API_KEY"],
        },
        Field {
            key_path: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["DOSSIER_LLM_BASE_URL"],
        },
        Field {
            key_path: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["DOSSIER_LLM_MODEL"],
        },
        Field {
            key_path: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["DOSSIER_LLM_TIMEOUT_SECS"],
        },
        Field {
            key_path: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["DOSSIER_SERVER_BIND_ADDRESS"],
        },
        Field {
            key_path: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["DOSSIER_SERVER_PORT"],
        },
        Field {
            key_path: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["DOSSIER_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Field {
            key_path: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["DOSSIER_LOGGING_LEVEL", "DOSSIER_LOG_LEVEL"],
        },
        Field {
            key_path: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_keys: &["DOSSIER_LOGGING_FORMAT", "DOSSIER_LOG_FORMAT"],
        },
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("dossier.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/dossier.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_secret(secret: Option<&SecretString>) -> String {
    let Some(secret) = secret else {
        return "<unset>".to_string();
    };
    let trimmed = secret.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    // Provider keys often carry a readable prefix (`gsk_`, `e2b_`); keep it, hide the rest.
    match trimmed.split_once('_') {
        Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}_***"),
        _ => "<redacted>".to_string(),
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub sandbox: SandboxConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SandboxConfig {
    pub api_key: Option<SecretString>,
    pub api_url: String,
    pub template: String,
    pub lifetime_secs: u64,
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: Option<SecretString>,
    /// Name of the search server the sandbox gateway should start.
    pub server: String,
    /// Substrings that mark a gateway tool as the search tool, checked in order.
    pub tool_hints: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub sandbox_api_key: Option<String>,
    pub sandbox_api_url: Option<String>,
    pub search_api_key: Option<String>,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Environment variables consulted by [`AppConfig::load`], primary name first.
pub const ENV_KEYS: &[&str] = &[
    "DOSSIER_SANDBOX_API_KEY",
    "E2B_API_KEY",
    "DOSSIER_SANDBOX_API_URL",
    "DOSSIER_SANDBOX_TEMPLATE",
    "DOSSIER_SANDBOX_LIFETIME_SECS",
    "DOSSIER_SANDBOX_REQUEST_TIMEOUT_SECS",
    "DOSSIER_SEARCH_API_KEY",
    "EXA_API_KEY",
    "DOSSIER_SEARCH_SERVER",
    "DOSSIER_SEARCH_TOOL_HINTS",
    "DOSSIER_LLM_API_KEY",
    "GROQ_API_KEY",
    "DOSSIER_LLM_BASE_URL",
    "DOSSIER_LLM_MODEL",
    "DOSSIER_LLM_TIMEOUT_SECS",
    "DOSSIER_SERVER_BIND_ADDRESS",
    "DOSSIER_SERVER_PORT",
    "DOSSIER_SERVER_GRACEFUL_SHUTDOWN_SECS",
    "DOSSIER_LOGGING_LEVEL",
    "DOSSIER_LOG_LEVEL",
    "DOSSIER_LOGGING_FORMAT",
    "DOSSIER_LOG_FORMAT",
];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sandbox: SandboxConfig {
                api_key: None,
                api_url: "https://api.e2b.app".to_string(),
                template: "mcp-gateway".to_string(),
                lifetime_secs: 300,
                request_timeout_secs: 60,
            },
            search: SearchConfig {
                api_key: None,
                server: "exa".to_string(),
                tool_hints: vec!["exa".to_string(), "search".to_string()],
            },
            llm: LlmConfig {
                api_key: None,
                base_url: "https://api.groq.com/openai/v1".to_string(),
                model: "llama-3.3-70b-versatile".to_string(),
                timeout_secs: 60,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("dossier.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    /// Which of the three collaborator credentials are present. Absence is reported, never
    /// rejected: a missing key surfaces when the collaborator is first used.
    pub fn credential_status(&self) -> CredentialStatus {
        CredentialStatus {
            sandbox: has_secret(self.sandbox.api_key.as_ref()),
            search: has_secret(self.search.api_key.as_ref()),
            llm: has_secret(self.llm.api_key.as_ref()),
        }
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(sandbox) = patch.sandbox {
            if let Some(api_key) = sandbox.api_key {
                self.sandbox.api_key = Some(secret_value(api_key));
            }
            if let Some(api_url) = sandbox.api_url {
                self.sandbox.api_url = api_url;
            }
            if let Some(template) = sandbox.template {
                self.sandbox.template = template;
            }
            if let Some(lifetime_secs) = sandbox.lifetime_secs {
                self.sandbox.lifetime_secs = lifetime_secs;
            }
            if let Some(request_timeout_secs) = sandbox.request_timeout_secs {
                self.sandbox.request_timeout_secs = request_timeout_secs;
            }
        }

        if let Some(search) = patch.search {
            if let Some(api_key) = search.api_key {
                self.search.api_key = Some(secret_value(api_key));
            }
            if let Some(server) = search.server {
                self.search.server = server;
            }
            if let Some(tool_hints) = search.tool_hints {
                self.search.tool_hints = tool_hints;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = base_url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env_any(&["DOSSIER_SANDBOX_API_KEY", "E2B_API_KEY"]) {
            self.sandbox.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DOSSIER_SANDBOX_API_URL") {
            self.sandbox.api_url = value;
        }
        if let Some(value) = read_env("DOSSIER_SANDBOX_TEMPLATE") {
            self.sandbox.template = value;
        }
        if let Some(value) = read_env("DOSSIER_SANDBOX_LIFETIME_SECS") {
            self.sandbox.lifetime_secs = parse_u64("DOSSIER_SANDBOX_LIFETIME_SECS", &value)?;
        }
        if let Some(value) = read_env("DOSSIER_SANDBOX_REQUEST_TIMEOUT_SECS") {
            self.sandbox.request_timeout_secs =
                parse_u64("DOSSIER_SANDBOX_REQUEST_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env_any(&["DOSSIER_SEARCH_API_KEY", "EXA_API_KEY"]) {
            self.search.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DOSSIER_SEARCH_SERVER") {
            self.search.server = value;
        }
        if let Some(value) = read_env("DOSSIER_SEARCH_TOOL_HINTS") {
            self.search.tool_hints = value
                .split(',')
                .map(str::trim)
                .filter(|hint| !hint.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env_any(&["DOSSIER_LLM_API_KEY", "GROQ_API_KEY"]) {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("DOSSIER_LLM_BASE_URL") {
            self.llm.base_url = value;
        }
        if let Some(value) = read_env("DOSSIER_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("DOSSIER_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("DOSSIER_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("DOSSIER_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("DOSSIER_SERVER_PORT") {
            self.server.port = parse_u16("DOSSIER_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("DOSSIER_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("DOSSIER_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env_any(&["DOSSIER_LOGGING_LEVEL", "DOSSIER_LOG_LEVEL"]) {
            self.logging.level = value;
        }
        if let Some(value) = read_env_any(&["DOSSIER_LOGGING_FORMAT", "DOSSIER_LOG_FORMAT"]) {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(api_key) = overrides.sandbox_api_key {
            self.sandbox.api_key = Some(secret_value(api_key));
        }
        if let Some(api_url) = overrides.sandbox_api_url {
            self.sandbox.api_url = api_url;
        }
        if let Some(api_key) = overrides.search_api_key {
            self.search.api_key = Some(secret_value(api_key));
        }
        if let Some(api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(api_key));
        }
        if let Some(base_url) = overrides.llm_base_url {
            self.llm.base_url = base_url;
        }
        if let Some(model) = overrides.llm_model {
            self.llm.model = model;
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_sandbox(&self.sandbox)?;
        validate_search(&self.search)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CredentialStatus {
    pub sandbox: bool,
    pub search: bool,
    pub llm: bool,
}

impl CredentialStatus {
    pub fn all_present(&self) -> bool {
        self.sandbox && self.search && self.llm
    }
}

fn has_secret(secret: Option<&SecretString>) -> bool {
    secret.map(|value| !value.expose_secret().trim().is_empty()).unwrap_or(false)
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("dossier.toml"), PathBuf::from("config/dossier.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_sandbox(sandbox: &SandboxConfig) -> Result<(), ConfigError> {
    validate_http_url("sandbox.api_url", &sandbox.api_url)?;

    if sandbox.template.trim().is_empty() {
        return Err(ConfigError::Validation("sandbox.template must not be empty".to_string()));
    }

    if sandbox.lifetime_secs == 0 || sandbox.lifetime_secs > 3600 {
        return Err(ConfigError::Validation(
            "sandbox.lifetime_secs must be in range 1..=3600".to_string(),
        ));
    }

    if sandbox.request_timeout_secs == 0 || sandbox.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "sandbox.request_timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_search(search: &SearchConfig) -> Result<(), ConfigError> {
    if search.server.trim().is_empty() {
        return Err(ConfigError::Validation("search.server must not be empty".to_string()));
    }

    if search.tool_hints.iter().all(|hint| hint.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "search.tool_hints must contain at least one non-empty hint".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    validate_http_url("llm.base_url", &llm.base_url)?;

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_http_url(key: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::Validation(format!("{key} must start with http:// or https://")));
    }
    Ok(())
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn read_env_any(keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| read_env(key))
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    sandbox: Option<SandboxPatch>,
    search: Option<SearchPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SandboxPatch {
    api_key: Option<String>,
    api_url: Option<String>,
    template: Option<String>,
    lifetime_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchPatch {
    api_key: Option<String>,
    server: Option<String>,
    tool_hints: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

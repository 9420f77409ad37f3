//! Ephemeral remote sandboxes.
//!
//! A sandbox is an isolated execution environment that can run shell commands and exposes a
//! tool-calling gateway. Orchestration code depends only on the [`SandboxProvider`] and
//! [`Sandbox`] traits; [`e2b::E2bProvider`] is the hosted implementation.

pub mod e2b;
pub mod envelope;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox API key is not configured")]
    MissingApiKey,
    #[error("sandbox provisioning failed: {0}")]
    Provisioning(String),
    #[error("sandbox command failed: {0}")]
    Command(String),
    #[error("sandbox release failed: {0}")]
    Release(String),
    #[error("sandbox protocol error: {0}")]
    Protocol(String),
}

/// Connection parameters of a provisioned sandbox.
#[derive(Clone)]
pub struct SandboxHandle {
    pub id: String,
    pub gateway_url: String,
    pub gateway_token: SecretString,
}

impl SandboxHandle {
    pub fn gateway_token(&self) -> &str {
        self.gateway_token.expose_secret()
    }
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("gateway_url", &self.gateway_url)
            .field("gateway_token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Servers the in-sandbox tool gateway should start, keyed by server name.
#[derive(Clone, Default)]
pub struct GatewaySpec {
    servers: Vec<(String, Option<SecretString>)>,
}

impl GatewaySpec {
    pub fn with_server(mut self, name: impl Into<String>, api_key: Option<SecretString>) -> Self {
        self.servers.push((name.into(), api_key));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Gateway configuration document, e.g. `{"exa":{"apiKey":"..."}}`. Servers without a key
    /// get an empty object so the gateway reports the problem at first use.
    pub fn to_config_json(&self) -> Value {
        let mut root = Map::new();
        for (name, api_key) in &self.servers {
            let mut server = Map::new();
            if let Some(api_key) = api_key {
                server.insert("apiKey".to_string(), Value::String(api_key.expose_secret().into()));
            }
            root.insert(name.clone(), Value::Object(server));
        }
        Value::Object(root)
    }
}

impl std::fmt::Debug for GatewaySpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.servers.iter().map(|(name, _)| name.as_str()).collect();
        f.debug_struct("GatewaySpec").field("servers", &names).finish()
    }
}

#[async_trait]
pub trait Sandbox: Send + Sync {
    fn handle(&self) -> &SandboxHandle;

    async fn run(&self, command: &str) -> Result<CommandOutput, SandboxError>;

    async fn kill(&self) -> Result<(), SandboxError>;

    fn id(&self) -> &str {
        &self.handle().id
    }
}

#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self, gateway: &GatewaySpec) -> Result<Arc<dyn Sandbox>, SandboxError>;
}

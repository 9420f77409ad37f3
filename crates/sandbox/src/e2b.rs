//! Hosted sandbox provider.
//!
//! The control plane (`{api_url}/sandboxes`) creates and deletes sandboxes. Commands run through
//! the in-sandbox daemon on [`ENVD_PORT`] using the Connect streaming protocol, and the tool
//! gateway listens on [`GATEWAY_PORT`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dossier_core::config::SandboxConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::envelope;
use crate::{CommandOutput, GatewaySpec, Sandbox, SandboxError, SandboxHandle, SandboxProvider};

pub const ENVD_PORT: u16 = 49983;
pub const GATEWAY_PORT: u16 = 50005;

const DEFAULT_USER: &str = "user";
const GATEWAY_USER: &str = "root";
const GATEWAY_TOKEN_ENV: &str = "GATEWAY_ACCESS_TOKEN";

struct ControlPlane {
    api_url: String,
    api_key: Option<SecretString>,
}

impl ControlPlane {
    fn api_key(&self) -> Result<&str, SandboxError> {
        self.api_key
            .as_ref()
            .map(|key| key.expose_secret())
            .filter(|key| !key.trim().is_empty())
            .ok_or(SandboxError::MissingApiKey)
    }

    fn sandboxes_url(&self) -> String {
        format!("{}/sandboxes", self.api_url.trim_end_matches('/'))
    }
}

pub struct E2bProvider {
    http: Client,
    control: Arc<ControlPlane>,
    template: String,
    lifetime_secs: u64,
    envd_base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSandbox {
    #[serde(rename = "sandboxID")]
    sandbox_id: String,
    envd_access_token: Option<String>,
    domain: Option<String>,
}

impl E2bProvider {
    pub fn from_config(config: &SandboxConfig) -> Result<Self, SandboxError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|error| SandboxError::Provisioning(format!("http client: {error}")))?;

        Ok(Self {
            http,
            control: Arc::new(ControlPlane {
                api_url: config.api_url.clone(),
                api_key: config.api_key.clone(),
            }),
            template: config.template.clone(),
            lifetime_secs: config.lifetime_secs,
            envd_base_url: None,
        })
    }

    /// Routes daemon traffic through a fixed base URL instead of the per-sandbox host, for
    /// local proxies.
    pub fn with_envd_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.envd_base_url = Some(base_url.into());
        self
    }
}

#[async_trait]
impl SandboxProvider for E2bProvider {
    async fn create(&self, gateway: &GatewaySpec) -> Result<Arc<dyn Sandbox>, SandboxError> {
        let api_key = self.control.api_key()?;
        let response = self
            .http
            .post(self.control.sandboxes_url())
            .header("X-API-Key", api_key)
            .json(&json!({
                "templateID": self.template,
                "timeout": self.lifetime_secs,
                "metadata": { "purpose": "listing-investigation" },
            }))
            .send()
            .await
            .map_err(|error| SandboxError::Provisioning(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Provisioning(format!(
                "sandbox API returned {status}: {}",
                body.trim()
            )));
        }

        let created: CreatedSandbox = response
            .json()
            .await
            .map_err(|error| SandboxError::Provisioning(format!("invalid create response: {error}")))?;
        let domain = created
            .domain
            .filter(|domain| !domain.trim().is_empty())
            .unwrap_or_else(|| domain_from_api_url(&self.control.api_url));
        let gateway_token = Uuid::new_v4().to_string();
        let id = created.sandbox_id;

        let sandbox = E2bSandbox {
            handle: SandboxHandle {
                gateway_url: format!("https://{GATEWAY_PORT}-{id}.{domain}/mcp"),
                gateway_token: SecretString::from(gateway_token.clone()),
                id: id.clone(),
            },
            envd_url: self
                .envd_base_url
                .clone()
                .unwrap_or_else(|| format!("https://{ENVD_PORT}-{id}.{domain}")),
            envd_access_token: created.envd_access_token,
            http: self.http.clone(),
            control: Arc::clone(&self.control),
        };
        info!(
            event_name = "sandbox.created",
            sandbox_id = %id,
            template = %self.template,
            "sandbox provisioned"
        );

        if !gateway.is_empty() {
            if let Err(error) = sandbox.start_gateway(gateway, &gateway_token).await {
                if let Err(kill_error) = sandbox.kill().await {
                    warn!(
                        event_name = "sandbox.release_failed",
                        sandbox_id = %id,
                        error = %kill_error,
                        "could not release sandbox after gateway start-up failure"
                    );
                }
                return Err(SandboxError::Provisioning(format!(
                    "failed to start tool gateway: {error}"
                )));
            }
        }

        Ok(Arc::new(sandbox))
    }
}

pub struct E2bSandbox {
    handle: SandboxHandle,
    envd_url: String,
    envd_access_token: Option<String>,
    http: Client,
    control: Arc<ControlPlane>,
}

impl E2bSandbox {
    async fn start_gateway(&self, gateway: &GatewaySpec, token: &str) -> Result<(), SandboxError> {
        let config = gateway.to_config_json().to_string();
        let command = format!("mcp-gateway --config {}", shell_quote(&config));
        let output = self.run_as(&command, GATEWAY_USER, &[(GATEWAY_TOKEN_ENV, token)]).await?;

        if !output.succeeded() {
            return Err(SandboxError::Command(format!(
                "gateway exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn run_as(
        &self,
        command: &str,
        user: &str,
        envs: &[(&str, &str)],
    ) -> Result<CommandOutput, SandboxError> {
        let body = serde_json::to_vec(&envelope::start_request(command, envs))
            .map_err(|error| SandboxError::Protocol(error.to_string()))?;

        let mut request = self
            .http
            .post(format!("{}/process.Process/Start", self.envd_url.trim_end_matches('/')))
            .header(reqwest::header::CONTENT_TYPE, "application/connect+json")
            .header("Connect-Protocol-Version", "1")
            .basic_auth(user, None::<&str>)
            .body(envelope::encode(&body));
        if let Some(token) = &self.envd_access_token {
            request = request.header("X-Access-Token", token);
        }

        let response =
            request.send().await.map_err(|error| SandboxError::Command(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SandboxError::Command(format!(
                "process daemon returned {status}: {}",
                body.trim()
            )));
        }

        let bytes = response.bytes().await.map_err(|error| SandboxError::Command(error.to_string()))?;
        envelope::collect_output(&envelope::decode_all(&bytes)?)
    }
}

#[async_trait]
impl Sandbox for E2bSandbox {
    fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        self.run_as(command, DEFAULT_USER, &[]).await
    }

    async fn kill(&self) -> Result<(), SandboxError> {
        let api_key = self.control.api_key()?;
        let response = self
            .http
            .delete(format!("{}/{}", self.control.sandboxes_url(), self.handle.id))
            .header("X-API-Key", api_key)
            .send()
            .await
            .map_err(|error| SandboxError::Release(error.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                warn!(
                    event_name = "sandbox.already_released",
                    sandbox_id = %self.handle.id,
                    "sandbox was already gone at release"
                );
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                return Err(SandboxError::Release(format!(
                    "sandbox API returned {status}: {}",
                    body.trim()
                )));
            }
        }

        info!(event_name = "sandbox.killed", sandbox_id = %self.handle.id, "sandbox released");
        Ok(())
    }
}

fn domain_from_api_url(api_url: &str) -> String {
    let host = api_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or_default();
    host.strip_prefix("api.").unwrap_or(host).to_string()
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use axum::body::Bytes;
    use axum::extract::{Path, State};
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::{delete, post};
    use axum::{Json, Router};
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use dossier_core::config::AppConfig;
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use super::{domain_from_api_url, shell_quote, E2bProvider};
    use crate::envelope::{decode_all, encode, END_STREAM_FLAG};
    use crate::{GatewaySpec, SandboxError, SandboxProvider};

    #[derive(Clone, Default)]
    struct Stub {
        calls: Arc<Mutex<Vec<String>>>,
        commands: Arc<Mutex<Vec<Value>>>,
        create_status: Option<StatusCode>,
        gateway_exit_code: i32,
    }

    impl Stub {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    fn frame(flags: u8, value: Value) -> Vec<u8> {
        let mut bytes = encode(value.to_string().as_bytes());
        bytes[0] = flags;
        bytes
    }

    async fn create(State(stub): State<Stub>, headers: HeaderMap) -> impl IntoResponse {
        let key = headers.get("X-API-Key").and_then(|value| value.to_str().ok()).unwrap_or("");
        stub.calls.lock().expect("calls lock").push(format!("create:{key}"));
        match stub.create_status {
            Some(status) => (status, Json(json!({"message": "denied"}))),
            None => (
                StatusCode::CREATED,
                Json(json!({
                    "sandboxID": "sbx-test",
                    "templateID": "mcp-gateway",
                    "envdAccessToken": "envd-token",
                    "domain": "e2b.test",
                })),
            ),
        }
    }

    async fn start(State(stub): State<Stub>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
        let token = headers.get("X-Access-Token").and_then(|value| value.to_str().ok());
        stub.calls.lock().expect("calls lock").push(format!("start:{}", token.unwrap_or("")));

        let envelopes = decode_all(&body).expect("request is framed");
        let request: Value = serde_json::from_slice(&envelopes[0].payload).expect("json");
        let command = request["process"]["args"][2].as_str().unwrap_or_default().to_string();
        stub.commands.lock().expect("commands lock").push(request.clone());

        let (stdout, exit_code) = if command.starts_with("mcp-gateway") {
            ("", stub.gateway_exit_code)
        } else {
            ("120000\n", 0)
        };
        let mut bytes = frame(0, json!({"event": {"start": {"pid": 1}}}));
        if !stdout.is_empty() {
            bytes.extend(frame(0, json!({"event": {"data": {"stdout": STANDARD.encode(stdout)}}})));
        }
        bytes.extend(frame(0, json!({"event": {"end": {"exitCode": exit_code, "exited": true}}})));
        bytes.extend(frame(END_STREAM_FLAG, json!({})));

        ([(header::CONTENT_TYPE, "application/connect+json")], bytes)
    }

    async fn kill(State(stub): State<Stub>, Path(id): Path<String>) -> StatusCode {
        stub.calls.lock().expect("calls lock").push(format!("kill:{id}"));
        StatusCode::NO_CONTENT
    }

    async fn spawn_stub(stub: Stub) -> String {
        let router = Router::new()
            .route("/sandboxes", post(create))
            .route("/sandboxes/{id}", delete(kill))
            .route("/process.Process/Start", post(start))
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind stub");
        let address = listener.local_addr().expect("stub address");
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("stub server");
        });
        format!("http://{address}")
    }

    fn provider(base_url: &str, api_key: Option<&str>) -> E2bProvider {
        let mut config = AppConfig::default().sandbox;
        config.api_url = base_url.to_string();
        config.api_key = api_key.map(|key| SecretString::from(key.to_string()));
        E2bProvider::from_config(&config).expect("provider").with_envd_base_url(base_url)
    }

    fn search_gateway() -> GatewaySpec {
        GatewaySpec::default().with_server("exa", Some(SecretString::from("exa-key".to_string())))
    }

    #[tokio::test]
    async fn create_starts_gateway_runs_commands_and_kills() {
        let stub = Stub::default();
        let base_url = spawn_stub(stub.clone()).await;

        let sandbox =
            provider(&base_url, Some("e2b-key")).create(&search_gateway()).await.expect("created");
        assert_eq!(sandbox.id(), "sbx-test");
        assert_eq!(sandbox.handle().gateway_url, "https://50005-sbx-test.e2b.test/mcp");

        let output = sandbox.run("python3 -c 'print(1200000 - 1080000)'").await.expect("runs");
        assert_eq!(output.stdout.trim(), "120000");
        assert_eq!(output.exit_code, 0);

        sandbox.kill().await.expect("killed");
        assert_eq!(
            stub.calls(),
            vec!["create:e2b-key", "start:envd-token", "start:envd-token", "kill:sbx-test"]
        );

        let commands = stub.commands.lock().expect("commands lock").clone();
        let gateway_command = commands[0]["process"]["args"][2].as_str().expect("command");
        assert!(gateway_command.starts_with("mcp-gateway --config '"));
        assert!(gateway_command.contains(r#""apiKey":"exa-key""#));
        assert_eq!(
            commands[0]["process"]["envs"]["GATEWAY_ACCESS_TOKEN"].as_str(),
            Some(sandbox.handle().gateway_token())
        );
    }

    #[tokio::test]
    async fn create_without_api_key_fails_before_any_request() {
        let stub = Stub::default();
        let base_url = spawn_stub(stub.clone()).await;

        let error = match provider(&base_url, None).create(&search_gateway()).await {
            Ok(_) => panic!("expected missing key error"),
            Err(error) => error,
        };
        assert!(matches!(error, SandboxError::MissingApiKey));
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_create_is_a_provisioning_error() {
        let stub = Stub { create_status: Some(StatusCode::UNAUTHORIZED), ..Stub::default() };
        let base_url = spawn_stub(stub.clone()).await;

        let error = match provider(&base_url, Some("bad")).create(&search_gateway()).await {
            Ok(_) => panic!("expected provisioning error"),
            Err(error) => error,
        };
        assert!(matches!(error, SandboxError::Provisioning(ref message) if message.contains("401")));
    }

    #[tokio::test]
    async fn gateway_start_failure_releases_the_sandbox() {
        let stub = Stub { gateway_exit_code: 1, ..Stub::default() };
        let base_url = spawn_stub(stub.clone()).await;

        let error = match provider(&base_url, Some("e2b-key")).create(&search_gateway()).await {
            Ok(_) => panic!("expected gateway failure"),
            Err(error) => error,
        };
        assert!(matches!(error, SandboxError::Provisioning(ref message) if message.contains("gateway")));
        assert_eq!(stub.calls(), vec!["create:e2b-key", "start:envd-token", "kill:sbx-test"]);
    }

    #[test]
    fn domain_is_derived_from_control_plane_host() {
        assert_eq!(domain_from_api_url("https://api.e2b.app"), "e2b.app");
        assert_eq!(domain_from_api_url("https://api.example.dev/v1"), "example.dev");
        assert_eq!(domain_from_api_url("http://127.0.0.1:8080"), "127.0.0.1:8080");
    }

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote(r#"{"a":"b"}"#), r#"'{"a":"b"}'"#);
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }
}

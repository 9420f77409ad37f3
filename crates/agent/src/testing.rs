//! In-memory collaborators for pipeline tests. Every fake records into a shared [`Journal`] so
//! tests can assert call order across the sandbox, gateway and model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dossier_mcp::{
    GatewayError, GatewayResult, ToolCatalog, ToolDescriptor, ToolGateway, ToolOutput, ToolSession,
};
use dossier_sandbox::{
    CommandOutput, GatewaySpec, Sandbox, SandboxError, SandboxHandle, SandboxProvider,
};
use secrecy::SecretString;
use serde_json::{Map, Value};

use crate::llm::{CompletionRequest, LlmClient, LlmError};

#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().expect("journal lock").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("journal lock").clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|recorded| recorded.as_str() == entry).count()
    }

    /// Entries with the argument suffix (`call_tool:...`, `run:...`) stripped.
    pub fn kinds(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .map(|entry| entry.split(':').next().unwrap_or_default().to_string())
            .collect()
    }
}

pub struct FakeToolSession {
    journal: Journal,
    tools: Vec<String>,
    outputs: VecDeque<GatewayResult<ToolOutput>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    fail_listing: bool,
    fail_close: bool,
}

impl FakeToolSession {
    pub fn new(journal: Journal, tools: &[&str]) -> Self {
        Self {
            journal,
            tools: tools.iter().map(|tool| tool.to_string()).collect(),
            outputs: VecDeque::new(),
            calls: Arc::default(),
            fail_listing: false,
            fail_close: false,
        }
    }

    pub fn with_outputs(mut self, outputs: Vec<GatewayResult<ToolOutput>>) -> Self {
        self.outputs = outputs.into();
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl ToolSession for FakeToolSession {
    async fn list_tools(&mut self) -> GatewayResult<ToolCatalog> {
        self.journal.record("list_tools");
        if self.fail_listing {
            return Err(GatewayError::Listing("session expired".to_string()));
        }
        Ok(ToolCatalog::new(self.tools.iter().map(ToolDescriptor::named).collect()))
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> GatewayResult<ToolOutput> {
        self.journal.record(format!("call_tool:{name}"));
        self.calls.lock().expect("calls lock").push((name.to_string(), Value::Object(arguments)));
        self.outputs.pop_front().unwrap_or_else(|| Ok(ToolOutput::default()))
    }

    async fn close(self: Box<Self>) -> GatewayResult<()> {
        self.journal.record("close");
        if self.fail_close {
            return Err(GatewayError::Close("connection reset".to_string()));
        }
        Ok(())
    }
}

pub struct FakeGateway {
    journal: Journal,
    session: Mutex<Option<FakeToolSession>>,
    connected_with: Mutex<Option<(String, String)>>,
}

impl FakeGateway {
    pub fn new(journal: Journal, session: FakeToolSession) -> Self {
        Self { journal, session: Mutex::new(Some(session)), connected_with: Mutex::default() }
    }

    pub fn unreachable(journal: Journal) -> Self {
        Self { journal, session: Mutex::new(None), connected_with: Mutex::default() }
    }

    pub fn connected_with(&self) -> Option<(String, String)> {
        self.connected_with.lock().expect("gateway lock").clone()
    }
}

#[async_trait]
impl ToolGateway for FakeGateway {
    async fn connect(&self, url: &str, bearer_token: &str) -> GatewayResult<Box<dyn ToolSession>> {
        self.journal.record("connect");
        *self.connected_with.lock().expect("gateway lock") =
            Some((url.to_string(), bearer_token.to_string()));
        match self.session.lock().expect("gateway lock").take() {
            Some(session) => Ok(Box::new(session)),
            None => Err(GatewayError::Connection("401 Unauthorized".to_string())),
        }
    }
}

pub enum RunBehavior {
    Output(CommandOutput),
    Fail(String),
}

pub struct FakeSandbox {
    journal: Journal,
    handle: SandboxHandle,
    run: RunBehavior,
    fail_kill: bool,
}

impl FakeSandbox {
    pub fn new(journal: Journal, id: &str) -> Self {
        Self {
            journal,
            handle: SandboxHandle {
                id: id.to_string(),
                gateway_url: format!("https://50005-{id}.e2b.test/mcp"),
                gateway_token: SecretString::from(format!("token-{id}")),
            },
            run: RunBehavior::Output(CommandOutput {
                stdout: "120000\n".to_string(),
                stderr: String::new(),
                exit_code: 0,
            }),
            fail_kill: false,
        }
    }

    pub fn with_run(mut self, run: RunBehavior) -> Self {
        self.run = run;
        self
    }

    pub fn failing_kill(mut self) -> Self {
        self.fail_kill = true;
        self
    }
}

#[async_trait]
impl Sandbox for FakeSandbox {
    fn handle(&self) -> &SandboxHandle {
        &self.handle
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        self.journal.record(format!("run:{command}"));
        match &self.run {
            RunBehavior::Output(output) => Ok(output.clone()),
            RunBehavior::Fail(message) => Err(SandboxError::Command(message.clone())),
        }
    }

    async fn kill(&self) -> Result<(), SandboxError> {
        self.journal.record("kill");
        if self.fail_kill {
            return Err(SandboxError::Release("503 Service Unavailable".to_string()));
        }
        Ok(())
    }
}

pub struct FakeProvider {
    journal: Journal,
    sandbox: Option<Arc<FakeSandbox>>,
    requested: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new(journal: Journal, sandbox: FakeSandbox) -> Self {
        Self { journal, sandbox: Some(Arc::new(sandbox)), requested: Mutex::default() }
    }

    pub fn failing(journal: Journal) -> Self {
        Self { journal, sandbox: None, requested: Mutex::default() }
    }

    /// Gateway configuration document of the last `create` call.
    pub fn requested(&self) -> Option<String> {
        self.requested.lock().expect("provider lock").clone()
    }
}

#[async_trait]
impl SandboxProvider for FakeProvider {
    async fn create(&self, gateway: &GatewaySpec) -> Result<Arc<dyn Sandbox>, SandboxError> {
        self.journal.record("create");
        *self.requested.lock().expect("provider lock") = Some(gateway.to_config_json().to_string());
        match &self.sandbox {
            Some(sandbox) => Ok(Arc::clone(sandbox) as Arc<dyn Sandbox>),
            None => Err(SandboxError::Provisioning("sandbox quota exhausted".to_string())),
        }
    }
}

pub struct FakeLlm {
    journal: Journal,
    reply: Result<String, u16>,
    last_request: Mutex<Option<CompletionRequest>>,
}

impl FakeLlm {
    pub fn replying(journal: Journal, reply: impl Into<String>) -> Self {
        Self { journal, reply: Ok(reply.into()), last_request: Mutex::default() }
    }

    pub fn failing(journal: Journal, status: u16) -> Self {
        Self { journal, reply: Err(status), last_request: Mutex::default() }
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last_request.lock().expect("llm lock").clone()
    }
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.journal.record("complete");
        *self.last_request.lock().expect("llm lock") = Some(request.clone());
        match &self.reply {
            Ok(reply) => Ok(reply.clone()),
            Err(status) => {
                Err(LlmError::Status { status: *status, body: "upstream unavailable".to_string() })
            }
        }
    }
}

//! Scoped ownership of one sandbox and its tool gateway session.

use std::sync::Arc;

use dossier_core::InvestigationLog;
use dossier_mcp::ToolSession;
use dossier_sandbox::Sandbox;
use tracing::{error, warn};

/// Owns the sandbox for the duration of an investigation. [`SandboxSession::release`] closes
/// the tool session and then kills the sandbox. A guard dropped without `release` schedules the
/// kill on the current runtime instead.
pub struct SandboxSession {
    sandbox: Arc<dyn Sandbox>,
    tools: Option<Box<dyn ToolSession>>,
    correlation_id: String,
    released: bool,
}

impl SandboxSession {
    pub fn new(sandbox: Arc<dyn Sandbox>, correlation_id: impl Into<String>) -> Self {
        Self { sandbox, tools: None, correlation_id: correlation_id.into(), released: false }
    }

    pub fn sandbox(&self) -> &dyn Sandbox {
        self.sandbox.as_ref()
    }

    pub fn attach_tools(&mut self, tools: Box<dyn ToolSession>) {
        self.tools = Some(tools);
    }

    pub fn tools_mut(&mut self) -> Option<&mut (dyn ToolSession + 'static)> {
        self.tools.as_deref_mut()
    }

    /// Releases both resources. Failures are logged and never returned.
    pub async fn release(mut self, log: &mut InvestigationLog) {
        self.released = true;
        let mut clean = true;

        let had_tools = self.tools.is_some();
        if let Some(tools) = self.tools.take() {
            if let Err(close_error) = tools.close().await {
                clean = false;
                log.warn(format!("⚠️ MCP client close failed: {close_error}"));
            }
        }

        if let Err(kill_error) = self.sandbox.kill().await {
            clean = false;
            log.warn(format!("⚠️ Sandbox kill failed: {kill_error}"));
        }

        match (clean, had_tools) {
            (true, true) => log.push("🔌 MCP client closed and sandbox killed"),
            (true, false) => log.push("🔌 Sandbox killed"),
            (false, _) => log.warn("⚠️ Sandbox session released with errors"),
        }
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let sandbox = Arc::clone(&self.sandbox);
        let correlation_id = self.correlation_id.clone();
        warn!(
            event_name = "investigation.sandbox.unreleased",
            correlation_id = %correlation_id,
            sandbox_id = %sandbox.id(),
            "sandbox session dropped without release; scheduling kill"
        );

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                // The tool session is dropped with the guard; only the sandbox needs a remote call.
                runtime.spawn(async move {
                    if let Err(kill_error) = sandbox.kill().await {
                        error!(
                            event_name = "investigation.sandbox.leaked",
                            correlation_id = %correlation_id,
                            sandbox_id = %sandbox.id(),
                            error = %kill_error,
                            "background sandbox kill failed"
                        );
                    }
                });
            }
            Err(_) => error!(
                event_name = "investigation.sandbox.leaked",
                correlation_id = %correlation_id,
                sandbox_id = %sandbox.id(),
                "no runtime available to kill sandbox"
            ),
        }
    }
}

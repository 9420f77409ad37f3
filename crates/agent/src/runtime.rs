use std::sync::Arc;

use dossier_core::config::AppConfig;
use dossier_core::{
    format_thousands, AnalysisResult, EvidenceItem, InvestigationError, InvestigationFailure,
    InvestigationLog, InvestigationRequest, InvestigationResult, ParsedPricing, SavingsCheck,
    FALLBACK_ASKING_PRICE,
};
use dossier_mcp::{RmcpGateway, SubstringSelector, ToolGateway, ToolSelector};
use dossier_sandbox::e2b::E2bProvider;
use dossier_sandbox::{GatewaySpec, SandboxProvider};
use tracing::{error, info};

use crate::analysis::AnalysisGenerator;
use crate::computation::verify_savings;
use crate::evidence::collect_evidence;
use crate::llm::{ChatCompletionsClient, LlmClient};
use crate::session::SandboxSession;

/// Runs investigations end to end. Holds no per-request state, so one runtime serves any
/// number of concurrent requests.
pub struct InvestigationRuntime {
    sandboxes: Arc<dyn SandboxProvider>,
    gateway: Arc<dyn ToolGateway>,
    selector: Arc<dyn ToolSelector>,
    analysis: AnalysisGenerator,
    gateway_spec: GatewaySpec,
}

struct Findings {
    evidence: Vec<EvidenceItem>,
    analysis: AnalysisResult,
    savings: SavingsCheck,
    pricing: ParsedPricing,
    sandbox_id: String,
}

impl InvestigationRuntime {
    pub fn new(
        sandboxes: Arc<dyn SandboxProvider>,
        gateway: Arc<dyn ToolGateway>,
        selector: Arc<dyn ToolSelector>,
        llm: Arc<dyn LlmClient>,
        gateway_spec: GatewaySpec,
    ) -> Self {
        Self { sandboxes, gateway, selector, analysis: AnalysisGenerator::new(llm), gateway_spec }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, InvestigationError> {
        let sandboxes = E2bProvider::from_config(&config.sandbox)
            .map_err(|error| InvestigationError::Configuration(error.to_string()))?;
        let llm = ChatCompletionsClient::from_config(&config.llm)
            .map_err(|error| InvestigationError::Configuration(error.to_string()))?;
        info!(
            event_name = "agent.runtime.configured",
            correlation_id = "bootstrap",
            model = llm.model(),
            template = %config.sandbox.template,
            "investigation runtime configured"
        );
        let gateway_spec = GatewaySpec::default()
            .with_server(config.search.server.clone(), config.search.api_key.clone());

        Ok(Self::new(
            Arc::new(sandboxes),
            Arc::new(RmcpGateway::new()),
            Arc::new(SubstringSelector::from_config(&config.search)),
            Arc::new(llm),
            gateway_spec,
        ))
    }

    /// Runs one investigation. On failure the envelope carries every log line recorded up to
    /// and including the terminal error.
    pub async fn investigate(
        &self,
        request: &InvestigationRequest,
        mut log: InvestigationLog,
    ) -> Result<InvestigationResult, InvestigationFailure> {
        match self.execute(request, &mut log).await {
            Ok(findings) => {
                info!(
                    event_name = "investigation.completed",
                    correlation_id = %log.correlation_id(),
                    sandbox_id = %findings.sandbox_id,
                    evidence = findings.evidence.len(),
                    risk_score = findings.analysis.risk_score,
                    "investigation completed"
                );
                Ok(InvestigationResult::assemble(
                    findings.evidence,
                    findings.analysis,
                    findings.savings,
                    &findings.pricing,
                    findings.sandbox_id,
                    log,
                ))
            }
            Err(failure) => {
                let interface = failure.into_interface(log.correlation_id());
                log.warn(format!("❌ CRITICAL ERROR: {}", interface.message()));
                error!(
                    event_name = "investigation.failed",
                    correlation_id = %interface.correlation_id(),
                    error = %interface,
                    "investigation failed"
                );
                Err(InvestigationFailure {
                    error: interface.message().to_string(),
                    logs: log.into_lines(),
                })
            }
        }
    }

    async fn execute(
        &self,
        request: &InvestigationRequest,
        log: &mut InvestigationLog,
    ) -> Result<Findings, InvestigationError> {
        log.push("🚀 Starting investigation...");
        log.push(format!("📍 Address: {}", request.address()));
        log.push(format!("💰 Price: {}", request.price()));
        log.push("🏗️ Creating sandbox with MCP integration...");

        let pricing = ParsedPricing::parse(request.price());
        if pricing.used_fallback() {
            log.warn(format!(
                "⚠️ Could not read a price from {:?}; assuming ${}",
                request.price(),
                format_thousands(FALLBACK_ASKING_PRICE)
            ));
        }

        let sandbox = self
            .sandboxes
            .create(&self.gateway_spec)
            .await
            .map_err(|error| InvestigationError::Provisioning(error.to_string()))?;
        let sandbox_id = sandbox.id().to_string();
        log.push(format!("✅ Sandbox Created: {sandbox_id}"));
        info!(
            event_name = "investigation.sandbox.created",
            correlation_id = %log.correlation_id(),
            sandbox_id = %sandbox_id,
            "sandbox ready"
        );

        let handle = sandbox.handle().clone();
        let mut session = SandboxSession::new(sandbox, log.correlation_id());

        log.push(format!("🔌 Connecting to MCP Gateway at {}...", handle.gateway_url));
        let evidence = match self.gateway.connect(&handle.gateway_url, handle.gateway_token()).await
        {
            Ok(tools) => {
                log.push("🔗 Connected to MCP Gateway");
                session.attach_tools(tools);
                match session.tools_mut() {
                    Some(tools) => {
                        collect_evidence(tools, self.selector.as_ref(), request.address(), log)
                            .await
                    }
                    None => Vec::new(),
                }
            }
            Err(connect_error) => {
                log.warn(format!("⚠️ MCP gateway unavailable: {connect_error}"));
                Vec::new()
            }
        };

        let savings = verify_savings(session.sandbox(), &pricing, log).await;
        session.release(log).await;

        log.push("⚡ Generating negotiation analysis...");
        let analysis = self
            .analysis
            .generate(request.address(), &evidence, &pricing)
            .await
            .map_err(|error| InvestigationError::Analysis(error.to_string()))?;
        log.push(format!("✅ Analysis ready: risk score {}", analysis.risk_score));

        Ok(Findings { evidence, analysis, savings, pricing, sandbox_id })
    }
}

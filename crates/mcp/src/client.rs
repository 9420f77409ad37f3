use async_trait::async_trait;
use rmcp::model::CallToolRequestParams;
use rmcp::service::RunningService;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::{RoleClient, ServiceExt};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    ContentBlock, GatewayError, GatewayResult, ToolCatalog, ToolDescriptor, ToolGateway,
    ToolOutput, ToolSession,
};

/// Streamable-HTTP gateway client.
#[derive(Clone, Debug, Default)]
pub struct RmcpGateway;

impl RmcpGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolGateway for RmcpGateway {
    async fn connect(&self, url: &str, bearer_token: &str) -> GatewayResult<Box<dyn ToolSession>> {
        // The transport adds the `Bearer ` prefix itself.
        let config = StreamableHttpClientTransportConfig::with_uri(url.to_string())
            .auth_header(bearer_token.to_string());
        let transport = StreamableHttpClientTransport::from_config(config);

        let service = ()
            .serve(transport)
            .await
            .map_err(|error| GatewayError::Connection(error.to_string()))?;

        info!(event_name = "gateway.connected", url = %url, "tool gateway session established");
        Ok(Box::new(RmcpSession { service }))
    }
}

struct RmcpSession {
    service: RunningService<RoleClient, ()>,
}

#[async_trait]
impl ToolSession for RmcpSession {
    async fn list_tools(&mut self) -> GatewayResult<ToolCatalog> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|error| GatewayError::Listing(error.to_string()))?;

        Ok(ToolCatalog::new(
            tools
                .into_iter()
                .map(|tool| ToolDescriptor::named(tool.name.to_string()))
                .collect(),
        ))
    }

    async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> GatewayResult<ToolOutput> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: Some(arguments),
                task: None,
            })
            .await
            .map_err(|error| GatewayError::Call { tool: name.to_string(), message: error.to_string() })?;

        let blocks = result
            .content
            .iter()
            .map(|content| match content.as_text() {
                Some(text) => ContentBlock::Text(text.text.clone()),
                None => ContentBlock::Other,
            })
            .collect::<Vec<_>>();
        debug!(event_name = "gateway.tool_called", tool = %name, blocks = blocks.len());

        Ok(ToolOutput { blocks, is_error: result.is_error.unwrap_or(false) })
    }

    async fn close(self: Box<Self>) -> GatewayResult<()> {
        self.service.cancel().await.map_err(|error| GatewayError::Close(error.to_string()))?;
        info!(event_name = "gateway.closed", "tool gateway session closed");
        Ok(())
    }
}

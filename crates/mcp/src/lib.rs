//! Dossier MCP (Model Context Protocol) client
//!
//! This crate connects to the tool gateway running inside a sandbox, discovers its tools, and
//! turns search tool output into evidence lines.
//!
//! ## Architecture
//!
//! - [`ToolGateway`] / [`ToolSession`]: the seam orchestration code depends on
//! - `client`: [`RmcpGateway`], the streamable-HTTP implementation built on `rmcp`
//! - `select`: strategies for picking the search tool out of a catalog
//! - `normalize`: search result parsing and evidence formatting

mod client;
pub mod normalize;
pub mod select;

pub use client::RmcpGateway;
pub use normalize::{SearchHit, SearchPayload};
pub use select::{SubstringSelector, ToolSelector};

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while talking to the tool gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("could not connect to tool gateway: {0}")]
    Connection(String),

    #[error("could not list gateway tools: {0}")]
    Listing(String),

    #[error("tool `{tool}` failed: {message}")]
    Call { tool: String, message: String },

    #[error("could not close gateway session: {0}")]
    Close(String),
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
}

impl ToolDescriptor {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Tools advertised by a gateway, in the order it listed them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<ToolDescriptor>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|tool| tool.name.as_str()).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentBlock {
    Text(String),
    /// Images, audio, embedded resources. Never turned into evidence.
    Other,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub blocks: Vec<ContentBlock>,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self { blocks: vec![ContentBlock::Text(text.into())], is_error: false }
    }

    pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            ContentBlock::Other => None,
        })
    }

    /// Concatenated text, used as the message when the gateway flags the call as failed.
    pub fn error_message(&self) -> String {
        let text = self.text_blocks().collect::<Vec<_>>().join(" ");
        if text.trim().is_empty() {
            "tool reported an error".to_string()
        } else {
            text
        }
    }
}

#[async_trait]
pub trait ToolSession: Send {
    async fn list_tools(&mut self) -> GatewayResult<ToolCatalog>;

    async fn call_tool(&mut self, name: &str, arguments: Map<String, Value>)
        -> GatewayResult<ToolOutput>;

    async fn close(self: Box<Self>) -> GatewayResult<()>;
}

#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn connect(&self, url: &str, bearer_token: &str) -> GatewayResult<Box<dyn ToolSession>>;
}

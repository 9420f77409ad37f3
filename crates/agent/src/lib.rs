//! Investigation runtime - sandbox-backed evidence gathering and negotiation analysis
//!
//! This crate drives one investigation from request to result:
//! - Provisions a sandbox with a search-capable tool gateway (`session`)
//! - Runs the fixed query set through the gateway's search tool (`evidence`)
//! - Cross-checks the savings figure inside the sandbox (`computation`)
//! - Asks a language model for a risk score and negotiation email (`analysis`, `llm`)
//!
//! # Key Types
//!
//! - `InvestigationRuntime` - Main orchestrator (see `runtime` module)
//! - `LlmClient` - Pluggable trait for OpenAI-compatible chat completion providers
//! - `SandboxSession` - Guard that releases the tool session and sandbox on every path
//!
//! # Failure Principle
//!
//! Only provisioning and model failures end an investigation. Everything else degrades to a
//! logged warning and a default value.

pub mod analysis;
pub mod computation;
pub mod evidence;
pub mod llm;
pub mod runtime;
pub mod session;

#[cfg(test)]
mod testing;

pub use runtime::InvestigationRuntime;
pub use session::SandboxSession;

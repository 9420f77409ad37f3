use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::pricing::ParsedPricing;
use crate::trace::InvestigationLog;

/// Correlation id for one investigation run, attached to every tracing event it emits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvestigationId(pub String);

impl InvestigationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InvestigationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("address is required")]
    MissingAddress,
    #[error("price is required")]
    MissingPrice,
}

/// Caller input. Both fields are guaranteed non-blank once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InvestigationRequest {
    address: String,
    price: String,
}

impl InvestigationRequest {
    pub fn new(address: impl Into<String>, price: impl Into<String>) -> Result<Self, RequestError> {
        let address = address.into();
        let price = price.into();

        if address.trim().is_empty() {
            return Err(RequestError::MissingAddress);
        }
        if price.trim().is_empty() {
            return Err(RequestError::MissingPrice);
        }

        Ok(Self { address, price })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn price(&self) -> &str {
        &self.price
    }
}

pub type EvidenceItem = String;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub risk_score: u8,
    pub email_text: String,
}

impl AnalysisResult {
    pub const DEFAULT_RISK_SCORE: u8 = 50;
    pub const DEFAULT_EMAIL_TEXT: &'static str = "Draft email not available.";
}

impl Default for AnalysisResult {
    fn default() -> Self {
        Self {
            risk_score: Self::DEFAULT_RISK_SCORE,
            email_text: Self::DEFAULT_EMAIL_TEXT.to_string(),
        }
    }
}

/// Outcome of the in-sandbox savings computation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SavingsCheck {
    pub amount: i64,
    /// True only when the command ran, exited cleanly and printed an integer.
    pub verified: bool,
}

impl SavingsCheck {
    pub fn verified(amount: i64) -> Self {
        Self { amount, verified: true }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationResult {
    pub evidence: Vec<EvidenceItem>,
    pub email: String,
    pub risk_score: u8,
    pub savings: i64,
    pub savings_verified: bool,
    pub offer_price: u64,
    pub sandbox_id: String,
    pub sandbox_logs: Vec<String>,
}

impl InvestigationResult {
    pub fn assemble(
        evidence: Vec<EvidenceItem>,
        analysis: AnalysisResult,
        savings: SavingsCheck,
        pricing: &ParsedPricing,
        sandbox_id: impl Into<String>,
        log: InvestigationLog,
    ) -> Self {
        Self {
            evidence,
            email: analysis.email_text,
            risk_score: analysis.risk_score,
            savings: savings.amount,
            savings_verified: savings.verified,
            offer_price: pricing.target_offer(),
            sandbox_id: sandbox_id.into(),
            sandbox_logs: log.into_lines(),
        }
    }
}

/// Failure envelope returned at the boundary; carries the log trail up to the failure point.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationFailure {
    pub error: String,
    pub logs: Vec<String>,
}

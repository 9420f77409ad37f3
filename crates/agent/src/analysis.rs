//! Negotiation analysis: prompt construction and tolerant parsing of the model's JSON reply.

use std::sync::Arc;

use dossier_core::{format_thousands, AnalysisResult, EvidenceItem, ParsedPricing};
use serde_json::Value;
use tracing::warn;

use crate::llm::{ChatMessage, CompletionRequest, LlmClient, LlmError};

pub const SYSTEM_PROMPT: &str = "You are a ruthless real estate negotiator working for the buyer. \
Analyze the evidence and write a lowball offer email. You must output JSON.";

pub fn build_request(
    address: &str,
    evidence: &[EvidenceItem],
    pricing: &ParsedPricing,
) -> CompletionRequest {
    let evidence_json = serde_json::to_string(evidence).unwrap_or_else(|_| "[]".to_string());
    let user = format!(
        "Address: {address}
Evidence Found: {evidence_json}
Asking Price: ${asking}
Target Offer: ${target}

1. Calculate a \"Risk Score\" (0-100) based on the evidence (High score = Bad property).
2. Write a negotiation email citing the specific evidence to justify the lower offer.

Return JSON format:
{{
  \"risk_score\": number,
  \"email_text\": \"string\"
}}",
        asking = format_thousands(pricing.asking_price()),
        target = format_thousands(pricing.target_offer()),
    );

    CompletionRequest {
        messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
        json_object: true,
    }
}

/// Reads the model reply. Unparsable or partial JSON falls back field by field.
pub fn parse_analysis(raw: &str) -> AnalysisResult {
    let document = match serde_json::from_str::<Value>(raw) {
        Ok(document) => document,
        Err(error) => {
            warn!(event_name = "analysis.unparsable", error = %error, "model reply was not JSON");
            Value::Null
        }
    };

    let email_text = document
        .get("email_text")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| AnalysisResult::DEFAULT_EMAIL_TEXT.to_string());
    let risk_score = document
        .get("risk_score")
        .and_then(risk_score_from)
        .unwrap_or(AnalysisResult::DEFAULT_RISK_SCORE);

    AnalysisResult { risk_score, email_text }
}

fn risk_score_from(value: &Value) -> Option<u8> {
    let score = match value {
        // Zero reads as unset, like a missing score.
        Value::Number(number) if number.as_f64() == Some(0.0) => return None,
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !score.is_finite() {
        return None;
    }
    Some(score.round().clamp(0.0, 100.0) as u8)
}

pub struct AnalysisGenerator {
    client: Arc<dyn LlmClient>,
}

impl AnalysisGenerator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub async fn generate(
        &self,
        address: &str,
        evidence: &[EvidenceItem],
        pricing: &ParsedPricing,
    ) -> Result<AnalysisResult, LlmError> {
        let raw = self.client.complete(&build_request(address, evidence, pricing)).await?;
        Ok(parse_analysis(&raw))
    }
}

#[cfg(test)]
mod tests {
    use dossier_core::{AnalysisResult, ParsedPricing};

    use super::{build_request, parse_analysis, SYSTEM_PROMPT};
    use crate::llm::Role;

    #[test]
    fn prompt_embeds_address_evidence_and_formatted_prices() {
        let evidence = vec!["- Loud parties: complaints...".to_string()];
        let request = build_request(
            "520 Leavenworth St, San Francisco, CA",
            &evidence,
            &ParsedPricing::parse("1,200,000"),
        );

        assert!(request.json_object);
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, SYSTEM_PROMPT);

        let user = &request.messages[1].content;
        assert!(user.starts_with("Address: 520 Leavenworth St, San Francisco, CA\n"));
        assert!(user.contains("Evidence Found: [\"- Loud parties: complaints...\"]\n"));
        assert!(user.contains("Asking Price: $1,200,000\nTarget Offer: $1,080,000\n"));
        assert!(user.contains("\"risk_score\": number"));
        assert!(user.ends_with("}"));
    }

    #[test]
    fn empty_evidence_serializes_as_empty_array() {
        let request = build_request("1 Main St", &[], &ParsedPricing::parse("500000"));
        assert!(request.messages[1].content.contains("Evidence Found: []\n"));
    }

    #[test]
    fn well_formed_reply_is_used() {
        let analysis = parse_analysis(r#"{"risk_score":72,"email_text":"Dear seller..."}"#);
        assert_eq!(analysis, AnalysisResult { risk_score: 72, email_text: "Dear seller...".into() });
    }

    #[test]
    fn empty_or_unparsable_reply_uses_defaults() {
        for raw in ["{}", "not json", "", "[1,2]", r#"{"risk_score":null,"email_text":"  "}"#] {
            assert_eq!(parse_analysis(raw), AnalysisResult::default(), "{raw}");
        }
    }

    #[test]
    fn zero_risk_score_falls_back_to_default() {
        assert_eq!(parse_analysis(r#"{"risk_score":0}"#).risk_score, 50);
        assert_eq!(parse_analysis(r#"{"risk_score":0.0,"email_text":"Hi"}"#).risk_score, 50);
    }

    #[test]
    fn risk_score_accepts_floats_strings_and_is_clamped() {
        assert_eq!(parse_analysis(r#"{"risk_score":71.6}"#).risk_score, 72);
        assert_eq!(parse_analysis(r#"{"risk_score":"35"}"#).risk_score, 35);
        assert_eq!(parse_analysis(r#"{"risk_score":140}"#).risk_score, 100);
        assert_eq!(parse_analysis(r#"{"risk_score":-5}"#).risk_score, 0);
        assert_eq!(parse_analysis(r#"{"risk_score":0.3}"#).risk_score, 0);
        assert_eq!(parse_analysis(r#"{"risk_score":"high"}"#).risk_score, 50);
    }
}

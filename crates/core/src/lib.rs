pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;
pub mod trace;

pub use domain::investigation::{
    AnalysisResult, EvidenceItem, InvestigationFailure, InvestigationId, InvestigationRequest,
    InvestigationResult, RequestError, SavingsCheck,
};
pub use errors::{InterfaceError, InvestigationError};
pub use pricing::{format_thousands, ParsedPricing, FALLBACK_ASKING_PRICE};
pub use trace::{InvestigationLog, LogSink};

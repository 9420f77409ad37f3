use thiserror::Error;

/// Terminal failures of an investigation. Everything with a safe fallback is absorbed inside
/// the pipeline and never becomes one of these.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InvestigationError {
    #[error("sandbox provisioning failed: {0}")]
    Provisioning(String),
    #[error("analysis generation failed: {0}")]
    Analysis(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("method not allowed")]
    MethodNotAllowed { correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "Address and price are required",
            Self::MethodNotAllowed { .. } => "Method not allowed",
            Self::Internal { .. } => "Unknown error occurred",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::MethodNotAllowed { .. } => 405,
            Self::Internal { .. } => 500,
        }
    }

    /// Detail for the `error` field of a response envelope.
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. } | Self::Internal { message, .. } => message,
            Self::MethodNotAllowed { .. } => self.user_message(),
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::MethodNotAllowed { correlation_id }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl InvestigationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::MethodNotAllowed { correlation_id: id }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }

    /// Message surfaced in the `error` field of the failure envelope.
    pub fn detail(&self) -> &str {
        match self {
            Self::Provisioning(message)
            | Self::Analysis(message)
            | Self::Configuration(message) => message,
        }
    }
}

impl From<InvestigationError> for InterfaceError {
    fn from(value: InvestigationError) -> Self {
        let message = match value.detail().trim() {
            "" => value.to_string(),
            detail => detail.to_string(),
        };
        Self::Internal { message, correlation_id: "unassigned".to_owned() }
    }
}

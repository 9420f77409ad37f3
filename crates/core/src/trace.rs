//! Ordered, append-only progress log for a single investigation.
//!
//! Lines are the user-facing trail returned with both the result and the failure envelope.
//! Each line is also mirrored as a structured `tracing` event and, when a [`LogSink`] is
//! attached, forwarded as soon as it is appended so a client can watch progress live.

use std::sync::Arc;

use tracing::{info, warn};

/// Receives log lines as they are appended.
pub trait LogSink: Send + Sync {
    fn emit(&self, line: &str);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

pub struct InvestigationLog {
    correlation_id: String,
    lines: Vec<String>,
    sink: Option<Arc<dyn LogSink>>,
}

impl InvestigationLog {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), lines: Vec::new(), sink: None }
    }

    pub fn with_sink(correlation_id: impl Into<String>, sink: Arc<dyn LogSink>) -> Self {
        Self { sink: Some(sink), ..Self::new(correlation_id) }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn push(&mut self, line: impl Into<String>) {
        self.record(LogLevel::Info, line.into());
    }

    pub fn warn(&mut self, line: impl Into<String>) {
        self.record(LogLevel::Warn, line.into());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    fn record(&mut self, level: LogLevel, line: String) {
        match level {
            LogLevel::Info => info!(
                event_name = "investigation.log",
                correlation_id = %self.correlation_id,
                sequence = self.lines.len(),
                "{line}"
            ),
            LogLevel::Warn => warn!(
                event_name = "investigation.log",
                correlation_id = %self.correlation_id,
                sequence = self.lines.len(),
                "{line}"
            ),
        }

        if let Some(sink) = &self.sink {
            sink.emit(&line);
        }
        self.lines.push(line);
    }
}

impl std::fmt::Debug for InvestigationLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvestigationLog")
            .field("correlation_id", &self.correlation_id)
            .field("lines", &self.lines)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}

//! Search tool selection strategies.

use dossier_core::config::SearchConfig;

use crate::{ToolCatalog, ToolDescriptor};

pub trait ToolSelector: Send + Sync {
    fn select<'a>(&self, catalog: &'a ToolCatalog) -> Option<&'a ToolDescriptor>;
}

/// Picks the first listed tool whose name contains any of the hints. Matching is
/// case-sensitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubstringSelector {
    hints: Vec<String>,
}

impl SubstringSelector {
    pub fn new<I, S>(hints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hints: hints
                .into_iter()
                .map(Into::into)
                .filter(|hint: &String| !hint.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(config.tool_hints.iter().cloned())
    }
}

impl Default for SubstringSelector {
    fn default() -> Self {
        Self::new(["exa", "search"])
    }
}

impl ToolSelector for SubstringSelector {
    fn select<'a>(&self, catalog: &'a ToolCatalog) -> Option<&'a ToolDescriptor> {
        catalog
            .tools()
            .iter()
            .find(|tool| self.hints.iter().any(|hint| tool.name.contains(hint.as_str())))
    }
}

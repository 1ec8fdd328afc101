//! Per-invocation run context.
//!
//! `RunContext` carries caller-supplied settings that are not part of the
//! persisted `WorkflowState`: the correlation id used for tracing and any
//! explicit tool-pool preferences. A resumed run gets a fresh context.

use std::collections::BTreeMap;

use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunContext {
    /// Identifier threaded through every tracing span of the invocation.
    pub correlation_id: String,
    /// Pool name -> preferred candidate name.
    pub preferred_tools: BTreeMap<String, String>,
}

impl RunContext {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            preferred_tools: BTreeMap::new(),
        }
    }

    /// Context with a generated time-sortable correlation id.
    pub fn generated() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }

    pub fn with_preferred_tool(mut self, pool: impl Into<String>, tool: impl Into<String>) -> Self {
        self.preferred_tools.insert(pool.into(), tool.into());
        self
    }

    pub fn preferred_tool(&self, pool: &str) -> Option<&str> {
        self.preferred_tools.get(pool).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferences_by_pool() {
        let ctx = RunContext::new("corr-1")
            .with_preferred_tool("ocr", "tesseract")
            .with_preferred_tool("erp_connectors", "netsuite");
        assert_eq!(ctx.preferred_tool("ocr"), Some("tesseract"));
        assert_eq!(ctx.preferred_tool("enrichment"), None);
        assert_eq!(ctx.correlation_id, "corr-1");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(RunContext::generated().correlation_id, RunContext::generated().correlation_id);
    }
}

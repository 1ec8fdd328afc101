//! Tool invoker trait.
//!
//! The engine never calls tools directly: every ability call goes through a
//! `ToolInvoker`, which maps a logical provider group (`server`) and tool
//! name to some implementation. `invoiceflow-infra` provides the local
//! provider groups; tests supply scripted fakes.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from a tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// No provider group with this name.
    #[error("unknown tool server: '{0}'")]
    UnknownServer(String),

    /// The provider group exists but does not offer this tool.
    #[error("tool '{tool}' not found on server '{server}'")]
    UnknownTool { server: String, tool: String },

    /// The tool ran and failed.
    #[error("tool '{tool}' failed: {message}")]
    Failed { tool: String, message: String },
}

/// Invokes a tool on a logical provider group.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait ToolInvoker: Send + Sync {
    /// Call `tool` on `server` with the given payload. Results are open maps;
    /// the caller decides how to fold them into state.
    fn invoke(
        &self,
        server: &str,
        tool: &str,
        payload: &Value,
    ) -> impl std::future::Future<Output = Result<Map<String, Value>, ToolError>> + Send;
}

//! The tool contract every toolkit method implements (§4.5). Fresh trait, independent of the
//! legacy agent-framework `tools/` tree: that tree's `Tool`/`ToolError` types assumed ambient
//! context-variable state this design replaces with an explicit [`super::context::ToolContext`].

use async_trait::async_trait;
use serde_json::Value;

use super::context::ToolContext;


#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool call failed: {0}")]
    Failed(String),
    #[error("permission denied for {toolkit_name}.{method_name}")]
    PermissionDenied {
        toolkit_name: String,
        method_name: String,
    },
}

/// Identifies a callable method for approval-tier classification and event previews.
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub toolkit_name: String,
    pub method_name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn call(&self, args: Value, ctx: &ToolContext) -> Result<String, ToolError>;
}

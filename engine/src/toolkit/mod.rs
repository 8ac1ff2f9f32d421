//! Toolkit interception and the human-approval gate (§4.5).

mod approval;
mod context;
mod contract;
pub mod file;
mod invoker;
mod registry;

pub use approval::{
    approval_tier, ApprovalChannelRegistry, ApprovalDecision, ApprovalTier, APPROVAL_WAIT_TIMEOUT,
};
pub use context::ToolContext;
pub use contract::{Tool, ToolError, ToolSpec};
pub use invoker::ToolInvoker;
pub use registry::ToolRegistry;

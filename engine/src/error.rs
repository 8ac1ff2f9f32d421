//! Crate-level error taxonomy (§7). Every leaf error enum composes into [`EngineError`] via
//! `#[from]`; the run loop converts any `EngineError` into an `error` + `end{result:"error"}`
//! event pair rather than letting it escape the turn.

use crate::artifacts::ArtifactError;
use crate::core_client::CoreClientError;
use crate::provider::ProviderError;
use crate::skills::SkillError;
use crate::toolkit::ToolError;
use crate::workforce::WorkforceError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no usable provider configured")]
    ProviderUnavailable,

    #[error("provider request failed: {0}")]
    ProviderHttp(#[from] ProviderError),

    #[error("decomposition request failed: {0}")]
    DecompositionFailed(String),

    #[error("tool call denied: {0}")]
    ToolPermissionDenied(String),

    #[error("skill output contract failed: {0}")]
    SkillContractFailed(String),

    #[error("turn cancelled")]
    Cancelled,

    #[error("core service unreachable: {0}")]
    CoreUnreachable(#[from] CoreClientError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Skill(#[from] SkillError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl EngineError {
    /// The `end.result` reason surfaced to the client for this error (§7 propagation policy).
    pub fn result_reason(&self) -> &'static str {
        match self {
            EngineError::Cancelled => "stopped",
            _ => "error",
        }
    }
}

impl From<WorkforceError> for EngineError {
    fn from(err: WorkforceError) -> Self {
        match err {
            WorkforceError::EmptyDecomposition => {
                EngineError::DecompositionFailed("Decomposition failed".to_string())
            }
            WorkforceError::Provider(e) => EngineError::ProviderHttp(e),
        }
    }
}

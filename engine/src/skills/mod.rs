//! Skill packs: detection, policy injection, validation, and bounded repair (§4.6).

pub mod engine;
pub mod filenames;
pub mod repair;
pub mod schema;
pub mod validators;

pub use engine::{
    attachment_extensions, detect_triggered, expand_research_queries, explicit_filenames,
    inject_policy, RunState, SkillObserver, SkillsMode,
};
pub use repair::{repair, RepairAction, RepairedArtifact};
pub use schema::{load_skill_packs, RuntimeSkill, SkillPackLoadResult};
pub use validators::{validate_skill_contract, SkillValidationResult, ValidationIssue};

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("skill output contract failed: {0}")]
    ContractFailed(String),
}

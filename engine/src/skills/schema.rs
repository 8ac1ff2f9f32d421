//! Skill pack TOML schema and loading (§4.6). A pack is a directory `<skills_root>/<id>/` with
//! `skill.toml`, an optional `policy.md`, and an optional `templates/*.md` directory.

use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SkillTriggerConfig {
    #[serde(default)]
    pub regex: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SkillOutputContractConfig {
    #[serde(default)]
    pub required_artifact: bool,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub minimum_artifacts: u32,
    #[serde(default)]
    pub description: String,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SkillValidationConfig {
    #[serde(default)]
    pub rules: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SkillRetryPolicyConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub strategies: Vec<String>,
}

impl Default for SkillRetryPolicyConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategies: Vec::new(),
        }
    }
}

fn default_max_attempts() -> u32 {
    1
}

#[derive(Clone, Debug, Deserialize)]
pub struct SkillPackConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default)]
    pub force_complex: bool,
    #[serde(default)]
    pub required_tools: Vec<String>,
    #[serde(default)]
    pub prompt_instructions: Vec<String>,
    #[serde(default)]
    pub triggers: SkillTriggerConfig,
    #[serde(default)]
    pub output_contract: SkillOutputContractConfig,
    #[serde(default)]
    pub validation_rules: SkillValidationConfig,
    #[serde(default)]
    pub retry_policy: SkillRetryPolicyConfig,
}

/// A loaded, ready-to-match skill. Trigger patterns are compiled once at load time; an invalid
/// regex in a pack is dropped rather than failing the whole pack.
#[derive(Clone)]
pub struct RuntimeSkill {
    pub id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub domains: Vec<String>,
    pub file_extensions: Vec<String>,
    pub force_complex: bool,
    pub prompt_instructions: Vec<String>,
    pub required_tools: Vec<String>,
    pub output_contract: SkillOutputContractConfig,
    pub validation_rules: Vec<String>,
    pub retry_policy: SkillRetryPolicyConfig,
    pub policy_markdown: String,
    pub templates: std::collections::BTreeMap<String, String>,
    compiled_patterns: Vec<Regex>,
}

impl RuntimeSkill {
    /// Compiles `config.triggers.regex` (dropping any pattern that fails to compile) and
    /// assembles a ready-to-match skill.
    pub fn from_config(
        config: SkillPackConfig,
        policy_markdown: String,
        templates: std::collections::BTreeMap<String, String>,
    ) -> Self {
        let compiled_patterns = config
            .triggers
            .regex
            .iter()
            .filter_map(|p| regex::RegexBuilder::new(p).case_insensitive(true).build().ok())
            .collect();
        Self {
            id: config.id,
            name: config.name,
            version: config.version,
            description: config.description,
            domains: config.domains,
            file_extensions: config
                .triggers
                .extensions
                .into_iter()
                .map(|e| e.to_lowercase())
                .collect(),
            force_complex: config.force_complex,
            prompt_instructions: config.prompt_instructions,
            required_tools: config.required_tools,
            output_contract: config.output_contract,
            validation_rules: config.validation_rules.rules,
            retry_policy: config.retry_policy,
            policy_markdown,
            templates,
            compiled_patterns,
        }
    }

    pub fn matches_question(&self, question: &str) -> bool {
        if question.is_empty() {
            return false;
        }
        self.compiled_patterns.iter().any(|p| p.is_match(question))
    }

    pub fn matches_extensions(&self, extensions: &std::collections::HashSet<String>) -> bool {
        let normalized: std::collections::HashSet<String> =
            extensions.iter().map(|e| e.to_lowercase()).collect();
        self.file_extensions
            .iter()
            .any(|ext| normalized.contains(&ext.to_lowercase()))
    }
}

#[derive(Default)]
pub struct SkillPackLoadResult {
    pub skills: Vec<RuntimeSkill>,
    pub errors: Vec<String>,
}

/// Loads every `<skillpack_root>/*/skill.toml` in sorted directory order, guaranteeing
/// deterministic trigger-detection ordering (§4.6).
pub fn load_skill_packs(skillpack_root: &Path) -> SkillPackLoadResult {
    let mut result = SkillPackLoadResult::default();
    if !skillpack_root.is_dir() {
        return result;
    }

    let mut pack_dirs: Vec<PathBuf> = match std::fs::read_dir(skillpack_root) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_dir() && p.join("skill.toml").is_file())
            .collect(),
        Err(_) => return result,
    };
    pack_dirs.sort();

    for pack_dir in pack_dirs {
        let toml_path = pack_dir.join("skill.toml");
        let raw = match std::fs::read_to_string(&toml_path) {
            Ok(raw) => raw,
            Err(e) => {
                result.errors.push(format!("{}: {e}", toml_path.display()));
                continue;
            }
        };
        let config: SkillPackConfig = match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                result.errors.push(format!("{}: {e}", toml_path.display()));
                continue;
            }
        };

        let policy_path = pack_dir.join("policy.md");
        let policy_markdown = std::fs::read_to_string(&policy_path).unwrap_or_default();

        let mut templates = std::collections::BTreeMap::new();
        let templates_dir = pack_dir.join("templates");
        if templates_dir.is_dir() {
            if let Ok(entries) = std::fs::read_dir(&templates_dir) {
                let mut files: Vec<PathBuf> = entries
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.extension().map(|e| e == "md").unwrap_or(false))
                    .collect();
                files.sort();
                for file in files {
                    if let Ok(content) = std::fs::read_to_string(&file) {
                        if let Some(name) = file.file_name() {
                            templates.insert(name.to_string_lossy().to_string(), content);
                        }
                    }
                }
            }
        }

        result
            .skills
            .push(RuntimeSkill::from_config(config, policy_markdown, templates));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_pack(root: &Path, id: &str, toml_body: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("skill.toml"), toml_body).unwrap();
    }

    #[test]
    fn loads_packs_in_sorted_order_and_compiles_triggers() {
        let tmp = tempfile::tempdir().unwrap();
        write_pack(
            tmp.path(),
            "b-pack",
            r#"
id = "b"
name = "B"
version = "1.0"
[triggers]
regex = ["write a report"]
"#,
        );
        write_pack(
            tmp.path(),
            "a-pack",
            r#"
id = "a"
name = "A"
version = "1.0"
"#,
        );
        let result = load_skill_packs(tmp.path());
        assert!(result.errors.is_empty());
        assert_eq!(result.skills.len(), 2);
        assert_eq!(result.skills[0].id, "a");
        assert!(result.skills[1].matches_question("please write a report today"));
    }

    #[test]
    fn missing_root_yields_empty_result_not_error() {
        let result = load_skill_packs(Path::new("/nonexistent/skills/root"));
        assert!(result.skills.is_empty());
        assert!(result.errors.is_empty());
    }
}

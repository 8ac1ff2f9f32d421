//! Maps an agent's tool names (`workforce::agents::AgentSpec::tools`) to the concrete [`Tool`]
//! that handles them. Only the file toolkit ships concretely (§1 Non-goals: the third-party
//! toolkit library itself — bash, web search, browser — is out of scope; the engine owns only
//! the wire-level contract those would implement).

use std::collections::HashMap;
use std::sync::Arc;

use cowork_workdir::WorkdirResolver;

use super::contract::Tool;
use super::file::{ReadFromFile, WriteToFile};

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// The tool set backed by real implementations in this engine (§4.5, §8).
    pub fn built_in(resolver: WorkdirResolver) -> Self {
        let mut tools: HashMap<String, Arc<dyn Tool>> = HashMap::new();
        tools.insert("file_write".to_string(), Arc::new(WriteToFile::new(resolver.clone())));
        tools.insert("file_read".to_string(), Arc::new(ReadFromFile::new(resolver)));
        Self { tools }
    }

    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(tool_name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_resolves_file_tools_but_not_third_party_ones() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ToolRegistry::built_in(WorkdirResolver::new(tmp.path()));
        assert!(registry.get("file_write").is_some());
        assert!(registry.get("file_read").is_some());
        assert!(registry.get("bash").is_none());
        assert!(registry.get("web_search").is_none());
    }
}

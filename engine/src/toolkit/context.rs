//! Per-call context threaded explicitly through every tool invocation (§4.5, §9). The upstream
//! module read the equivalent of agent name / task id / project id / auth token off ambient
//! context-variables; here every [`super::trait::Tool::call`] receives them as an argument.

#[derive(Clone, Debug)]
pub struct ToolContext {
    pub agent_name: String,
    pub process_task_id: String,
    pub project_id: String,
    pub auth_token: Option<String>,
}

impl ToolContext {
    pub fn new(
        agent_name: impl Into<String>,
        process_task_id: impl Into<String>,
        project_id: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            process_task_id: process_task_id.into(),
            project_id: project_id.into(),
            auth_token,
        }
    }
}

//! Drives one turn of the Cowork engine in-process, without going through HTTP.
//!
//! Needs a reachable LLM provider (e.g. `OPENAI_API_KEY`) to produce a real reply; without one
//! the turn still runs and the steps up to the failing provider call still print.
//!
//! Run: `cargo run -p cowork-demos --example run_turn -- "plan a birthday party"`

use std::env;

use cowork_engine::action::Action;
use cowork_engine::core_client::CoreClient;
use cowork_engine::manager::ProjectQueueManager;
use cowork_engine::run_loop::RunLoopDeps;
use env_config::Settings;

#[tokio::main]
async fn main() {
    let _ = dotenv::dotenv();
    let question = env::args().nth(1).unwrap_or_else(|| "say hello".to_string());

    let settings = Settings::from_env();
    let core = CoreClient::from_settings(settings.core_api_url.clone(), settings.core_api_internal_key.clone());
    let manager = ProjectQueueManager::new(RunLoopDeps::new(settings, core, Vec::new()));

    let project_id = "demo-project";
    let lock = manager.get_or_create(project_id);
    let mut events = lock.subscribe_events();

    manager.enqueue(Action::Improve {
        project_id: project_id.to_string(),
        task_id: "demo-task".to_string(),
        question,
        search_enabled: None,
        attachments: Vec::new(),
        auth_token: None,
        provider_override: None,
        custom_agents: Vec::new(),
    });

    loop {
        match events.recv().await {
            Ok(event) => {
                println!("{:?}: {}", event.step, event.data);
                if event.step.is_terminal() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

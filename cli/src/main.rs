//! Cowork CLI: run the HTTP server, or drive a turn against one over `/chat` (§6).

mod client;
mod display;
mod log_format;
mod logging;

use clap::{Parser, Subcommand};

use client::CoworkClient;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8080";

#[derive(Parser, Debug)]
#[command(name = "cowork")]
#[command(about = "Cowork — run the server, or submit a turn to one")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Base URL of a running server (default: http://127.0.0.1:8080 or COWORK_API_URL)
    #[arg(long, global = true, value_name = "URL")]
    url: Option<String>,

    /// Bearer token to authenticate with (default: COWORK_API_TOKEN)
    #[arg(long, global = true, value_name = "TOKEN")]
    token: Option<String>,

    /// Print raw step events as NDJSON instead of formatted lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server
    Serve(ServeArgs),
    /// Submit a turn and stream its events until `end`
    Chat(ChatArgs),
    /// Enqueue a turn without waiting for its events
    Improve(ChatArgs),
    /// Request cancellation of a project's in-flight turn
    Stop(ProjectArgs),
    /// Resolve a pending tool-permission prompt
    Permission(PermissionArgs),
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
    /// Listen address (default 127.0.0.1:8080)
    #[arg(long, value_name = "ADDR")]
    addr: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ChatArgs {
    /// Project id
    project_id: String,
    /// The question to ask
    question: String,
    /// Task id for this turn (default: a fresh uuid)
    #[arg(long, value_name = "ID")]
    task_id: Option<String>,
}

#[derive(clap::Args, Debug)]
struct ProjectArgs {
    project_id: String,
}

#[derive(clap::Args, Debug)]
struct PermissionArgs {
    project_id: String,
    request_id: String,
    /// Deny instead of approve
    #[arg(long)]
    deny: bool,
    /// Remember this decision for the toolkit (ask-once tier)
    #[arg(long)]
    remember: bool,
}

fn resolve_url(args: &Args) -> String {
    args.url
        .clone()
        .or_else(|| std::env::var("COWORK_API_URL").ok())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string())
}

fn resolve_token(args: &Args) -> Option<String> {
    args.token.clone().or_else(|| std::env::var("COWORK_API_TOKEN").ok())
}

fn default_task_id(explicit: Option<String>) -> String {
    explicit.unwrap_or_else(|| format!("task-{}", uuid::Uuid::new_v4()))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_config::load_and_apply("cowork", None::<&std::path::Path>).ok();
    logging::init()?;

    let args = Args::parse();

    if let Command::Serve(serve_args) = &args.cmd {
        if let Err(e) = cowork_serve::run_serve(serve_args.addr.as_deref(), Vec::new()).await {
            eprintln!("cowork: serve error: {e}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let client = CoworkClient::new(resolve_url(&args), resolve_token(&args));

    match args.cmd {
        Command::Serve(_) => unreachable!("handled above"),
        Command::Chat(chat_args) => {
            let task_id = default_task_id(chat_args.task_id);
            let json = args.json;
            let result = client
                .stream_chat(&chat_args.project_id, &task_id, &chat_args.question, |event| {
                    if json {
                        println!("{}", serde_json::to_string(&event).unwrap_or_default());
                    } else if let Some(line) = display::format_event(&event, 200) {
                        println!("{line}");
                    }
                })
                .await;
            if let Err(e) = result {
                eprintln!("cowork: {e}");
                std::process::exit(1);
            }
        }
        Command::Improve(chat_args) => {
            let task_id = default_task_id(chat_args.task_id);
            match client.enqueue_improve(&chat_args.project_id, &task_id, &chat_args.question).await {
                Ok(body) => println!("{}", serde_json::to_string(&body)?),
                Err(e) => {
                    eprintln!("cowork: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Stop(proj_args) => match client.stop(&proj_args.project_id).await {
            Ok(body) => println!("{}", serde_json::to_string(&body)?),
            Err(e) => {
                eprintln!("cowork: {e}");
                std::process::exit(1);
            }
        },
        Command::Permission(perm_args) => {
            let approved = !perm_args.deny;
            match client
                .resolve_permission(&perm_args.project_id, &perm_args.request_id, approved, perm_args.remember)
                .await
            {
                Ok(body) => println!("{}", serde_json::to_string(&body)?),
                Err(e) => {
                    eprintln!("cowork: {e}");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_task_id_keeps_explicit_value() {
        assert_eq!(default_task_id(Some("t1".to_string())), "t1");
    }

    #[test]
    fn default_task_id_generates_when_absent() {
        let id = default_task_id(None);
        assert!(id.starts_with("task-"));
    }

    #[test]
    fn resolve_url_falls_back_to_default() {
        std::env::remove_var("COWORK_API_URL");
        let args = Args {
            cmd: Command::Stop(ProjectArgs { project_id: "p1".to_string() }),
            url: None,
            token: None,
            json: false,
        };
        assert_eq!(resolve_url(&args), DEFAULT_API_URL);
    }
}

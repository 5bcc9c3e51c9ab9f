//! `ag-cli` — command-line client for the agency fleet.
//!
//! Exit codes: 0 on success; a finished task's own exit code is
//! propagated; 1 for local errors.

mod client;

use clap::{Parser, Subcommand};

use ag_discovery::{Discovery, DiscoveryConfig};
use ag_domain::config::ENV_WEB_PASSWORD;
use ag_domain::{Error, Tier};
use ag_protocol::{EnqueueRequest, SubmitTaskRequest};

use client::FleetClient;

const DEFAULT_DIRECTOR: &str = "http://127.0.0.1:8700";
const DEFAULT_AGENT: &str = "http://127.0.0.1:8710";

#[derive(Debug, Parser)]
#[command(name = "ag-cli", about = "Agency fleet client", version)]
struct Cli {
    /// Director API password (falls back to AG_WEB_PASSWORD).
    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a task directly on an agent and wait for the result.
    Task {
        prompt: String,
        #[arg(long, default_value = DEFAULT_AGENT)]
        agent: String,
        #[arg(long)]
        tier: Option<Tier>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Enqueue a task on the director's work queue.
    Queue {
        prompt: String,
        #[arg(long, default_value = DEFAULT_DIRECTOR)]
        director: String,
        #[arg(long)]
        tier: Option<Tier>,
        #[arg(long)]
        kind: Option<String>,
        #[arg(long)]
        session: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Show queue stats, or one entry when an id is given.
    QueueStatus {
        queue_id: Option<String>,
        #[arg(long, default_value = DEFAULT_DIRECTOR)]
        director: String,
    },
    /// Cancel a queue entry.
    QueueCancel {
        queue_id: String,
        #[arg(long, default_value = DEFAULT_DIRECTOR)]
        director: String,
    },
    /// Show a component's /status document.
    Status {
        #[arg(default_value = DEFAULT_DIRECTOR)]
        url: String,
    },
    /// Scan the local port range for live components.
    Discover {
        #[arg(long, default_value_t = 8700)]
        start: u16,
        #[arg(long, default_value_t = 8720)]
        end: u16,
    },
    /// Print the client version.
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("[{}] {}", e.code(), e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, Error> {
    let password = cli
        .password
        .or_else(|| std::env::var(ENV_WEB_PASSWORD).ok().filter(|p| !p.is_empty()));
    let client = FleetClient::new(password)?;

    match cli.command {
        Command::Task { prompt, agent, tier, session, timeout } => {
            let accepted = client
                .submit_task(
                    &agent,
                    &SubmitTaskRequest {
                        prompt,
                        tier,
                        agent_kind: None,
                        session_id: session,
                        timeout_seconds: timeout,
                        model: None,
                    },
                )
                .await?;
            eprintln!("task {} accepted (session {})", accepted.task_id, accepted.session_id);

            let finished = client.wait_for_task(&agent, &accepted.task_id).await?;
            if !finished.output.is_empty() {
                println!("{}", finished.output.trim_end());
            }
            match finished.state.as_str() {
                "completed" => Ok(0),
                state => {
                    if let Some(error) = finished.error {
                        eprintln!("[{}] {}", error.kind, error.message);
                    } else {
                        eprintln!("task {state}");
                    }
                    Ok(finished.exit_code.filter(|c| *c != 0).unwrap_or(1))
                }
            }
        }

        Command::Queue { prompt, director, tier, kind, session, timeout } => {
            let queued = client
                .enqueue(
                    &director,
                    &EnqueueRequest {
                        prompt,
                        tier,
                        agent_kind: kind,
                        session_id: session,
                        timeout_seconds: timeout,
                        source: Some("cli".into()),
                        model: None,
                    },
                )
                .await?;
            println!("queued {} at position {}", queued.queue_id, queued.position);
            Ok(0)
        }

        Command::QueueStatus { queue_id, director } => {
            match queue_id {
                Some(id) => {
                    let entry = client.queue_entry(&director, &id).await?;
                    println!("{}", serde_json::to_string_pretty(&entry).unwrap_or_default());
                }
                None => {
                    let stats = client.queue_stats(&director).await?;
                    println!(
                        "depth {} / {}  dispatched {}  oldest {:.0}s",
                        stats.depth,
                        stats.max_size,
                        stats.dispatched_count,
                        stats.oldest_age_seconds
                    );
                    for task in stats.tasks {
                        let position = task
                            .position
                            .map(|p| format!("#{p}"))
                            .unwrap_or_else(|| "  ".into());
                        println!(
                            "{position} {} [{}] ({}) {}",
                            task.queue_id, task.state, task.source, task.prompt_preview
                        );
                    }
                }
            }
            Ok(0)
        }

        Command::QueueCancel { queue_id, director } => {
            let cancelled = client.queue_cancel(&director, &queue_id).await?;
            println!(
                "cancelled {} (was_dispatched: {})",
                cancelled.queue_id, cancelled.was_dispatched
            );
            Ok(0)
        }

        Command::Status { url } => {
            let status = client.status(&url).await?;
            let roles: Vec<String> = status
                .roles
                .iter()
                .map(|r| format!("{r:?}").to_lowercase())
                .collect();
            println!(
                "{} v{}  [{}]  up {:.0}s",
                roles.join(","),
                status.version,
                status.state,
                status.uptime_seconds
            );
            if let Some(kind) = status.agent_kind {
                println!("kind: {kind}");
            }
            if let Some(task) = status.current_task {
                println!("current task: {} — {}", task.id, task.prompt_preview);
            }
            println!(
                "config: {}",
                serde_json::to_string_pretty(&status.config).unwrap_or_default()
            );
            Ok(0)
        }

        Command::Discover { start, end } => {
            let discovery = Discovery::new(DiscoveryConfig {
                port_start: start,
                port_end: end,
                self_port: 0,
                ..DiscoveryConfig::default()
            })?;
            discovery.scan_once().await;

            let components = discovery.all_components();
            if components.is_empty() {
                println!("no components found in {start}-{end}");
            }
            for component in components {
                let roles: Vec<String> = component
                    .roles
                    .iter()
                    .map(|r| format!("{r:?}").to_lowercase())
                    .collect();
                let kind = component
                    .agent_kind
                    .map(|k| format!(" kind={k}"))
                    .unwrap_or_default();
                println!(
                    "{}  [{}] {}{} v{}",
                    component.url,
                    roles.join(","),
                    component.state,
                    kind,
                    component.version
                );
            }
            Ok(0)
        }

        Command::Version => {
            println!("ag-cli {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

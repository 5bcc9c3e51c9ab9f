use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ag_agent::api;
use ag_agent::config::AgentConfig;
use ag_agent::state::AgentState;
use ag_domain::{AgencyEnv, Mode, Tier};
use ag_runner::RunnerRegistry;

#[derive(Debug, Parser)]
#[command(name = "ag-agent", about = "Agency agent: runs one CLI task at a time")]
struct Cli {
    /// Agent name (history and session directories key off it).
    #[arg(long, default_value = "agent")]
    name: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8710)]
    port: u16,

    /// Provider kind to run (`claude`, `codex`).
    #[arg(long, default_value = "claude")]
    kind: String,

    /// Advertised model tier.
    #[arg(long, default_value = "standard")]
    tier: Tier,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = AgencyEnv::load().context("resolving AGENCY_ROOT")?;
    init_tracing(env.mode);

    let config = AgentConfig::new(&env, cli.name, cli.port, cli.kind, cli.tier);
    tracing::info!(
        name = %config.name,
        port = config.port,
        kind = %config.agent_kind,
        root = %env.root.display(),
        "agent starting"
    );

    let state = AgentState::new(config.clone(), RunnerRegistry::with_defaults())
        .context("initializing agent state")?;

    // ── Shutdown watcher ─────────────────────────────────────────────
    {
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
                // Hard stop once the graceful budget runs out.
                tokio::time::sleep(ag_domain::config::SHUTDOWN_AGENT).await;
                tracing::warn!("graceful shutdown budget exceeded");
                std::process::exit(1);
            }
        });
    }

    // ── Serve ────────────────────────────────────────────────────────
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "agent listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .context("axum server error")?;

    tracing::info!("agent stopped");
    Ok(())
}

fn init_tracing(mode: Mode) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ag_agent=debug"));
    match mode {
        Mode::Prod => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        Mode::Dev => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
    }
}

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ag_domain::config::scheduler_reload_interval;
use ag_domain::{AgencyEnv, Mode};
use ag_scheduler::state::{self, SchedulerState};

#[derive(Debug, Parser)]
#[command(name = "ag-scheduler", about = "Agency scheduler: cron-triggered task submission")]
struct Cli {
    /// Path to the YAML job configuration.
    #[arg(long = "config", short = 'c')]
    config: PathBuf,

    /// Port to listen on (for `/status`).
    #[arg(long, default_value_t = 8730)]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = AgencyEnv::load().context("resolving AGENCY_ROOT")?;
    init_tracing(env.mode);

    let state = SchedulerState::new(cli.config.clone(), cli.port)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    tracing::info!(
        config = %cli.config.display(),
        port = cli.port,
        "scheduler starting"
    );

    // ── Minute ticker + config reload ────────────────────────────────
    tokio::spawn(state::tick_loop(state.clone()));
    tokio::spawn(state::reload_loop(state.clone(), scheduler_reload_interval()));

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

    // ── Serve /status ────────────────────────────────────────────────
    let addr = format!("127.0.0.1:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "scheduler listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, state::router(state))
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .context("axum server error")?;

    tracing::info!("scheduler stopped");
    Ok(())
}

fn init_tracing(mode: Mode) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ag_scheduler=debug"));
    match mode {
        Mode::Prod => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        Mode::Dev => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
    }
}

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ag_director::api;
use ag_director::config::DirectorConfig;
use ag_director::dispatcher;
use ag_director::queue::DEFAULT_MAX_SIZE;
use ag_director::state::DirectorState;
use ag_domain::config::ENV_WEB_PASSWORD;
use ag_domain::{AgencyEnv, Mode};

#[derive(Debug, Parser)]
#[command(name = "ag-director", about = "Agency director: work queue and dispatcher")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8700)]
    port: u16,

    /// Queue capacity (pending + dispatched).
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    queue_max: usize,

    /// First port of the discovery scan range.
    #[arg(long, default_value_t = 8700)]
    scan_start: u16,

    /// Last port of the discovery scan range.
    #[arg(long, default_value_t = 8720)]
    scan_end: u16,

    /// Per-IP API rate limit in requests/second (off by default).
    #[arg(long)]
    rate_limit: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let env = AgencyEnv::load().context("resolving AGENCY_ROOT")?;
    init_tracing(env.mode);

    let mut config =
        DirectorConfig::new(&env, cli.port, cli.queue_max, cli.scan_start, cli.scan_end);
    config.rate_limit_rps = cli.rate_limit;

    // ── Web password (read once, kept only as a digest) ─────────────
    let password_hash = match std::env::var(ENV_WEB_PASSWORD) {
        Ok(password) if !password.is_empty() => {
            tracing::info!("API password filter enabled");
            Some(ag_director::auth::hash_password(&password))
        }
        _ => {
            tracing::warn!(
                "API password filter DISABLED — set {ENV_WEB_PASSWORD} to enable"
            );
            None
        }
    };

    let state = DirectorState::new(config.clone(), password_hash)
        .context("initializing director state")?;
    tracing::info!(
        port = config.port,
        queue_dir = %config.queue_dir.display(),
        queue_max = config.queue_max_size,
        "director starting"
    );

    // ── Discovery scan loop ──────────────────────────────────────────
    state.discovery.start();

    // ── Dispatcher ───────────────────────────────────────────────────
    tokio::spawn(dispatcher::run(state.clone()));

    // ── Shutdown watcher ─────────────────────────────────────────────
    {
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                shutdown.cancel();
                // Hard stop once the graceful budget runs out.
                tokio::time::sleep(ag_domain::config::SHUTDOWN_DIRECTOR).await;
                tracing::warn!("graceful shutdown budget exceeded");
                std::process::exit(1);
            }
        });
    }

    // ── Router (+ backpressure and optional rate limit) ──────────────
    let router = api::router(state.clone())
        .layer(tower::limit::ConcurrencyLimitLayer::new(256));
    let router = match config.rate_limit_rps {
        Some(rps) => {
            use tower_governor::governor::GovernorConfigBuilder;
            use tower_governor::GovernorLayer;

            let gov_config = GovernorConfigBuilder::default()
                .per_second(rps)
                .burst_size((rps * 2).max(1) as u32)
                .finish()
                .expect("rate_limit must be > 0");
            tracing::info!(rps, "per-IP rate limiting enabled");
            router.layer(GovernorLayer {
                config: std::sync::Arc::new(gov_config),
            })
        }
        None => router,
    };

    // ── Serve ────────────────────────────────────────────────────────
    let addr = format!("127.0.0.1:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "director listening");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        })
        .await
        .context("axum server error")?;

    state.discovery.stop().await;
    tracing::info!("director stopped");
    Ok(())
}

fn init_tracing(mode: Mode) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ag_director=debug"));
    match mode {
        Mode::Prod => tracing_subscriber::fmt().with_env_filter(filter).json().init(),
        Mode::Dev => tracing_subscriber::fmt().with_env_filter(filter).compact().init(),
    }
}

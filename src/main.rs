//! Process orchestrator: warms up the proxy validator, then runs the
//! refresh scheduler and the gRPC server concurrently until a shutdown
//! signal arrives.

use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use fetchproxy::config::{MAX_VALIDATION_DRIVERS, SERVING_POOL_SIZE};
use fetchproxy::dispatcher::{Dispatcher, UserAgents};
use fetchproxy::pool::{Pool, PoolConfig};
use fetchproxy::rpc::Service;
use fetchproxy::scheduler;
use fetchproxy::sources::scrape_user_agents;
use fetchproxy::validator::{BrowserProbe, FailedSet, ValidProxyMap, Validator};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal startup failure: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let http = reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (compatible; fetchproxy/1.0)")
        .build()?;

    tracing::info!("scraping startup user agents");
    let user_agents = Arc::new(UserAgents::new(scrape_user_agents(&http).await));

    let validation_pool = Arc::new(Pool::new(PoolConfig {
        max_instances: MAX_VALIDATION_DRIVERS,
        idle_timeout: fetchproxy::config::VALIDATOR_IDLE_TIMEOUT,
        ..Default::default()
    }));
    let probe = Arc::new(BrowserProbe::new(Arc::clone(&validation_pool)));
    let valid_proxies = Arc::new(ValidProxyMap::new());
    let failed = Arc::new(FailedSet::new());
    let validator = Arc::new(Validator::new(
        http.clone(),
        Arc::clone(&probe),
        Arc::clone(&valid_proxies),
        Arc::clone(&failed),
    ));

    scheduler::warm_up(&validator).await;

    let validation_reaper_task = Pool::spawn_reaper(Arc::clone(&validation_pool));
    let scheduler_task = tokio::spawn(scheduler::run(
        Arc::clone(&validator),
        Arc::clone(&validation_pool),
    ));

    let serving_pool = Arc::new(Pool::new(PoolConfig {
        max_instances: SERVING_POOL_SIZE,
        ..Default::default()
    }));
    let reaper_task = Pool::spawn_reaper(Arc::clone(&serving_pool));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&serving_pool),
        Arc::clone(&valid_proxies),
        Arc::clone(&user_agents),
    ));

    let service = Service::new(Arc::clone(&dispatcher), Arc::clone(&valid_proxies));

    let serve_result = fetchproxy::rpc::serve(service, shutdown_signal()).await;

    scheduler_task.abort();
    validation_reaper_task.abort();
    reaper_task.abort();
    serving_pool.shutdown().await;
    validation_pool.shutdown().await;

    serve_result.map_err(anyhow::Error::from)
}

/// Resolves when either `SIGINT` or `SIGTERM` is received, mirroring the
/// original `signal_handler` registered for both signals.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

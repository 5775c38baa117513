mod config;
mod handlers;
mod replay;
mod scheduler;
mod specs;
mod state;
mod store;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::MasterConfig;
use crate::replay::{ReplayManager, SchedulerReplayWorker, UuidProvider};
use crate::scheduler::HttpSchedulerClient;
use crate::state::AppState;
use crate::store::InMemoryReplayStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("master=debug,tower_http=info")),
        )
        .init();

    let config = MasterConfig::from_env()?;
    info!(
        "config: workers={} timeout={:?} queue_capacity={} policy={:?}",
        config.replay.num_workers,
        config.replay.worker_timeout,
        config.replay.queue_capacity,
        config.replay.conflict_policy
    );

    let specs = specs::load_job_specs(&config.job_specs_glob, config.project.as_deref())?;
    info!(
        "proyecto {} con {} jobs",
        specs.project.name,
        specs.jobs.len()
    );

    let store = InMemoryReplayStore::new();
    let scheduler = Arc::new(HttpSchedulerClient::new(
        config.scheduler_url.clone(),
        config.scheduler_timeout,
    )?);
    let worker = Arc::new(SchedulerReplayWorker::new(scheduler, Arc::new(store.clone())));

    let manager = Arc::new(ReplayManager::new(
        worker,
        Arc::new(store.clone()),
        Arc::new(UuidProvider),
        config.replay.clone(),
    ));
    manager.init()?;

    let state = AppState::new(manager.clone(), store, specs.project, specs.jobs);
    let app = handlers::build_router(state);

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("no se pudo escuchar en {}", config.listen_addr))?;
    info!("master escuchando en {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // dejamos terminar los replays en curso antes de salir
    manager.close().await?;
    info!("master detenido");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("no se pudo escuchar ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("señal de apagado recibida");
}

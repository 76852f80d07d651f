//! dailysign -- daily check-in automation for reward sites.
//!
//! This crate provides the check-in workflow (reward action with optional
//! code redemption), credential and log storage, status aggregation, a
//! daily scheduler, and the HTTP API that exposes them.

pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod refresh;
pub mod scheduler;
pub mod sign;
pub mod status;
pub mod storage;
pub mod upstream;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use anyhow::Result;

use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::credentials::{CredentialStore, FileCredentialStore};
use crate::storage::{OutcomeLog, SqliteOutcomeLog};
use crate::upstream::{HttpUpstream, Upstream};

/// Wire storage, upstream clients and the workflow from `config`.
pub fn build_state(config: &AppConfig) -> Result<AppState> {
    let pool = storage::open_pool(&config.storage.db_path)?;

    let credentials: Arc<dyn CredentialStore> =
        Arc::new(FileCredentialStore::new(&config.storage.token_path));
    let log: Arc<dyn OutcomeLog> = Arc::new(SqliteOutcomeLog::new(pool.clone()));
    let upstream: Arc<dyn Upstream> = Arc::new(HttpUpstream::new(config.upstream.clone())?);
    let exchange = refresh::exchange_from_config(&config.refresh, &config.upstream)?;

    let ctx = sign::SignContext {
        credentials: credentials.clone(),
        upstream: upstream.clone(),
    };
    let workflow = sign::SignWorkflow::new(
        ctx,
        log.clone(),
        sign::strategy_for(config.upstream.variant),
    );
    let status = status::StatusAggregator::new(credentials.clone(), upstream.clone(), log.clone());

    Ok(AppState {
        workflow,
        status,
        credentials,
        log,
        upstream,
        exchange: Arc::from(exchange),
        scheduler: scheduler::Scheduler::new(pool),
    })
}

/// Start the dailysign daemon: API server and scheduler.
pub async fn serve(config: &AppConfig) -> Result<()> {
    // 1. Initialize Storage + clients
    tracing::info!(db_path = %config.storage.db_path.display(), "Initializing database");
    let state = build_state(config)?;

    // 2. Start Scheduler Engine (background task)
    let scheduler = state.scheduler.clone();
    let workflow = state.workflow.clone();
    tokio::spawn(async move {
        scheduler::run_scheduler_loop(scheduler, workflow).await;
    });

    // 3. Start API Server
    let addr: std::net::SocketAddr = config.server.bind.parse()?;
    let app = api::router(state);

    tracing::info!(%addr, variant = ?config.upstream.variant, "dailysign listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

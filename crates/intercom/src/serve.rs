// SPDX-FileCopyrightText: 2026 Intercom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `intercom serve`: wires the store, the issuer, the call service, the
//! stale-call sweeper and the gateway, and runs them until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use intercom_calls::{CallService, spawn_sweeper};
use intercom_config::IntercomConfig;
use intercom_core::{CallStore, IntercomError, PluginAdapter, SystemClock};
use intercom_gateway::GatewayState;
use intercom_storage::SqliteCallStore;
use intercom_tokens::TokenIssuer;
use tracing::{info, warn};

use crate::shutdown;

/// Opens and migrates the configured SQLite store.
pub async fn open_store(config: &IntercomConfig) -> Result<Arc<SqliteCallStore>, IntercomError> {
    let store = SqliteCallStore::new(config.storage.clone());
    store.initialize().await?;
    info!(path = %config.storage.database_path, "call store opened");
    Ok(Arc::new(store))
}

/// Runs the server until SIGINT/SIGTERM.
pub async fn run_serve(config: IntercomConfig) -> Result<(), IntercomError> {
    let store = open_store(&config).await?;

    let issuer = Arc::new(TokenIssuer::from_config(&config.tokens));
    if !issuer.is_configured() {
        warn!("tokens.app_certificate is not set; starting calls and minting tokens will fail");
    }
    if config.server.bearer_token.is_none() {
        warn!("server.bearer_token is not set; every API request will be rejected");
    }

    let service = Arc::new(CallService::new(
        store.clone(),
        issuer,
        Arc::new(SystemClock),
        config.calls.clone(),
    ));

    let cancel = shutdown::install_signal_handler();

    let sweeper = spawn_sweeper(
        service.clone(),
        Duration::from_secs(config.calls.sweep_interval_secs),
        cancel.clone(),
    );

    let state = GatewayState::new(service, config.server.bearer_token.clone());
    let served = intercom_gateway::start_server(&config.server, state, cancel.clone()).await;

    // A bind or serve failure still has to stop the sweeper.
    cancel.cancel();
    if let Some(handle) = sweeper
        && let Err(e) = handle.await
    {
        warn!(error = %e, "sweeper task did not exit cleanly (non-fatal)");
    }
    if let Err(e) = store.shutdown().await {
        warn!(error = %e, "call store shutdown failed (non-fatal)");
    }

    served?;
    info!("intercom serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("intercom={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

//! Walk a session manager through a typical lifecycle against an
//! in-memory server, logging every change it observes.
//!
//! Run with: cargo run -p session-watch-demo [config.json]
//!
//! The optional config file holds `ManagerOptions` as JSON, e.g.
//! `{"poll": {"interval_ms": 2000, "standby": "never"}}`.

use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;
use remote_sessions_core::{
    BasicKernelConnector, ConnectOptions, ManagerOptions, SessionConnection, SessionCreateOptions,
    SessionModel,
};
use remote_sessions_manager::{ImmediatePollerFactory, SessionManager, api::MemorySessionApi};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn load_options() -> anyhow::Result<ManagerOptions> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(ManagerOptions::default());
    };
    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {path}"))
}

fn describe(models: &[SessionModel]) -> String {
    models
        .iter()
        .map(|m| format!("{} ({})", m.path, m.id))
        .collect::<Vec<_>>()
        .join(", ")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let options = load_options()?;
    tracing::info!(?options, "Starting session manager");

    let api = Arc::new(MemorySessionApi::new());
    let manager = SessionManager::new(
        api.clone(),
        Arc::new(BasicKernelConnector),
        &ImmediatePollerFactory,
        &options,
    );

    let mut changes = manager.running_changed().stream();
    let watcher = tokio::spawn(async move {
        while let Some(models) = changes.next().await {
            tracing::info!(
                count = models.len(),
                sessions = %describe(&models),
                "Running sessions"
            );
        }
    });
    let _failures = manager.connection_failure().connect(|e| {
        tracing::warn!(error = %e, "Lost contact with the session server");
    });

    manager.ready().await;

    let notebook = manager
        .start_new(
            SessionCreateOptions::new("analysis.ipynb").with_kernel("python3"),
            ConnectOptions::default(),
        )
        .await?;
    let console = manager
        .start_new(
            SessionCreateOptions::new("scratch.py").with_kernel("python3"),
            ConnectOptions::default(),
        )
        .await?;

    notebook.set_path("reports/analysis.ipynb").await?;
    manager.refresh_running().await?;

    if let Some(found) = manager.find_by_path("reports/analysis.ipynb").await? {
        tracing::info!(session_id = %found.id, "Found renamed notebook");
    }

    manager.stop_if_needed("scratch.py").await;
    tracing::info!(disposed = console.is_disposed(), "Stopped console session");

    manager.shutdown_all().await?;
    manager.dispose();
    watcher.abort();

    Ok(())
}

// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::EnvFilter;

use crate::application::ingestion::IngestionService;
use crate::application::session_controller::SessionController;
use crate::infrastructure::config::{load_dashboard_config, load_substance_catalog};
use crate::infrastructure::local_auth::LocalAuthProvider;
use crate::infrastructure::sheet_client::SheetClient;
use crate::presentation::app_state::AppState;
use crate::presentation::router::build_router;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = load_dashboard_config()?;
    let catalog = load_substance_catalog()?;
    tracing::info!("Monitoring {} substances", catalog.entries().len());

    // Remote sheet (infrastructure layer)
    let source = Arc::new(SheetClient::new(
        config.source.endpoint.clone(),
        Duration::from_secs(config.source.request_timeout_secs),
    )?);

    // Services (application layer)
    let ingestion = IngestionService::new(source, config.polling.retry_policy());
    let auth = Arc::new(LocalAuthProvider::new(config.auth.users.clone())?);
    let session = SessionController::new(auth.clone(), config.session.policy());
    session.start();
    ingestion.follow_session(config.polling.interval(), session.subscribe_state());

    let state = Arc::new(AppState {
        ingestion,
        session,
        auth,
        catalog: Arc::new(catalog),
    });

    // Build router (presentation layer)
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind))?;
    tracing::info!("Starting chem-dashboard on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}

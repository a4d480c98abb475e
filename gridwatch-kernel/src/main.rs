/**
 * GRIDWATCH KERNEL - Point d'entrée principal du serveur
 *
 * RÔLE : config -> registre des grids -> routeur HTTP.
 * Une configuration invalide arrête le processus avant d'écouter.
 */

use anyhow::{Context, Result};
use gridwatch_kernel::config::{config_path, load_config};
use gridwatch_kernel::http::{build_router, AppState};
use gridwatch_kernel::query::A2sClient;
use gridwatch_kernel::registry::GridRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Charger les variables d'environnement depuis .env (si présent)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("gridwatch_kernel=info")),
        )
        .init();

    let path = config_path();
    let cfg = load_config(&path)
        .await
        .with_context(|| format!("failed to load {}", path.display()))?;
    let registry = GridRegistry::load(&cfg.grids).context("invalid grid registry")?;
    let addr = cfg.server.listen_addr()?;

    if registry.is_empty() {
        warn!("no grids configured, status and players will be empty");
    }
    if cfg.allowed_users().is_empty() {
        warn!("allowed_users is empty, every API call will be rejected");
    }
    info!(grids = registry.len(), "grid registry loaded");

    let app_state = AppState::new(&cfg, registry, Arc::new(A2sClient::new()));
    let app = build_router(app_state);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;
    info!("listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

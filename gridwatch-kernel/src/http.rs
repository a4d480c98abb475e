/**
 * API REST GRIDWATCH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Exposer l'état des grids aux appelants authentifiés.
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, middleware d'autorisation avant toute agrégation
 * - Routes : /health, /system/health, /api/status, /api/players
 * - Chaque requête relance un fan-out complet (pas de cache entre requêtes)
 *
 * SÉCURITÉ :
 * - Header x-caller-id obligatoire sur toutes routes sauf /health
 * - L'identité est posée par la couche session en amont ; ici on vérifie
 *   seulement qu'elle figure dans `allowed_users` (sinon 403)
 */

use crate::config::KernelConfig;
use crate::health::{HealthTracker, KernelHealth};
use crate::query::QueryClient;
use crate::registry::GridRegistry;
use crate::roster::{self, RosterResult};
use crate::status::{self, ReachabilityResult};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing::get, Json, Router};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const CALLER_HEADER: &str = "x-caller-id";

#[derive(Clone)]
pub struct AppState {
    pub registry: GridRegistry,
    pub client: Arc<dyn QueryClient>,
    pub allowed_users: Arc<HashSet<String>>,
    pub probe_timeout: Duration,
    pub query_timeout: Duration,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(cfg: &KernelConfig, registry: GridRegistry, client: Arc<dyn QueryClient>) -> Self {
        Self {
            registry,
            client,
            allowed_users: Arc::new(cfg.allowed_users()),
            probe_timeout: cfg.server.probe_timeout(),
            query_timeout: cfg.server.query_timeout(),
            health_tracker: HealthTracker::new(),
        }
    }

    fn admits(&self, caller: Option<&str>) -> bool {
        caller
            .map(str::trim)
            .is_some_and(|id| !id.is_empty() && self.allowed_users.contains(id))
    }
}

async fn require_allowed_caller(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let caller = req
        .headers()
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok());

    if !app.admits(caller) {
        warn!(path = %req.uri().path(), caller = ?caller, "caller rejected");
        return Err(StatusCode::FORBIDDEN);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/status", get(get_status))
        .route("/api/players", get(get_players))
        .layer(middleware::from_fn_with_state(
            app_state.clone(),
            require_allowed_caller,
        ))
        .with_state(app_state)
}

// GET /api/status (joignabilité TCP de chaque grid)
async fn get_status(State(app): State<AppState>) -> Json<ReachabilityResult> {
    Json(status::check(app.registry.grids(), app.probe_timeout).await)
}

// GET /api/players (infos + joueurs, ou {"error": ...} par grid)
async fn get_players(State(app): State<AppState>) -> Json<RosterResult> {
    let client = Arc::clone(&app.client);
    let result = roster::collect(app.registry.grids(), client, app.query_timeout).await;
    Json(result)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.snapshot(&app.registry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{PlayerRecord, QueryError, ServerInfo};
    use crate::registry::GridDescriptor;
    use async_trait::async_trait;
    use axum::body::{self, Body};
    use axum::http::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt; // for `oneshot`

    /// Compte les appels ; le port 1 répond, les autres non
    #[derive(Default)]
    struct CountingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QueryClient for CountingClient {
        async fn info(&self, _: &str, port: u16, _: Duration) -> Result<ServerInfo, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if port != 1 {
                return Err(QueryError::NoResponse);
            }
            Ok(ServerInfo {
                server_name: Some("Alpha".into()),
                map: Some("de_dust2".into()),
                player_count: Some(0),
                max_players: Some(10),
            })
        }

        async fn players(
            &self,
            _: &str,
            _: u16,
            _: Duration,
        ) -> Result<Vec<PlayerRecord>, QueryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    fn app_with(client: Arc<CountingClient>) -> Router {
        let cfg = KernelConfig::from_yaml(
            "access:\n  allowed_users: [\"42\"]\ngrids: []\n\
             server:\n  probe_timeout_ms: 200\n  query_timeout_ms: 200\n",
        )
        .unwrap();
        let registry = GridRegistry::new(vec![
            GridDescriptor::new("a", "127.0.0.1", 1),
            GridDescriptor::new("b", "127.0.0.1", 2),
        ])
        .unwrap();
        build_router(AppState::new(&cfg, registry, client))
    }

    fn get(uri: &str, caller: Option<&str>) -> Request<Body> {
        let mut req = Request::builder().uri(uri);
        if let Some(id) = caller {
            req = req.header(CALLER_HEADER, id);
        }
        req.body(Body::empty()).unwrap()
    }

    async fn json(resp: Response) -> serde_json::Value {
        let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let resp = app_with(Arc::default()).oneshot(get("/health", None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rejects_before_aggregation() {
        let client = Arc::new(CountingClient::default());
        for caller in [None, Some("7"), Some("")] {
            for uri in ["/api/players", "/api/status", "/system/health"] {
                let resp = app_with(Arc::clone(&client)).oneshot(get(uri, caller)).await.unwrap();
                assert_eq!(resp.status(), StatusCode::FORBIDDEN, "{uri} {caller:?}");
            }
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_players_one_entry_per_grid() {
        let client = Arc::new(CountingClient::default());
        let resp = app_with(Arc::clone(&client))
            .oneshot(get("/api/players", Some("42")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json(resp).await,
            serde_json::json!({
                "a": {"name": "Alpha", "map": "de_dust2", "players": [], "max_players": 10},
                "b": {"error": "No response"}
            })
        );
        // a : info + players, b : info seulement
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_status_shape() {
        let resp = app_with(Arc::default()).oneshot(get("/api/status", Some("42"))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json(resp).await;
        let map = body.as_object().unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.values().all(serde_json::Value::is_boolean));
    }

    #[tokio::test]
    async fn test_system_health() {
        let resp = app_with(Arc::default())
            .oneshot(get("/system/health", Some("42")))
            .await
            .unwrap();
        let body = json(resp).await;
        assert_eq!(body["grids_configured"], 2);
    }
}

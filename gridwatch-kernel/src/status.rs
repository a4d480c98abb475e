use crate::probe::probe;
use crate::registry::GridDescriptor;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// grid id -> joignable
pub type ReachabilityResult = BTreeMap<String, bool>;

/// Lance une sonde par grid en parallèle et attend toutes les réponses.
/// Durée totale ≈ un seul `limit`, pas N fois.
pub async fn check(grids: &[GridDescriptor], limit: Duration) -> ReachabilityResult {
    check_with(grids, move |host, port| async move { probe(&host, port, limit).await }).await
}

/// Même fan-out que `check`, avec une sonde fournie par l'appelant.
pub async fn check_with<P, Fut>(grids: &[GridDescriptor], prober: P) -> ReachabilityResult
where
    P: Fn(String, u16) -> Fut,
    Fut: Future<Output = bool> + Send + 'static,
{
    let tasks = grids
        .iter()
        .map(|grid| tokio::spawn(prober(grid.host.clone(), grid.port)));

    let outcomes = join_all(tasks).await;

    grids
        .iter()
        .zip(outcomes)
        .map(|(grid, outcome)| {
            let open = outcome.unwrap_or_else(|e| {
                warn!(grid = %grid.id, error = %e, "probe task failed");
                false
            });
            if !open {
                debug!(grid = %grid.id, address = %grid.address(), "grid unreachable");
            }
            (grid.id.clone(), open)
        })
        .collect()
}

/**
 * ROSTER AGGREGATOR - Infos + joueurs de chaque grid, en parallèle
 *
 * RÔLE :
 * Interroger tous les grids via le `QueryClient`, une tâche par grid, et
 * rendre exactement une entrée par grid : soit le roster complet, soit une
 * faute typée. Une faute (ou un panic) dans un grid ne touche jamais les autres.
 *
 * POLITIQUE PAR GRID :
 * - pas de réponse avant le timeout      -> no_response
 * - champs obligatoires manquants        -> malformed_response
 * - toute autre erreur du client / panic -> transport_error
 * - info ok mais joueurs en échec        -> faute (pas de résultat partiel)
 */

use crate::query::{PlayerRecord, QueryClient, QueryError, ServerInfo};
use crate::registry::GridDescriptor;
use futures::future::join_all;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tracing::debug;

pub type RosterResult = BTreeMap<String, RosterEntry>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridRoster {
    #[serde(rename = "name")]
    pub server_name: String,
    #[serde(rename = "map")]
    pub current_map: String,
    pub players: Vec<PlayerRecord>,
    pub max_players: u32,
    #[serde(skip)]
    pub player_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    NoResponse,
    MalformedResponse,
    TransportError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterFault {
    pub kind: FaultKind,
    pub message: String,
}

impl From<QueryError> for RosterFault {
    fn from(e: QueryError) -> Self {
        let kind = match e {
            QueryError::NoResponse => FaultKind::NoResponse,
            QueryError::Malformed(_) => FaultKind::MalformedResponse,
            QueryError::Transport(_) => FaultKind::TransportError,
        };
        Self {
            kind,
            message: e.to_string(),
        }
    }
}

impl From<JoinError> for RosterFault {
    fn from(e: JoinError) -> Self {
        let message = if e.is_panic() {
            let payload = e.into_panic();
            payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "query task panicked".into())
        } else {
            e.to_string()
        };
        Self {
            kind: FaultKind::TransportError,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RosterEntry {
    Ok(GridRoster),
    Fault(RosterFault),
}

impl RosterEntry {
    pub fn is_ok(&self) -> bool {
        matches!(self, RosterEntry::Ok(_))
    }

    pub fn fault_kind(&self) -> Option<FaultKind> {
        match self {
            RosterEntry::Ok(_) => None,
            RosterEntry::Fault(f) => Some(f.kind),
        }
    }
}

/// Forme JSON de l'API : le roster, ou `{"error": "..."}`
impl Serialize for RosterEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RosterEntry::Ok(roster) => roster.serialize(serializer),
            RosterEntry::Fault(fault) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", &fault.message)?;
                map.end()
            }
        }
    }
}

/// Vérifie les champs obligatoires d'une réponse info
pub fn validate(info: ServerInfo, players: Vec<PlayerRecord>) -> Result<GridRoster, QueryError> {
    let missing = |field: &str| QueryError::Malformed(format!("missing field `{field}`"));

    let server_name = info.server_name.ok_or_else(|| missing("server_name"))?;
    let current_map = info.map.ok_or_else(|| missing("map"))?;
    let max_players = info.max_players.ok_or_else(|| missing("max_players"))?;
    let player_count = info
        .player_count
        .unwrap_or_else(|| u32::try_from(players.len()).unwrap_or(u32::MAX));

    Ok(GridRoster {
        server_name,
        current_map,
        players,
        max_players,
        player_count,
    })
}

async fn query_grid(
    client: &dyn QueryClient,
    grid: &GridDescriptor,
    limit: Duration,
) -> Result<GridRoster, QueryError> {
    let info = client.info(&grid.host, grid.port, limit).await?;
    let players = client.players(&grid.host, grid.port, limit).await?;
    validate(info, players)
}

/// Le timeout enveloppe l'échange complet (info + joueurs) d'un grid.
pub async fn collect(
    grids: &[GridDescriptor],
    client: Arc<dyn QueryClient>,
    limit: Duration,
) -> RosterResult {
    let tasks = grids.iter().cloned().map(|grid| {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            tokio::time::timeout(limit, query_grid(client.as_ref(), &grid, limit))
                .await
                .unwrap_or(Err(QueryError::NoResponse))
        })
    });

    let outcomes = join_all(tasks).await;

    grids
        .iter()
        .zip(outcomes)
        .map(|(grid, outcome)| {
            let entry = match outcome {
                Ok(Ok(roster)) => RosterEntry::Ok(roster),
                Ok(Err(e)) => RosterEntry::Fault(e.into()),
                Err(join) => RosterEntry::Fault(join.into()),
            };
            if let RosterEntry::Fault(fault) = &entry {
                debug!(
                    grid = %grid.id,
                    kind = ?fault.kind,
                    message = %fault.message,
                    "roster fault"
                );
            }
            (grid.id.clone(), entry)
        })
        .collect()
}

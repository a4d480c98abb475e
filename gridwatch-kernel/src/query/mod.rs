/**
 * QUERY CLIENT - Interface vers le protocole de requête des serveurs de jeu
 *
 * RÔLE :
 * Le kernel consomme ce trait sans connaître le protocole. `A2sClient` en est
 * l'implémentation concrète (requêtes Source Engine sur UDP) ; les tests
 * peuvent injecter leur propre client.
 *
 * CONTRAT :
 * - chaque appel respecte le `timeout` reçu
 * - `ServerInfo` est rendu tel que reçu : la validation structurelle est faite
 *   par l'agrégateur roster, pas ici
 */

pub mod a2s;

pub use a2s::A2sClient;

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("No response")]
    NoResponse,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("{0}")]
    Transport(String),
}

impl From<std::io::Error> for QueryError {
    fn from(e: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match e.kind() {
            // ICMP port unreachable sur une socket UDP connectée
            ErrorKind::ConnectionRefused | ErrorKind::TimedOut | ErrorKind::WouldBlock => {
                QueryError::NoResponse
            }
            _ => QueryError::Transport(e.to_string()),
        }
    }
}

/// Métadonnées du serveur, champs optionnels tant qu'ils n'ont pas été validés
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerInfo {
    pub server_name: Option<String>,
    pub map: Option<String>,
    pub player_count: Option<u32>,
    pub max_players: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerRecord {
    pub name: String,
    pub score: i32,
    /// secondes passées sur le serveur
    pub duration: f32,
}

#[async_trait]
pub trait QueryClient: Send + Sync {
    async fn info(&self, host: &str, port: u16, timeout: Duration)
        -> Result<ServerInfo, QueryError>;

    async fn players(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Vec<PlayerRecord>, QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};

    #[test]
    fn test_io_error_classification() {
        assert_eq!(
            QueryError::from(Error::from(ErrorKind::ConnectionRefused)),
            QueryError::NoResponse
        );
        assert_eq!(QueryError::from(Error::from(ErrorKind::TimedOut)), QueryError::NoResponse);
        assert!(matches!(
            QueryError::from(Error::new(ErrorKind::ConnectionReset, "reset by peer")),
            QueryError::Transport(msg) if msg == "reset by peer"
        ));
    }

    #[test]
    fn test_display_matches_api_text() {
        assert_eq!(QueryError::NoResponse.to_string(), "No response");
        assert_eq!(QueryError::Transport("boom".into()).to_string(), "boom");
    }
}

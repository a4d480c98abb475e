/**
 * CONFIG KERNEL - Chargement et validation du document YAML de démarrage
 *
 * RÔLE : Lire `config.yaml` (grids + identités autorisées + réglages serveur).
 * Toute anomalie est fatale : le kernel refuse de démarrer plutôt que de
 * servir une configuration partielle.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
pub const DEFAULT_GRID_HOST: &str = "127.0.0.1";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 1000;

/// Erreurs de configuration : toutes fatales au démarrage
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML in config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("grid #{index} ({id}): invalid `{field}`: {reason}")]
    InvalidGrid {
        index: usize,
        id: String,
        field: &'static str,
        reason: String,
    },
    #[error("duplicate grid id `{0}`")]
    DuplicateGridId(String),
    #[error("server.{field}: {reason}")]
    InvalidServer { field: &'static str, reason: String },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct KernelConfig {
    pub grids: Vec<GridConf>,
    #[serde(default, alias = "discord")]
    pub access: AccessConf,
    #[serde(default)]
    pub server: ServerConf,
}

/// Entrée brute d'un grid, telle qu'écrite dans le YAML.
/// Le port reste un entier signé ici pour pouvoir nommer l'entrée fautive.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GridConf {
    pub id: String,
    pub port: i64,
    pub host: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct AccessConf {
    #[serde(default)]
    pub allowed_users: Vec<Identity>,
}

/// Les IDs Discord sont souvent écrits comme entiers dans le YAML
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Identity {
    Text(String),
    Number(u64),
}

impl Identity {
    pub fn as_key(&self) -> String {
        match self {
            Identity::Text(s) => s.trim().to_string(),
            Identity::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConf {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

fn default_listen() -> String {
    DEFAULT_LISTEN.into()
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_query_timeout_ms() -> u64 {
    DEFAULT_QUERY_TIMEOUT_MS
}

impl Default for ServerConf {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
        }
    }
}

impl ServerConf {
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen.parse().map_err(|e| ConfigError::InvalidServer {
            field: "listen",
            reason: format!("`{}`: {e}", self.listen),
        })
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.probe_timeout_ms == 0 || self.probe_timeout_ms >= 1000 {
            return Err(ConfigError::InvalidServer {
                field: "probe_timeout_ms",
                reason: format!("must be between 1 and 999, got {}", self.probe_timeout_ms),
            });
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::InvalidServer {
                field: "query_timeout_ms",
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl KernelConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, ConfigError> {
        let cfg: KernelConfig = serde_yaml::from_str(txt)?;
        cfg.server.validate()?;
        Ok(cfg)
    }

    /// Ensemble normalisé des identités autorisées
    pub fn allowed_users(&self) -> HashSet<String> {
        self.access
            .allowed_users
            .iter()
            .map(Identity::as_key)
            .filter(|k| !k.is_empty())
            .collect()
    }
}

/// Chemin du document : `GRIDWATCH_CONFIG` sinon `config.yaml`
pub fn config_path() -> PathBuf {
    std::env::var("GRIDWATCH_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into())
        .into()
}

pub async fn load_config(path: impl AsRef<Path>) -> Result<KernelConfig, ConfigError> {
    let path = path.as_ref();
    let txt = fs::read_to_string(path).await.map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    KernelConfig::from_yaml(&txt)
}

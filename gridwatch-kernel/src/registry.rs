/**
 * GRID REGISTRY - Liste immuable des grids surveillés
 *
 * RÔLE : Valider les entrées `grids` de la config une seule fois au démarrage.
 * Le registre est ensuite partagé en lecture seule (Arc) par toutes les requêtes.
 */

use crate::config::{ConfigError, GridConf, DEFAULT_GRID_HOST};
use serde::Serialize;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GridDescriptor {
    pub id: String,
    pub host: String,
    pub port: u16,
}

impl GridDescriptor {
    pub fn new(id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            port,
        }
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GridRegistry {
    grids: Arc<[GridDescriptor]>,
}

impl GridRegistry {
    /// Valide toutes les entrées ; la première invalide fait échouer le chargement.
    pub fn load(entries: &[GridConf]) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut grids = Vec::with_capacity(entries.len());

        for (index, entry) in entries.iter().enumerate() {
            let grid = validate_entry(index, entry)?;
            if !seen.insert(grid.id.clone()) {
                return Err(ConfigError::DuplicateGridId(grid.id));
            }
            grids.push(grid);
        }

        Ok(Self { grids: grids.into() })
    }

    /// Même validation que `load`, pour des descripteurs construits en code.
    pub fn new(grids: Vec<GridDescriptor>) -> Result<Self, ConfigError> {
        let entries: Vec<GridConf> = grids
            .into_iter()
            .map(|g| GridConf {
                id: g.id,
                port: i64::from(g.port),
                host: Some(g.host),
            })
            .collect();
        Self::load(&entries)
    }

    pub fn grids(&self) -> &[GridDescriptor] {
        &self.grids
    }

    pub fn get(&self, id: &str) -> Option<&GridDescriptor> {
        self.grids.iter().find(|g| g.id == id)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

fn validate_entry(index: usize, entry: &GridConf) -> Result<GridDescriptor, ConfigError> {
    let invalid = |field: &'static str, reason: String| ConfigError::InvalidGrid {
        index,
        id: entry.id.clone(),
        field,
        reason,
    };

    let id = entry.id.trim();
    if id.is_empty() {
        return Err(invalid("id", "must not be empty".into()));
    }

    let host = entry.host.as_deref().unwrap_or(DEFAULT_GRID_HOST).trim();
    if !is_valid_host(host) {
        return Err(invalid("host", format!("`{host}` is not an IP address or hostname")));
    }

    let port = u16::try_from(entry.port)
        .ok()
        .filter(|p| *p != 0)
        .ok_or_else(|| invalid("port", format!("{} is outside 1..=65535", entry.port)))?;

    Ok(GridDescriptor::new(id, host, port))
}

fn is_valid_host(host: &str) -> bool {
    if host.is_empty() {
        return false;
    }
    if host.parse::<IpAddr>().is_ok() {
        return true;
    }
    host.len() <= 253
        && host
            .split('.')
            .all(|label| {
                !label.is_empty()
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conf(id: &str, port: i64, host: Option<&str>) -> GridConf {
        GridConf {
            id: id.into(),
            port,
            host: host.map(Into::into),
        }
    }

    #[test]
    fn test_load_defaults_host_to_loopback() {
        let registry = GridRegistry::load(&[conf("a", 27015, None)]).unwrap();
        assert_eq!(registry.grids()[0], GridDescriptor::new("a", "127.0.0.1", 27015));
        assert_eq!(registry.get("a").unwrap().address(), "127.0.0.1:27015");
    }

    #[test]
    fn test_preserves_config_order() {
        let registry = GridRegistry::load(&[
            conf("z", 1, None),
            conf("a", 2, Some("game.example.net")),
        ])
        .unwrap();
        let ids: Vec<_> = registry.grids().iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["z", "a"]);
    }

    #[test]
    fn test_rejects_empty_id() {
        let err = GridRegistry::load(&[conf("  ", 27015, None)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGrid { index: 0, field: "id", .. }));
    }

    #[test]
    fn test_rejects_port_out_of_range() {
        for port in [0, -1, 65536] {
            let err = GridRegistry::load(&[conf("ok", 27015, None), conf("bad", port, None)])
                .unwrap_err();
            match err {
                ConfigError::InvalidGrid { index, id, field, .. } => {
                    assert_eq!(index, 1);
                    assert_eq!(id, "bad");
                    assert_eq!(field, "port");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    #[test]
    fn test_rejects_bad_host() {
        for host in ["", "has space", "-leading.example", "a..b"] {
            let err = GridRegistry::load(&[conf("a", 27015, Some(host))]).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidGrid { field: "host", .. }), "{host}");
        }
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = GridRegistry::load(&[conf("a", 1, None), conf("a", 2, None)]).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateGridId(id) if id == "a"));
    }

    #[test]
    fn test_new_validates_descriptors() {
        let err = GridRegistry::new(vec![
            GridDescriptor::new("a", "127.0.0.1", 27015),
            GridDescriptor::new("a", "127.0.0.1", 27016),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateGridId(id) if id == "a"));

        let err = GridRegistry::new(vec![GridDescriptor::new("z", "127.0.0.1", 0)]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGrid { field: "port", .. }));

        let registry =
            GridRegistry::new(vec![GridDescriptor::new("b", "10.0.0.2", 27016)]).unwrap();
        assert_eq!(registry.get("b").unwrap().address(), "10.0.0.2:27016");
    }

    #[test]
    fn test_empty_registry_is_allowed() {
        let registry = GridRegistry::load(&[]).unwrap();
        assert!(registry.is_empty());
    }
}

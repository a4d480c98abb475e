use crate::registry::GridRegistry;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub grids_configured: u32,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    pub fn snapshot(&self, registry: &GridRegistry) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            grids_configured: registry.len() as u32,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::GridDescriptor;

    #[test]
    fn test_snapshot_counts_grids() {
        let registry = GridRegistry::new(vec![
            GridDescriptor::new("a", "127.0.0.1", 27015),
            GridDescriptor::new("b", "127.0.0.1", 27016),
        ])
        .unwrap();
        let health = HealthTracker::new().snapshot(&registry);
        assert_eq!(health.grids_configured, 2);
        assert_eq!(health.uptime_seconds, 0);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::info;

use super::{Balancer, RouteError};
use crate::config::ConfigError;

/// Round-robin over a static server list.
///
/// A shared 64-bit counter is bumped once per call; the selected index is the
/// counter modulo the server count. The session key plays no role.
pub struct RoundRobinBalancer {
    servers: Vec<String>,
    next_index: AtomicU64,
}

impl RoundRobinBalancer {
    pub fn new(servers: Vec<String>) -> Result<Self, ConfigError> {
        if servers.is_empty() {
            return Err(ConfigError::EmptyServerList {
                policy: "round-robin",
            });
        }
        info!(
            server_count = servers.len(),
            "created round robin load balancer"
        );
        Ok(Self {
            servers,
            next_index: AtomicU64::new(0),
        })
    }
}

impl Balancer for RoundRobinBalancer {
    fn route_segment(
        &self,
        _session_key: &str,
        channel: &str,
        chunk: &str,
    ) -> Result<String, RouteError> {
        let counter = self.next_index.fetch_add(1, Ordering::Relaxed);
        let index = (counter % self.servers.len() as u64) as usize;
        Ok(format!("{}/hls/{}/{}", self.servers[index], channel, chunk))
    }
}

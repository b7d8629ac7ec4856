use std::sync::Arc;

use relay_core::{Balancer, EdgeDiscovery, PlaylistCache};

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<PlaylistCache>,
    pub balancer: Arc<dyn Balancer>,
    pub discovery: Option<Arc<EdgeDiscovery>>,
    /// Header to read the client IP from; falls back to the peer address.
    pub ip_header_name: Option<String>,
    /// CORS allow-list; empty means wildcard.
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(cache: Arc<PlaylistCache>, balancer: Arc<dyn Balancer>) -> Self {
        Self {
            cache,
            balancer,
            discovery: None,
            ip_header_name: None,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<EdgeDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_ip_header_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.ip_header_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

//! TOML configuration file schema and parsing.
//!
//! Example config file:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! log_format = "json"
//! ip_header_name = "X-Forwarded-For"
//! cors_origins = ["https://player.example.com"]
//!
//! [upstream]
//! servers = ["http://origin-1:8080", "http://origin-2:8080"]
//! cache_ttl_ms = 4000
//!
//! [discovery]
//! api = "https://api.example.com/v1/edges"
//! region = "eu-central"
//! domain_format = "%s.edge.example.com"
//! refresh_interval_secs = 60
//!
//! [balancer]
//! policy = "consistent-hash"
//! replication_factor = 1000
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use relay_core::{BalancerConfig, BalancerPolicy, DiscoveryConfig, WeightedEntry};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub discovery: Option<DiscoverySection>,

    #[serde(default)]
    pub balancer: BalancerSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Header carrying the client IP; empty means use the peer address.
    #[serde(default)]
    pub ip_header_name: String,

    /// CORS allow-list; empty means wildcard.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            log_format: default_log_format(),
            ip_header_name: String::new(),
            cors_origins: Vec::new(),
        }
    }
}

fn default_listen() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_log_format() -> String {
    "pretty".into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Ordered origin base URLs; tried first to last on every load.
    pub servers: Vec<String>,

    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_cache_ttl_ms() -> u64 {
    4000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

impl UpstreamConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySection {
    pub api: String,
    pub region: String,
    pub domain_format: String,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

fn default_refresh_interval_secs() -> u64 {
    60
}

impl DiscoverySection {
    pub fn to_discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            api: self.api.clone(),
            region: self.region.clone(),
            domain_format: self.domain_format.clone(),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalancerSection {
    #[serde(default = "default_policy")]
    pub policy: BalancerPolicy,

    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Static membership for the round-robin policy.
    #[serde(default)]
    pub servers: Vec<String>,

    /// Static membership for the weighted-random policy.
    #[serde(default)]
    pub weighted: Vec<WeightedEntry>,
}

impl Default for BalancerSection {
    fn default() -> Self {
        Self {
            policy: default_policy(),
            replication_factor: default_replication_factor(),
            servers: Vec::new(),
            weighted: Vec::new(),
        }
    }
}

fn default_policy() -> BalancerPolicy {
    BalancerPolicy::ConsistentHash
}

fn default_replication_factor() -> usize {
    1000
}

impl BalancerSection {
    pub fn to_balancer_config(&self) -> BalancerConfig {
        BalancerConfig {
            policy: self.policy,
            replication_factor: self.replication_factor,
            servers: self.servers.clone(),
            weighted: self.weighted.clone(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;

        let config: AppConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.upstream.servers.is_empty() {
            return Err("No upstream servers configured".into());
        }
        for (i, server) in self.upstream.servers.iter().enumerate() {
            validate_http_url(server)
                .map_err(|e| format!("Invalid upstream server at index {}: {}", i, e))?;
        }

        match self.server.log_format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(format!(
                    "Invalid log_format '{}': must be 'pretty' or 'json'",
                    other
                ));
            }
        }

        for (i, origin) in self.server.cors_origins.iter().enumerate() {
            validate_http_url(origin)
                .map_err(|e| format!("Invalid CORS origin at index {}: {}", i, e))?;
        }

        if let Some(ref discovery) = self.discovery {
            discovery
                .to_discovery_config()
                .validate()
                .map_err(|e| format!("Invalid discovery config: {}", e))?;
        }

        let balancer = self.balancer.to_balancer_config();
        balancer
            .validate()
            .map_err(|e| format!("Invalid balancer config: {}", e))?;
        if balancer.policy == BalancerPolicy::ConsistentHash && self.discovery.is_none() {
            return Err("consistent-hash balancer requires a [discovery] section".into());
        }

        Ok(())
    }
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("{} ({})", raw, e))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(format!("{} (scheme must be http or https)", raw));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[discovery]
api = "https://api.example.com/v1/edges"
region = "eu"
domain_format = "%s.edge.example.com"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 8080);
        assert_eq!(config.server.log_format, "pretty");
        assert_eq!(config.upstream.cache_ttl_ms, 4000);
        assert_eq!(config.balancer.policy, BalancerPolicy::ConsistentHash);
        assert_eq!(config.balancer.replication_factor, 1000);
        assert_eq!(
            config.discovery.as_ref().unwrap().refresh_interval_secs,
            60
        );
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[server]
listen = "127.0.0.1:9090"
log_format = "json"
ip_header_name = "X-Forwarded-For"
cors_origins = ["https://player.example.com"]

[upstream]
servers = ["http://origin-1:8080", "http://origin-2:8080"]
cache_ttl_ms = 2000
request_timeout_ms = 5000

[discovery]
api = "https://api.example.com/v1/edges"
region = "us-east"
domain_format = "%s.cdn.example.com"
refresh_interval_secs = 30

[balancer]
policy = "consistent-hash"
replication_factor = 500
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.listen.port(), 9090);
        assert_eq!(config.server.ip_header_name, "X-Forwarded-For");
        assert_eq!(config.upstream.servers.len(), 2);
        assert_eq!(config.upstream.cache_ttl(), Duration::from_secs(2));
        assert_eq!(config.balancer.replication_factor, 500);

        let discovery = config.discovery.unwrap().to_discovery_config();
        assert_eq!(discovery.refresh_interval, Duration::from_secs(30));
        assert_eq!(discovery.format_domain("iad1"), "iad1.cdn.example.com");
    }

    #[test]
    fn parse_round_robin_config() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[balancer]
policy = "round-robin"
servers = ["https://edge-1.example.com", "https://edge-2.example.com"]
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.balancer.policy, BalancerPolicy::RoundRobin);
        assert_eq!(config.balancer.servers.len(), 2);
    }

    #[test]
    fn parse_weighted_random_config() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[balancer]
policy = "weighted-random"

[[balancer.weighted]]
address = "https://edge-1.example.com"
weight = 3.0

[[balancer.weighted]]
address = "https://edge-2.example.com"
weight = 1.0
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.balancer.weighted.len(), 2);
        assert_eq!(config.balancer.weighted[0].weight, 3.0);
    }

    #[test]
    fn validate_rejects_missing_upstreams() {
        let toml = r#"
[upstream]
servers = []
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("No upstream servers"), "{}", err);
    }

    #[test]
    fn validate_rejects_bad_upstream_url() {
        let toml = r#"
[upstream]
servers = ["not-a-url"]
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid upstream server"), "{}", err);
    }

    #[test]
    fn validate_rejects_zero_replication_factor() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[discovery]
api = "https://api.example.com/v1/edges"
region = "eu"
domain_format = "%s.edge.example.com"

[balancer]
policy = "consistent-hash"
replication_factor = 0
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("replication factor"), "{}", err);
    }

    #[test]
    fn validate_requires_discovery_for_consistent_hash() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[balancer]
policy = "consistent-hash"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("requires a [discovery] section"), "{}", err);
    }

    #[test]
    fn validate_rejects_bad_domain_format() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[discovery]
api = "https://api.example.com/v1/edges"
region = "eu"
domain_format = "edge.example.com"
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("domain format"), "{}", err);
    }

    #[test]
    fn validate_rejects_all_zero_weights() {
        let toml = r#"
[upstream]
servers = ["http://origin-1:8080"]

[balancer]
policy = "weighted-random"

[[balancer.weighted]]
address = "https://edge-1.example.com"
weight = 0.0
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("zero weight"), "{}", err);
    }

    #[test]
    fn validate_rejects_invalid_log_format() {
        let toml = r#"
[server]
log_format = "xml"

[upstream]
servers = ["http://origin-1:8080"]

[balancer]
policy = "round-robin"
servers = ["https://edge-1.example.com"]
"#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.contains("Invalid log_format"), "{}", err);
    }
}

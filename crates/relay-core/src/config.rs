use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::balancer::WeightedEntry;

/// Configuration failures are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("replication factor is zero")]
    ZeroReplicationFactor,
    #[error("all servers have zero weight")]
    ZeroWeightSum,
    #[error("negative weight for {address}")]
    NegativeWeight { address: String },
    #[error("{policy} balancer has no servers configured")]
    EmptyServerList { policy: &'static str },
    #[error("domain format must contain exactly one %s: {format}")]
    BadDomainFormat { format: String },
    #[error("no upstream servers configured")]
    NoUpstreams,
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("consistent-hash balancer requires a discovery section")]
    MissingDiscovery,
}

/// Settings for the edge discovery poller.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Discovery API endpoint returning the per-region edge list.
    pub api: String,
    /// Region key to read out of the response.
    pub region: String,
    /// Format string with one `%s` turning a subdomain into a full domain.
    pub domain_format: String,
    /// Interval between polls.
    pub refresh_interval: Duration,
}

impl DiscoveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain_format.matches("%s").count() != 1 {
            return Err(ConfigError::BadDomainFormat {
                format: self.domain_format.clone(),
            });
        }
        validate_http_url(&self.api)?;
        Ok(())
    }

    /// Expand a discovered subdomain into a full edge domain.
    pub fn format_domain(&self, subdomain: &str) -> String {
        self.domain_format.replacen("%s", subdomain, 1)
    }
}

/// Which routing policy to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BalancerPolicy {
    ConsistentHash,
    RoundRobin,
    WeightedRandom,
}

/// Settings for the load balancer, covering all three policies.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    pub policy: BalancerPolicy,
    /// Ring entries per edge (consistent-hash only).
    pub replication_factor: usize,
    /// Static membership for round-robin.
    pub servers: Vec<String>,
    /// Static membership for weighted-random.
    pub weighted: Vec<WeightedEntry>,
}

impl BalancerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.policy {
            BalancerPolicy::ConsistentHash => {
                if self.replication_factor == 0 {
                    return Err(ConfigError::ZeroReplicationFactor);
                }
            }
            BalancerPolicy::RoundRobin => {
                if self.servers.is_empty() {
                    return Err(ConfigError::EmptyServerList {
                        policy: "round-robin",
                    });
                }
            }
            BalancerPolicy::WeightedRandom => {
                if self.weighted.is_empty() {
                    return Err(ConfigError::EmptyServerList {
                        policy: "weighted-random",
                    });
                }
                let mut sum = 0.0;
                for entry in &self.weighted {
                    if entry.weight < 0.0 {
                        return Err(ConfigError::NegativeWeight {
                            address: entry.address.clone(),
                        });
                    }
                    sum += entry.weight;
                }
                if sum == 0.0 {
                    return Err(ConfigError::ZeroWeightSum);
                }
            }
        }
        Ok(())
    }
}

pub fn validate_http_url(raw: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConfigError::InvalidUrl {
            url: raw.to_string(),
            reason: "scheme must be http or https".into(),
        });
    }
    Ok(())
}

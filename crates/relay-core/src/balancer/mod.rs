//! Load balancing policies for routing segment requests to edges.
//!
//! All three policies implement [`Balancer`] and produce URLs of the shape
//! `{edge}/hls/{channel}/{chunk}`. The session key only influences the
//! consistent-hash policy; the others accept and ignore it.

mod consistent_hash;
mod round_robin;
mod weighted_random;

pub use consistent_hash::ConsistentHashBalancer;
pub use round_robin::RoundRobinBalancer;
pub use weighted_random::{WeightedEntry, WeightedRandomBalancer};

use std::sync::Arc;

use thiserror::Error;

use crate::config::{BalancerConfig, BalancerPolicy, ConfigError};
use crate::discovery::EdgeDiscovery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("no servers available")]
    NoServers,
    #[error("failed to select a server")]
    SelectionFailed,
}

/// Maps a `(session, channel, chunk)` triple to a concrete edge URL.
pub trait Balancer: Send + Sync {
    fn route_segment(
        &self,
        session_key: &str,
        channel: &str,
        chunk: &str,
    ) -> Result<String, RouteError>;
}

/// Construct the configured policy.
///
/// Static policies take their membership from the config; the consistent-hash
/// policy subscribes to the discovery poller and tracks membership live.
pub fn from_config(
    config: &BalancerConfig,
    discovery: Option<&Arc<EdgeDiscovery>>,
) -> Result<Arc<dyn Balancer>, ConfigError> {
    config.validate()?;
    match config.policy {
        BalancerPolicy::ConsistentHash => {
            let discovery = discovery.ok_or(ConfigError::MissingDiscovery)?;
            let balancer =
                ConsistentHashBalancer::new(config.replication_factor, discovery.subscribe())?;
            Ok(balancer)
        }
        BalancerPolicy::RoundRobin => {
            Ok(Arc::new(RoundRobinBalancer::new(config.servers.clone())?))
        }
        BalancerPolicy::WeightedRandom => Ok(Arc::new(WeightedRandomBalancer::new(
            config.weighted.clone(),
        )?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crate::discovery::EdgeDiscovery;

    fn base_config(policy: BalancerPolicy) -> BalancerConfig {
        BalancerConfig {
            policy,
            replication_factor: 100,
            servers: vec!["https://edge-1.example.com".into()],
            weighted: vec![WeightedEntry {
                address: "https://edge-1.example.com".into(),
                weight: 1.0,
            }],
        }
    }

    #[test]
    fn builds_static_policies_without_discovery() {
        let round_robin = from_config(&base_config(BalancerPolicy::RoundRobin), None).unwrap();
        assert!(round_robin.route_segment("s", "ch", "0.ts").is_ok());

        let weighted = from_config(&base_config(BalancerPolicy::WeightedRandom), None).unwrap();
        assert!(weighted.route_segment("s", "ch", "0.ts").is_ok());
    }

    #[test]
    fn consistent_hash_without_discovery_is_rejected() {
        assert!(matches!(
            from_config(&base_config(BalancerPolicy::ConsistentHash), None),
            Err(ConfigError::MissingDiscovery)
        ));
    }

    #[tokio::test]
    async fn consistent_hash_subscribes_to_discovery() {
        let discovery = std::sync::Arc::new(EdgeDiscovery::new(
            crate::config::DiscoveryConfig {
                api: "https://api.example.com/v1/edges".into(),
                region: "eu".into(),
                domain_format: "%s.edge.example.com".into(),
                refresh_interval: Duration::from_secs(60),
            },
            reqwest::Client::new(),
        ));

        let balancer = from_config(
            &base_config(BalancerPolicy::ConsistentHash),
            Some(&discovery),
        )
        .unwrap();

        // Empty registry routes nothing yet.
        assert_eq!(
            balancer.route_segment("s", "ch", "0.ts"),
            Err(RouteError::NoServers)
        );
    }
}

use rand::Rng;
use serde::Deserialize;
use tracing::info;

use super::{Balancer, RouteError};
use crate::config::ConfigError;

/// One weighted upstream in the static membership list.
#[derive(Debug, Clone, Deserialize)]
pub struct WeightedEntry {
    pub address: String,
    pub weight: f64,
}

/// Weighted random selection over a static server list.
///
/// Each call draws a uniform value in `[0, Σweights)` and walks the entries
/// in configured order, subtracting weights until the draw lands inside one.
/// Selection probability is proportional to weight; zero-weight entries are
/// never selected.
#[derive(Debug)]
pub struct WeightedRandomBalancer {
    entries: Vec<WeightedEntry>,
    weight_sum: f64,
}

impl WeightedRandomBalancer {
    pub fn new(entries: Vec<WeightedEntry>) -> Result<Self, ConfigError> {
        if entries.is_empty() {
            return Err(ConfigError::EmptyServerList {
                policy: "weighted-random",
            });
        }

        let mut weight_sum = 0.0;
        for entry in &entries {
            if entry.weight < 0.0 {
                return Err(ConfigError::NegativeWeight {
                    address: entry.address.clone(),
                });
            }
            weight_sum += entry.weight;
        }
        if weight_sum == 0.0 {
            return Err(ConfigError::ZeroWeightSum);
        }

        info!(
            server_count = entries.len(),
            "created weighted random load balancer"
        );
        Ok(Self {
            entries,
            weight_sum,
        })
    }
}

impl Balancer for WeightedRandomBalancer {
    fn route_segment(
        &self,
        _session_key: &str,
        channel: &str,
        chunk: &str,
    ) -> Result<String, RouteError> {
        let mut v = rand::thread_rng().gen::<f64>() * self.weight_sum;

        for entry in &self.entries {
            if v < entry.weight {
                return Ok(format!("{}/hls/{}/{}", entry.address, channel, chunk));
            }
            v -= entry.weight;
        }

        // Only reachable through floating-point rounding at the far edge of
        // the draw.
        Err(RouteError::SelectionFailed)
    }
}

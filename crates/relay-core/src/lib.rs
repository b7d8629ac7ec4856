#![forbid(unsafe_code)]

pub mod balancer;
pub mod cache;
pub mod config;
pub mod discovery;
pub mod loader;
pub mod playlist;
pub mod rewrite;

pub use balancer::{
    Balancer, ConsistentHashBalancer, RoundRobinBalancer, RouteError, WeightedEntry,
    WeightedRandomBalancer,
};
pub use cache::PlaylistCache;
pub use config::{BalancerConfig, BalancerPolicy, ConfigError, DiscoveryConfig};
pub use discovery::{
    DiscoveryError, Edge, EdgeDiscovery, EdgeEvent, EdgeNotifier, EdgeStatus, EdgeStatusReport,
};
pub use loader::{HttpLoader, LoadError, OriginError, PlaylistLoader};
pub use playlist::{HlsPlaylist, PlaylistKind};
pub use rewrite::rewrite_playlist;

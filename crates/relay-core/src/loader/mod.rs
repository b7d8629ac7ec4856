mod http;

pub use http::HttpLoader;

use async_trait::async_trait;
use thiserror::Error;

use crate::playlist::{HlsPlaylist, PlaylistKind};

/// A single failed attempt against one origin.
#[derive(Debug, Error)]
pub enum OriginError {
    #[error("HTTP error {status} fetching {url}")]
    Http { url: String, status: u16 },
    #[error("network error fetching {url}: {reason}")]
    Network { url: String, reason: String },
    #[error("malformed playlist from {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("{url} returned a {detected} playlist, requested {requested}")]
    KindMismatch {
        url: String,
        requested: PlaylistKind,
        detected: PlaylistKind,
    },
    #[error("no upstream servers configured")]
    NoOrigins,
}

#[derive(Debug, Error)]
pub enum LoadError {
    /// Every configured origin failed; carries the last attempt's cause.
    #[error("all upstream servers failed for channel {channel} ({kind}): {last_cause}")]
    UpstreamUnavailable {
        channel: String,
        kind: PlaylistKind,
        #[source]
        last_cause: OriginError,
    },
}

/// Trait for loading a channel's playlist from upstream.
///
/// Implementations handle transport, origin failover, and parsing, and return
/// the parsed playlist. Object-safe and Send + Sync so the cache can share
/// one loader across request tasks.
#[async_trait]
pub trait PlaylistLoader: Send + Sync {
    async fn load(&self, channel: &str, kind: PlaylistKind) -> Result<HlsPlaylist, LoadError>;
}

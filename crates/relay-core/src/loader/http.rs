use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::{LoadError, OriginError, PlaylistLoader};
use crate::playlist::{HlsPlaylist, PlaylistKind};

/// HTTP playlist loader with ordered-origin failover.
///
/// Origins are tried in configured order; the first one that returns a
/// well-formed playlist of the requested kind wins. Each attempt runs under
/// the client's bounded timeout.
#[derive(Debug, Clone)]
pub struct HttpLoader {
    client: Client,
    origins: Vec<String>,
}

impl HttpLoader {
    pub fn new(origins: Vec<String>, timeout: Duration) -> Self {
        Self::with_client(origins, Self::build_client(timeout))
    }

    pub fn with_client(origins: Vec<String>, client: Client) -> Self {
        let origins = origins
            .into_iter()
            .map(|o| o.trim_end_matches('/').to_string())
            .collect();
        Self { client, origins }
    }

    /// Shared client for origin and discovery traffic: bounded deadlines,
    /// pooled connections, gzip transfer.
    pub fn build_client(timeout: Duration) -> Client {
        Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .pool_max_idle_per_host(20)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client")
    }

    async fn fetch(&self, url: &str, requested: PlaylistKind) -> Result<HlsPlaylist, OriginError> {
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(OriginError::Network {
                    url: url.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        if !response.status().is_success() {
            return Err(OriginError::Http {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|e| OriginError::Network {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let playlist = HlsPlaylist::parse(&body).map_err(|e| OriginError::Malformed {
            url: url.to_string(),
            reason: e.reason,
        })?;

        if playlist.kind() != requested {
            return Err(OriginError::KindMismatch {
                url: url.to_string(),
                requested,
                detected: playlist.kind(),
            });
        }

        Ok(playlist)
    }
}

#[async_trait]
impl PlaylistLoader for HttpLoader {
    async fn load(&self, channel: &str, kind: PlaylistKind) -> Result<HlsPlaylist, LoadError> {
        let path = kind.origin_path(channel);
        let mut last_cause = OriginError::NoOrigins;

        for origin in &self.origins {
            let url = format!("{origin}{path}");
            match self.fetch(&url, kind).await {
                Ok(playlist) => {
                    debug!(channel, %kind, url, "loaded playlist from origin");
                    return Ok(playlist);
                }
                Err(e) => {
                    warn!(channel, %kind, error = %e, "origin attempt failed");
                    last_cause = e;
                }
            }
        }

        Err(LoadError::UpstreamUnavailable {
            channel: channel.to_string(),
            kind,
            last_cause,
        })
    }
}

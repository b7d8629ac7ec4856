//! Playlist rewriting: substitute child URIs with routed edge URLs.

use crate::balancer::{Balancer, RouteError};
use crate::playlist::HlsPlaylist;

/// Produce a copy of `playlist` in which every child URI has been replaced by
/// a routed edge URL.
///
/// Media playlists have their segment URIs rewritten; master playlists their
/// variant URIs and any alternative-rendition URIs. Entry order and every
/// non-URI field pass through the clone untouched. The first balancer
/// failure aborts the rewrite.
pub fn rewrite_playlist(
    playlist: &HlsPlaylist,
    session_key: &str,
    channel: &str,
    balancer: &dyn Balancer,
) -> Result<HlsPlaylist, RouteError> {
    match playlist {
        HlsPlaylist::Media(media) => {
            let mut routed = media.clone();
            for segment in &mut routed.segments {
                segment.uri = balancer.route_segment(session_key, channel, &segment.uri)?;
            }
            Ok(HlsPlaylist::Media(routed))
        }
        HlsPlaylist::Master(master) => {
            let mut routed = master.clone();
            for variant in &mut routed.variants {
                variant.uri = balancer.route_segment(session_key, channel, &variant.uri)?;
            }
            for media in &mut routed.alternatives {
                if let Some(uri) = media.uri.take() {
                    media.uri = Some(balancer.route_segment(session_key, channel, &uri)?);
                }
            }
            Ok(HlsPlaylist::Master(routed))
        }
    }
}

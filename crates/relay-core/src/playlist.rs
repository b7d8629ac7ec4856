use std::fmt;

use m3u8_rs::{MasterPlaylist, MediaPlaylist, Playlist};
use thiserror::Error;

/// The two HLS playlist kinds this proxy serves.
///
/// A master playlist references variant streams; a media playlist references
/// media segments. Both are fetched from different origin paths and both get
/// their child URIs rewritten before being returned to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaylistKind {
    Master,
    Media,
}

impl PlaylistKind {
    /// Origin request path for a channel's playlist of this kind.
    pub fn origin_path(&self, channel: &str) -> String {
        match self {
            Self::Master => format!("/hls/{channel}.m3u8"),
            Self::Media => format!("/hls/{channel}/index.m3u8"),
        }
    }
}

impl fmt::Display for PlaylistKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => write!(f, "master"),
            Self::Media => write!(f, "media"),
        }
    }
}

#[derive(Debug, Error)]
#[error("malformed playlist: {reason}")]
pub struct PlaylistParseError {
    pub reason: String,
}

/// A parsed HLS playlist of either kind.
///
/// Thin wrapper over the `m3u8-rs` structures so the cache and rewriter can
/// handle both kinds uniformly. Cloning is a deep copy of the parsed
/// structure; serialization is always recomputed from the current fields.
#[derive(Debug, Clone)]
pub enum HlsPlaylist {
    Master(MasterPlaylist),
    Media(MediaPlaylist),
}

impl HlsPlaylist {
    pub fn parse(bytes: &[u8]) -> Result<Self, PlaylistParseError> {
        match m3u8_rs::parse_playlist_res(bytes) {
            Ok(Playlist::MasterPlaylist(pl)) => Ok(Self::Master(pl)),
            Ok(Playlist::MediaPlaylist(pl)) => Ok(Self::Media(pl)),
            Err(e) => Err(PlaylistParseError {
                reason: e.to_string(),
            }),
        }
    }

    pub fn kind(&self) -> PlaylistKind {
        match self {
            Self::Master(_) => PlaylistKind::Master,
            Self::Media(_) => PlaylistKind::Media,
        }
    }

    /// `EXT-X-TARGETDURATION` in seconds. Master playlists carry none.
    pub fn target_duration(&self) -> Option<f32> {
        match self {
            Self::Master(_) => None,
            Self::Media(pl) => Some(pl.target_duration),
        }
    }

    /// Number of child URIs (variants + renditions, or segments).
    pub fn entry_count(&self) -> usize {
        match self {
            Self::Master(pl) => {
                pl.variants.len() + pl.alternatives.iter().filter(|a| a.uri.is_some()).count()
            }
            Self::Media(pl) => pl.segments.len(),
        }
    }

    /// Serialize back to M3U8 text.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1024);
        let result = match self {
            Self::Master(pl) => pl.write_to(&mut out),
            Self::Media(pl) => pl.write_to(&mut out),
        };
        result.expect("writing a playlist to an in-memory buffer cannot fail");
        out
    }
}

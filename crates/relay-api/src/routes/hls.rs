use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use relay_core::{rewrite_playlist, PlaylistKind};

use crate::error::ApiError;
use crate::state::AppState;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";

/// GET /hls/{channel}.m3u8
pub async fn master_playlist(
    State(state): State<AppState>,
    Path(file): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let channel = file
        .strip_suffix(".m3u8")
        .filter(|channel| !channel.is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest("playlist path must be /hls/{channel}.m3u8".into())
        })?;

    serve_routed(&state, channel, PlaylistKind::Master, &headers, peer).await
}

/// GET /hls/{channel}/index.m3u8
pub async fn media_playlist(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if channel.is_empty() {
        return Err(ApiError::BadRequest("channel must not be empty".into()));
    }

    serve_routed(&state, &channel, PlaylistKind::Media, &headers, peer).await
}

/// OPTIONS on both playlist routes.
///
/// The CORS layer answers true preflights (requests carrying
/// `Access-Control-Request-Method`) before they reach this handler and
/// attaches `Access-Control-Allow-Origin` everywhere; a bare OPTIONS lands
/// here and still gets the full preflight header set.
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Origin"),
            (header::ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
}

async fn serve_routed(
    state: &AppState,
    channel: &str,
    kind: PlaylistKind,
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<Response, ApiError> {
    let playlist = state.cache.get(channel, kind).await?;

    let session_key = session_key(headers, peer, state.ip_header_name.as_deref());
    let routed = rewrite_playlist(&playlist, &session_key, channel, state.balancer.as_ref())?;

    let body = routed.encode();
    Ok(([(header::CONTENT_TYPE, PLAYLIST_CONTENT_TYPE)], body).into_response())
}

/// Client IP from the configured header, else the peer address.
fn session_key(headers: &HeaderMap, peer: SocketAddr, header_name: Option<&str>) -> String {
    if let Some(name) = header_name {
        return headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
    }

    peer.ip().to_string()
}

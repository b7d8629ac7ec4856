use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use relay_core::EdgeStatusReport;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/edges", get(list_edges))
}

#[derive(Serialize)]
pub struct EdgesResponse {
    pub edges: Vec<EdgeStatusReport>,
}

/// GET /api/v1/edges: current discovery registry.
async fn list_edges(State(state): State<AppState>) -> Json<EdgesResponse> {
    let edges = state
        .discovery
        .as_ref()
        .map(|discovery| discovery.status_report())
        .unwrap_or_default();

    Json(EdgesResponse { edges })
}

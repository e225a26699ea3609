//! HTTP endpoint handlers. Thin wrappers over `AppState`.

use std::sync::Arc;
use axum::{extract::State, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let open_views = state.open_view_count().await;
  Json(HealthOut { ok: true, open_views })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_analytics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let out = AnalyticsOut::from(&state.analytics);
  info!(target: "discussion_responses", segment_enabled = out.segment_enabled, "HTTP analytics config served");
  Json(out)
}

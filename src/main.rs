//! Discussion Responses · course discussion client service
//!
//! - Responses view-model per WebSocket connection (paging, votes, flags, replies)
//! - Open edX style discussion REST API as the backing interactor
//! - Analytics routing config exposed over HTTP
//!
//! Important env variables:
//!   PORT                    : u16 (default 3000)
//!   DISCUSSION_CONFIG_PATH  : path to TOML config (api, messages, analytics, profile)
//!   DISCUSSION_API_BASE_URL : overrides [api].base_url
//!   DISCUSSION_ACCESS_TOKEN : overrides [api].access_token
//!   LOG_LEVEL               : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT              : "pretty" (default) or "json"

mod analytics;
mod config;
mod domain;
mod interactor;
mod notifier;
mod protocol;
mod responses;
mod routes;
mod session;
mod state;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

use crate::config::load_app_config_from_env;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  let cfg = load_app_config_from_env();
  let state = Arc::new(AppState::from_config(&cfg)?);

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "discussion_responses", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "discussion_responses", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "discussion_responses", error = %e, "Failed to listen for shutdown signal");
  }
}

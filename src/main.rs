//! GradeBridge · local assignment submission service
//!
//! - Axum HTTP + WebSocket API for one student session
//! - Debounced autosave to a local JSON store
//! - Portable backups and paginated document export (via an external renderer)
//! - Static UI fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                     : u16 (default 3000), bound on 127.0.0.1 only
//!   GRADEBRIDGE_CONFIG_PATH  : path to TOML config (storage, autosave, export, page)
//!   RENDERER_URL             : enables document export if present
//!   LOG_LEVEL                : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT               : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod schema;
mod config;
mod store;
mod session;
mod persist;
mod backup;
mod paginate;
mod render;
mod state;
mod protocol;
mod logic;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument, warn};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Config, store, restored session, renderer client.
  let state = Arc::new(AppState::new());

  let app = build_router(state.clone());

  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([127, 0, 0, 1], port)))
    .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "gradebridge", %addr, "HTTP server listening");
  axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

  // Don't lose the last edits of a debounce window.
  state.autosaver.flush().await;
  info!(target: "gradebridge", "Shut down cleanly");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    warn!(target: "gradebridge", error = %e, "Cannot listen for ctrl-c; running until killed");
    std::future::pending::<()>().await;
  }
  info!(target: "gradebridge", "Shutdown requested");
}

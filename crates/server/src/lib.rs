//! voxrelay HTTP server
//!
//! Actix-web boundary around the transcription pipeline.

pub mod routes;
pub mod state;
pub mod types;

use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use voxrelay_common::{AppConfig, Result};
use voxrelay_stt::workspace;

pub use state::AppState;

/// Start the HTTP server and block until it stops
pub async fn start_server(config: AppConfig) -> Result<()> {
    // No request is in flight yet, so anything under the root is stale
    match workspace::sweep_stale(&config.workspace_root) {
        Ok(0) => {}
        Ok(n) => info!("Removed {} stale workspace(s) from {}", n, config.workspace_root.display()),
        Err(e) => warn!("Failed to sweep {}: {}", config.workspace_root.display(), e),
    }

    let bind_addr = config.server_bind_address();
    let state = Arc::new(AppState::new(config)?);

    info!("Starting HTTP server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    info!("HTTP server stopped");

    Ok(())
}

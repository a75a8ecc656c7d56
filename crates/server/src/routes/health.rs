use actix_web::{get, web, HttpResponse};
use std::sync::Arc;

use crate::state::AppState;
use crate::types::HealthResponse;

/// Report whether the configured engine and model are in place
#[get("/health")]
pub async fn health(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let engine = state.pipeline.engine_config();
    // Bare names resolve through PATH, the same way the process is spawned
    let engine_available = which::which(&engine.program).is_ok();
    let model_available = engine.model_path.is_file();

    HttpResponse::Ok().json(HealthResponse {
        status: if engine_available && model_available {
            "ok"
        } else {
            "degraded"
        },
        engine_available,
        model_available,
        converter: state.config.ffmpeg_path.clone(),
        engine_threads: engine.threads,
    })
}

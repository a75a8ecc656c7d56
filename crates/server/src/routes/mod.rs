use actix_web::web;

pub mod health;
pub mod transcribe;

/// Register all HTTP routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(transcribe::transcribe).service(health::health);
}

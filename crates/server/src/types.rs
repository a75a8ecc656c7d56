use actix_web::http::StatusCode;
use actix_web::HttpResponse;
use serde::Serialize;
use voxrelay_common::{ErrorKind, TranscribeError};

/// Error body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Failure kind
    pub error: ErrorKind,

    /// Human readable detail
    pub message: String,
}

impl ErrorResponse {
    /// Build the HTTP response for a pipeline or upload error
    pub fn respond(err: &TranscribeError) -> HttpResponse {
        let status =
            StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        HttpResponse::build(status).json(Self {
            error: err.kind(),
            message: err.to_string(),
        })
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok" when the engine binary and model are present, else "degraded"
    pub status: &'static str,

    /// Engine executable found, directly or on PATH
    pub engine_available: bool,

    /// Model file exists
    pub model_available: bool,

    /// Configured converter command
    pub converter: String,

    /// Thread hint passed to the engine
    pub engine_threads: u32,
}

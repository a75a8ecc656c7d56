use std::sync::Arc;
use voxrelay_common::{AppConfig, Result};
use voxrelay_stt::{PipelineConfig, ProcessRunner, SystemProcessRunner, TranscriptionPipeline};

/// Shared application state
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,

    /// Transcription pipeline, shared read-only across requests
    pub pipeline: Arc<TranscriptionPipeline>,
}

impl AppState {
    /// Create application state backed by real subprocesses
    pub fn new(config: AppConfig) -> Result<Self> {
        Self::with_runner(config, Arc::new(SystemProcessRunner))
    }

    /// Create application state with a custom process runner
    pub fn with_runner(config: AppConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        let pipeline =
            TranscriptionPipeline::new(PipelineConfig::from_app_config(&config), runner)?;
        Ok(Self {
            config,
            pipeline: Arc::new(pipeline),
        })
    }
}

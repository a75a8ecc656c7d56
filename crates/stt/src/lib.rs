//! voxrelay STT orchestration
//!
//! Drives an external converter (FFmpeg) and recognition engine (whisper.cpp
//! CLI) as subordinate processes, one scratch workspace per request.

pub mod engine;
pub mod locator;
pub mod normalizer;
pub mod parser;
pub mod pipeline;
pub mod process;
pub mod types;
pub mod workspace;

// Re-export main types
pub use engine::{EngineConfig, EngineInvocation, EngineInvoker, TimeoutPolicy};
pub use locator::{DriftTolerantLocator, OutputLocator};
pub use normalizer::{is_supported_media, ConverterConfig, FormatNormalizer, SUPPORTED_EXTENSIONS};
pub use parser::ResultParser;
pub use pipeline::{
    PipelineConfig, PipelineStage, StageTracker, StagedUpload, TranscriptionPipeline, UploadedMedia,
};
pub use process::{ProcessError, ProcessOutput, ProcessRunner, ProcessSpec, SystemProcessRunner};
pub use types::{Segment, Transcript};
pub use workspace::Workspace;

//! Audio normalization
//!
//! Converts arbitrary uploaded media into the canonical format the engine
//! requires (mono, 16kHz, signed 16-bit PCM WAV) using FFmpeg.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use voxrelay_common::{Result, TranscribeError};

use crate::process::{tail_excerpt, ProcessError, ProcessRunner, ProcessSpec};
use crate::workspace::Workspace;

/// Supported upload extensions
pub const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "mp3", "m4a", "flac", "ogg", "mp4", "avi", "mov"];

/// Canonical audio file name inside a workspace
pub const CANONICAL_AUDIO_NAME: &str = "audio.wav";

/// Bound on stderr carried into error messages
pub(crate) const STDERR_EXCERPT_BYTES: usize = 1024;

/// Lowercased extension of `filename` if it is on the allow-list
pub fn supported_extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .filter(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
}

/// Check if file extension is supported
pub fn is_supported_media(filename: &str) -> bool {
    supported_extension(filename).is_some()
}

/// Converter executable and its fixed time ceiling
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    pub program: String,
    pub timeout: Duration,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            timeout: Duration::from_secs(180),
        }
    }
}

pub struct FormatNormalizer {
    config: ConverterConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl FormatNormalizer {
    pub fn new(config: ConverterConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// FFmpeg invocation converting `input` into `output`
    pub fn build_spec(&self, input: &Path, output: &Path) -> ProcessSpec {
        let args = vec![
            "-i".to_string(),
            input.to_string_lossy().into_owned(),
            "-ar".to_string(),
            "16000".to_string(), // 16kHz sample rate
            "-ac".to_string(),
            "1".to_string(), // Mono
            "-c:a".to_string(),
            "pcm_s16le".to_string(), // 16-bit PCM
            "-y".to_string(),        // Overwrite output
            output.to_string_lossy().into_owned(),
        ];
        ProcessSpec::new(&self.config.program, args, self.config.timeout)
    }

    /// Convert `input` to canonical audio inside `workspace`
    ///
    /// Returns the path of the converted WAV file. Failures are not retried.
    pub async fn normalize(&self, input: &Path, workspace: &Workspace) -> Result<PathBuf> {
        let output_path = workspace.join(CANONICAL_AUDIO_NAME);
        let spec = self.build_spec(input, &output_path);

        info!("Converting {} to canonical WAV", input.display());

        let output = self.runner.run(&spec).await.map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => TranscribeError::ConversionTimedOut {
                timeout_secs: timeout.as_secs(),
            },
            ProcessError::Spawn { .. } | ProcessError::Wait { .. } => TranscribeError::ConversionFailed {
                exit_code: None,
                stderr_excerpt: e.to_string(),
            },
        })?;

        if !output.success() {
            return Err(TranscribeError::ConversionFailed {
                exit_code: output.exit_code,
                stderr_excerpt: tail_excerpt(&output.stderr, STDERR_EXCERPT_BYTES),
            });
        }

        if !output_path.is_file() {
            return Err(TranscribeError::ConversionOutputMissing {
                path: output_path.display().to_string(),
            });
        }

        info!("FFmpeg conversion successful: {}", output_path.display());

        Ok(output_path)
    }
}

//! Recognition engine invocation
//!
//! Runs the whisper.cpp CLI against canonical audio. The engine writes its
//! JSON result to a file next to the audio; stdout is never parsed because
//! its format is not stable across engine versions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use voxrelay_common::{Result, TranscribeError};

use crate::normalizer::STDERR_EXCERPT_BYTES;
use crate::process::{tail_excerpt, ProcessError, ProcessRunner, ProcessSpec};
use crate::workspace::Workspace;

/// Output base name inside a workspace; the engine appends `.json`
pub const OUTPUT_BASE_NAME: &str = "transcript";

/// Size-based engine timeout policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub secs_per_mb: u64,
    pub min: Duration,
    pub max: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            secs_per_mb: 60,
            min: Duration::from_secs(300),
            max: Duration::from_secs(7200),
        }
    }
}

impl TimeoutPolicy {
    /// `clamp(size_mb * secs_per_mb, min, max)`
    ///
    /// Clamped in floating point so an oversized coefficient cannot overflow
    /// `Duration`. An inverted range collapses to `min`.
    pub fn derive(&self, input_bytes: u64) -> Duration {
        let size_mb = input_bytes as f64 / (1024.0 * 1024.0);
        let secs = size_mb * self.secs_per_mb as f64;
        let lo = self.min.as_secs_f64();
        let hi = self.max.as_secs_f64().max(lo);
        Duration::from_secs_f64(secs.clamp(lo, hi))
    }

    /// Reject bounds that cannot form a range
    pub fn validate(&self) -> Result<()> {
        if self.min.is_zero() || self.min > self.max {
            return Err(TranscribeError::config(format!(
                "Engine timeout bounds are invalid: min={}s max={}s",
                self.min.as_secs(),
                self.max.as_secs()
            )));
        }
        Ok(())
    }
}

/// Engine executable, model and scheduling hints
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub program: String,
    pub model_path: PathBuf,
    pub threads: u32,
    pub language: String,
    pub timeout: TimeoutPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            program: "/usr/local/bin/whisper".to_string(),
            model_path: PathBuf::from("/app/models/ggml-small.bin"),
            threads: 4,
            language: "auto".to_string(),
            timeout: TimeoutPolicy::default(),
        }
    }
}

/// A completed engine run
#[derive(Debug, Clone)]
pub struct EngineInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    /// Path handed to `-of`, without extension
    pub output_base: PathBuf,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl EngineInvocation {
    /// Path the engine is expected to write
    pub fn expected_output(&self) -> PathBuf {
        let mut name = self.output_base.clone().into_os_string();
        name.push(".json");
        PathBuf::from(name)
    }
}

pub struct EngineInvoker {
    config: EngineConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl EngineInvoker {
    pub fn new(config: EngineConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// whisper.cpp invocation for `audio`, writing JSON to `output_base`.json
    pub fn build_spec(&self, audio: &Path, output_base: &Path, timeout: Duration) -> ProcessSpec {
        let args = vec![
            "-m".to_string(),
            self.config.model_path.to_string_lossy().into_owned(),
            "-f".to_string(),
            audio.to_string_lossy().into_owned(),
            "-oj".to_string(),
            "-of".to_string(),
            output_base.to_string_lossy().into_owned(),
            "-t".to_string(),
            self.config.threads.to_string(),
            "-l".to_string(),
            self.config.language.clone(),
        ];
        ProcessSpec::new(&self.config.program, args, timeout)
    }

    /// Run the engine on `audio`
    ///
    /// The timeout is derived from `input_bytes`, the size of the original upload.
    pub async fn invoke(
        &self,
        audio: &Path,
        workspace: &Workspace,
        input_bytes: u64,
    ) -> Result<EngineInvocation> {
        let timeout = self.config.timeout.derive(input_bytes);
        let output_base = workspace.join(OUTPUT_BASE_NAME);
        let spec = self.build_spec(audio, &output_base, timeout);

        info!(
            "Running engine on {} (input {} bytes, timeout {}s, threads {})",
            audio.display(),
            input_bytes,
            timeout.as_secs(),
            self.config.threads
        );

        let output = self.runner.run(&spec).await.map_err(|e| match e {
            ProcessError::TimedOut { timeout, .. } => TranscribeError::EngineTimedOut {
                timeout_secs: timeout.as_secs(),
            },
            ProcessError::Spawn { .. } | ProcessError::Wait { .. } => TranscribeError::EngineFailed {
                exit_code: None,
                stderr_excerpt: e.to_string(),
            },
        })?;

        if !output.success() {
            error!("Engine exited with {:?}", output.exit_code);
            return Err(TranscribeError::EngineFailed {
                exit_code: output.exit_code,
                stderr_excerpt: tail_excerpt(&output.stderr, STDERR_EXCERPT_BYTES),
            });
        }

        Ok(EngineInvocation {
            program: spec.program,
            args: spec.args,
            timeout,
            output_base,
            exit_code: output.exit_code,
            stderr: output.stderr,
        })
    }
}

//! Request-scoped transcription pipeline
//!
//! `Idle -> Converting -> Transcribing -> Locating -> Parsing -> Done`, with
//! `Failed` reachable from every stage. Stages run strictly in order, nothing
//! is retried, and the workspace is released on every exit path.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;
use voxrelay_common::{AppConfig, Result, TranscribeError};

use crate::engine::{EngineConfig, EngineInvoker, TimeoutPolicy};
use crate::locator::{DriftTolerantLocator, OutputLocator};
use crate::normalizer::{supported_extension, ConverterConfig, FormatNormalizer, SUPPORTED_EXTENSIONS};
use crate::parser::ResultParser;
use crate::process::ProcessRunner;
use crate::types::Transcript;
use crate::workspace::Workspace;

/// An upload as received from the boundary
#[derive(Debug, Clone)]
pub struct UploadedMedia {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedMedia {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Converting,
    Transcribing,
    Locating,
    Parsing,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Converting => "converting",
            Self::Transcribing => "transcribing",
            Self::Locating => "locating",
            Self::Parsing => "parsing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything the pipeline needs, passed in explicitly
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub workspace_root: PathBuf,
    pub converter: ConverterConfig,
    pub engine: EngineConfig,
    /// Uploads above this size are rejected before any process starts
    pub max_upload_bytes: u64,
}

impl PipelineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            workspace_root: config.workspace_root.clone(),
            converter: ConverterConfig {
                program: config.ffmpeg_path.clone(),
                timeout: Duration::from_secs(config.conversion_timeout_secs),
            },
            engine: EngineConfig {
                program: config.whisper_bin.clone(),
                model_path: config.whisper_model.clone(),
                threads: config.engine_threads,
                language: "auto".to_string(),
                timeout: TimeoutPolicy {
                    secs_per_mb: config.engine_secs_per_mb,
                    min: Duration::from_secs(config.engine_min_timeout_secs),
                    max: Duration::from_secs(config.engine_max_timeout_secs),
                },
            },
            max_upload_bytes: config.max_upload_bytes(),
        }
    }

    /// Reject settings that would fail every request
    pub fn validate(&self) -> Result<()> {
        self.engine.timeout.validate()?;

        if self.converter.timeout.is_zero() {
            return Err(TranscribeError::config("Conversion timeout cannot be 0"));
        }

        if self.engine.threads == 0 {
            return Err(TranscribeError::config("Engine thread count cannot be 0"));
        }

        Ok(())
    }
}

/// Read size used when staging an upload from a reader
const STAGING_CHUNK_BYTES: usize = 64 * 1024;

/// Stage bookkeeping for one request
///
/// On failure `current` becomes [`PipelineStage::Failed`] and the stage that
/// failed is kept in `failed_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTracker {
    current: PipelineStage,
    failed_at: Option<PipelineStage>,
}

impl Default for StageTracker {
    fn default() -> Self {
        Self {
            current: PipelineStage::Idle,
            failed_at: None,
        }
    }
}

impl StageTracker {
    pub fn current(&self) -> PipelineStage {
        self.current
    }

    pub fn failed_at(&self) -> Option<PipelineStage> {
        self.failed_at
    }

    pub fn advance(&mut self, next: PipelineStage) {
        info!("Stage {} -> {}", self.current, next);
        self.current = next;
    }

    /// Enter `Failed`, remembering where, and hand the error back
    pub fn fail(&mut self, err: TranscribeError) -> TranscribeError {
        warn!("Stage {} -> {} ({})", self.current, PipelineStage::Failed, err.kind());
        if self.current != PipelineStage::Failed {
            self.failed_at = Some(self.current);
            self.current = PipelineStage::Failed;
        }
        err
    }
}

/// An upload being written into its workspace
///
/// Created by [`TranscriptionPipeline::begin`]. Chunks are checked against the
/// size limit as they arrive, so an oversized upload is never held in memory.
/// Dropping it without running removes the workspace.
pub struct StagedUpload {
    request_id: Uuid,
    span: Span,
    filename: String,
    extension: String,
    limit: u64,
    written: u64,
    file: tokio::fs::File,
    workspace: Workspace,
}

impl StagedUpload {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Append one chunk, failing once the running total exceeds the limit
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        let size = self.written + chunk.len() as u64;
        if size > self.limit {
            let _enter = self.span.enter();
            warn!("Upload exceeds {} bytes, rejecting", self.limit);
            return Err(TranscribeError::UploadTooLarge {
                size,
                limit: self.limit,
            });
        }
        self.file.write_all(chunk).await?;
        self.written = size;
        Ok(())
    }

    /// Copy `reader` to the end, chunk by chunk
    pub async fn write_from<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<u64> {
        let mut buf = vec![0u8; STAGING_CHUNK_BYTES];
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                return Ok(self.written);
            }
            self.write_chunk(&buf[..n]).await?;
        }
    }

    /// Abandon the upload and remove its workspace
    pub async fn discard(self) {
        let Self { span, file, workspace, .. } = self;
        drop(file);
        release_workspace(workspace).instrument(span).await;
    }
}

/// Composes normalizer, engine, locator and parser for one request at a time
///
/// Holds no mutable state, so a single instance can serve concurrent requests.
pub struct TranscriptionPipeline {
    workspace_root: PathBuf,
    max_upload_bytes: u64,
    normalizer: FormatNormalizer,
    engine: EngineInvoker,
    locator: Arc<dyn OutputLocator>,
    parser: ResultParser,
}

impl TranscriptionPipeline {
    pub fn new(config: PipelineConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            workspace_root: config.workspace_root,
            max_upload_bytes: config.max_upload_bytes,
            normalizer: FormatNormalizer::new(config.converter, runner.clone()),
            engine: EngineInvoker::new(config.engine, runner),
            locator: Arc::new(DriftTolerantLocator),
            parser: ResultParser::default(),
        })
    }

    /// Swap the output discovery heuristic
    pub fn with_locator(mut self, locator: Arc<dyn OutputLocator>) -> Self {
        self.locator = locator;
        self
    }

    pub fn engine_config(&self) -> &EngineConfig {
        self.engine.config()
    }

    /// Reject uploads that must never reach a subordinate process
    ///
    /// Returns the normalized extension.
    pub fn validate(&self, media: &UploadedMedia) -> Result<String> {
        let size = media.bytes.len() as u64;
        if size > self.max_upload_bytes {
            return Err(TranscribeError::UploadTooLarge {
                size,
                limit: self.max_upload_bytes,
            });
        }

        self.validate_filename(&media.filename)
    }

    fn validate_filename(&self, filename: &str) -> Result<String> {
        supported_extension(filename).ok_or_else(|| {
            TranscribeError::validation(format!(
                "unsupported file type '{}', expected one of: {}",
                filename,
                SUPPORTED_EXTENSIONS.join(", ")
            ))
        })
    }

    /// Check the filename and open a workspace to stream the upload into
    pub async fn begin(&self, filename: &str) -> Result<StagedUpload> {
        let request_id = Uuid::new_v4();
        let span = info_span!("transcribe", %request_id, filename = %filename);

        let extension = self.validate_filename(filename)?;
        let workspace = Workspace::acquire(&self.workspace_root)?;
        let input_path = workspace.join(&format!("input.{}", extension));
        let file = tokio::fs::File::create(&input_path).await?;

        span.in_scope(|| info!("Staging upload into {}", workspace.path().display()));

        Ok(StagedUpload {
            request_id,
            span,
            filename: filename.to_string(),
            extension,
            limit: self.max_upload_bytes,
            written: 0,
            file,
            workspace,
        })
    }

    /// Transcribe an in-memory upload
    pub async fn run(&self, media: UploadedMedia) -> Result<Transcript> {
        self.validate(&media)?;

        let mut staged = self.begin(&media.filename).await?;
        if let Err(e) = staged.write_chunk(&media.bytes).await {
            staged.discard().await;
            return Err(e);
        }
        self.run_staged(staged).await
    }

    /// Transcribe a fully staged upload, releasing its workspace afterwards
    pub async fn run_staged(&self, staged: StagedUpload) -> Result<Transcript> {
        let StagedUpload {
            span,
            extension,
            written,
            mut file,
            workspace,
            ..
        } = staged;

        async move {
            let started = Instant::now();
            let mut tracker = StageTracker::default();

            let result = match file.flush().await {
                Ok(()) => {
                    drop(file);
                    info!("Upload staged ({} bytes)", written);
                    self.run_stages(&extension, written, &workspace, &mut tracker)
                        .await
                }
                Err(e) => Err(tracker.fail(e.into())),
            };

            match &result {
                Ok(transcript) => info!(
                    "Transcription done in {:?}: language={}, segments={}, chars={}",
                    started.elapsed(),
                    transcript.language,
                    transcript.segments.len(),
                    transcript.full_text.len()
                ),
                Err(e) => error!(
                    "Transcription failed while {} [{}]: {}",
                    tracker.failed_at().unwrap_or(tracker.current()),
                    e.kind(),
                    e
                ),
            }

            release_workspace(workspace).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        extension: &str,
        input_bytes: u64,
        workspace: &Workspace,
        tracker: &mut StageTracker,
    ) -> Result<Transcript> {
        let input_path = workspace.join(&format!("input.{}", extension));

        tracker.advance(PipelineStage::Converting);
        let audio = self
            .normalizer
            .normalize(&input_path, workspace)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::Transcribing);
        let invocation = self
            .engine
            .invoke(&audio, workspace, input_bytes)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::Locating);
        let locator = Arc::clone(&self.locator);
        let dir = workspace.path().to_path_buf();
        let base = invocation.output_base.clone();
        let artifact = blocking(move || locator.locate(&dir, &base))
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::Parsing);
        let transcript = self
            .parser
            .parse(&artifact)
            .await
            .map_err(|e| tracker.fail(e))?;

        tracker.advance(PipelineStage::Done);
        Ok(transcript)
    }
}

/// Run filesystem work off the async worker threads
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TranscribeError::internal(format!("blocking task failed: {}", e)))?
}

async fn release_workspace(workspace: Workspace) {
    let path = workspace.path().to_path_buf();
    if let Err(e) = blocking(move || workspace.release().map_err(TranscribeError::from)).await {
        warn!("Failed to release workspace {}: {}", path.display(), e);
    }
}

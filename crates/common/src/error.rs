use serde::Serialize;
use std::fmt;

/// Failure kinds surfaced at the request boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailed,
    ConversionFailed,
    ConversionTimedOut,
    EngineFailed,
    EngineTimedOut,
    OutputNotFound,
    OutputUnparseable,
    InternalFault,
}

impl ErrorKind {
    /// Stable snake_case name used in responses and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationFailed => "validation_failed",
            Self::ConversionFailed => "conversion_failed",
            Self::ConversionTimedOut => "conversion_timed_out",
            Self::EngineFailed => "engine_failed",
            Self::EngineTimedOut => "engine_timed_out",
            Self::OutputNotFound => "output_not_found",
            Self::OutputUnparseable => "output_unparseable",
            Self::InternalFault => "internal_fault",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats an optional exit code; `None` means the process died from a signal
fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// voxrelay error types
#[derive(Debug, thiserror::Error)]
pub enum TranscribeError {
    /// Upload rejected before any subordinate process started
    #[error("Invalid upload: {0}")]
    ValidationFailed(String),

    /// Upload exceeds the configured size limit
    #[error("Upload too large: {size} bytes exceeds limit of {limit} bytes")]
    UploadTooLarge { size: u64, limit: u64 },

    /// Converter exited non-zero
    #[error("Audio conversion failed (exit {}): {stderr_excerpt}", exit_label(.exit_code))]
    ConversionFailed {
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },

    /// Converter exited zero without writing its target
    #[error("Audio conversion produced no output at {path}")]
    ConversionOutputMissing { path: String },

    /// Converter exceeded its fixed timeout
    #[error("Audio conversion timed out after {timeout_secs}s")]
    ConversionTimedOut { timeout_secs: u64 },

    /// Engine exited non-zero
    #[error("Recognition engine failed (exit {}): {stderr_excerpt}", exit_label(.exit_code))]
    EngineFailed {
        exit_code: Option<i32>,
        stderr_excerpt: String,
    },

    /// Engine exceeded its size-derived timeout
    #[error("Recognition engine timed out after {timeout_secs}s")]
    EngineTimedOut { timeout_secs: u64 },

    /// Engine succeeded but no output artifact could be found
    #[error("Engine output not found at {expected_path} (present: [{}])", .available_files.join(", "))]
    OutputNotFound {
        expected_path: String,
        available_files: Vec<String>,
    },

    /// Output artifact present but not decodable
    #[error("Engine output unparseable ({reason}): {excerpt}")]
    OutputUnparseable { reason: String, excerpt: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscribeError {
    /// Create validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Boundary failure kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed(_) | Self::UploadTooLarge { .. } => ErrorKind::ValidationFailed,
            Self::ConversionFailed { .. } | Self::ConversionOutputMissing { .. } => {
                ErrorKind::ConversionFailed
            }
            Self::ConversionTimedOut { .. } => ErrorKind::ConversionTimedOut,
            Self::EngineFailed { .. } => ErrorKind::EngineFailed,
            Self::EngineTimedOut { .. } => ErrorKind::EngineTimedOut,
            Self::OutputNotFound { .. } => ErrorKind::OutputNotFound,
            Self::OutputUnparseable { .. } => ErrorKind::OutputUnparseable,
            Self::Config(_) | Self::Internal(_) | Self::Io(_) => ErrorKind::InternalFault,
        }
    }
}

// HTTP response conversion (used by the actix-web boundary)
impl TranscribeError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationFailed(_) => 400,
            Self::UploadTooLarge { .. } => 413,
            Self::ConversionFailed { .. } => 422,
            Self::ConversionOutputMissing { .. } => 422,
            Self::ConversionTimedOut { .. } => 504,
            Self::EngineFailed { .. } => 500,
            Self::EngineTimedOut { .. } => 504,
            Self::OutputNotFound { .. } => 502,
            Self::OutputUnparseable { .. } => 502,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
            Self::Io(_) => 500,
        }
    }
}

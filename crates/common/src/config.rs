use crate::error::TranscribeError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Upper bound for `ENGINE_SECS_PER_MB` (one day per megabyte)
pub const MAX_ENGINE_SECS_PER_MB: u64 = 86_400;

/// voxrelay application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server bind address
    pub server_host: String,

    /// Server port
    pub server_port: u16,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Root under which per-request workspaces are created
    pub workspace_root: PathBuf,

    /// Converter executable (ffmpeg)
    pub ffmpeg_path: String,

    /// Recognition engine executable (whisper.cpp CLI)
    pub whisper_bin: String,

    /// Recognition model file passed to the engine
    pub whisper_model: PathBuf,

    /// Fixed ceiling for audio conversion
    pub conversion_timeout_secs: u64,

    /// Engine time budget per input megabyte
    pub engine_secs_per_mb: u64,

    /// Lower bound of the derived engine timeout
    pub engine_min_timeout_secs: u64,

    /// Upper bound of the derived engine timeout
    pub engine_max_timeout_secs: u64,

    /// Thread hint passed to the engine
    pub engine_threads: u32,

    /// Maximum accepted upload size in megabytes
    pub max_upload_mb: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 8000,
            log_dir: PathBuf::from("./log"),
            log_level: "info".to_string(),
            workspace_root: std::env::temp_dir().join("voxrelay"),
            ffmpeg_path: "ffmpeg".to_string(),
            whisper_bin: "/usr/local/bin/whisper".to_string(),
            whisper_model: PathBuf::from("/app/models/ggml-small.bin"),
            conversion_timeout_secs: 180,
            engine_secs_per_mb: 60,
            engine_min_timeout_secs: 300,
            engine_max_timeout_secs: 7200,
            engine_threads: 4,
            max_upload_mb: 1024,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self, TranscribeError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        let defaults = Self::default();
        let config = Self {
            server_host: std::env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: Self::get_env_parsed("SERVER_PORT").unwrap_or(defaults.server_port),
            log_dir: Self::get_env_path("LOG_DIR").unwrap_or(defaults.log_dir),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            workspace_root: Self::get_env_path("WORKSPACE_ROOT")
                .unwrap_or(defaults.workspace_root),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),
            whisper_bin: std::env::var("WHISPER_BIN").unwrap_or(defaults.whisper_bin),
            whisper_model: Self::get_env_path("WHISPER_MODEL").unwrap_or(defaults.whisper_model),
            conversion_timeout_secs: Self::get_env_parsed("CONVERSION_TIMEOUT_SECS")
                .unwrap_or(defaults.conversion_timeout_secs),
            engine_secs_per_mb: Self::get_env_parsed("ENGINE_SECS_PER_MB")
                .unwrap_or(defaults.engine_secs_per_mb),
            engine_min_timeout_secs: Self::get_env_parsed("ENGINE_MIN_TIMEOUT_SECS")
                .unwrap_or(defaults.engine_min_timeout_secs),
            engine_max_timeout_secs: Self::get_env_parsed("ENGINE_MAX_TIMEOUT_SECS")
                .unwrap_or(defaults.engine_max_timeout_secs),
            engine_threads: Self::get_env_parsed("ENGINE_THREADS")
                .unwrap_or(defaults.engine_threads),
            max_upload_mb: Self::get_env_parsed("MAX_UPLOAD_MB").unwrap_or(defaults.max_upload_mb),
        };

        config.validate()?;

        // Ensure required directories exist
        config.ensure_directories()?;

        Ok(config)
    }

    /// Get PathBuf from environment variable
    fn get_env_path(key: &str) -> Option<PathBuf> {
        std::env::var(key).ok().map(PathBuf::from)
    }

    /// Parse an environment variable, ignoring values that do not parse
    fn get_env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
    }

    /// Ensure required directories exist, create if not
    pub fn ensure_directories(&self) -> Result<(), TranscribeError> {
        for dir in [&self.workspace_root, &self.log_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|e| {
                    TranscribeError::config(format!(
                        "Failed to create directory {}: {}",
                        dir.display(),
                        e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Get server bind address (host:port)
    pub fn server_bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Maximum upload size in bytes
    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), TranscribeError> {
        if self.ffmpeg_path.is_empty() {
            return Err(TranscribeError::config("FFmpeg path cannot be empty"));
        }

        if self.whisper_bin.is_empty() {
            return Err(TranscribeError::config("Whisper binary path cannot be empty"));
        }

        if self.whisper_model.as_os_str().is_empty() {
            return Err(TranscribeError::config("Whisper model path cannot be empty"));
        }

        if self.conversion_timeout_secs == 0 {
            return Err(TranscribeError::config("Conversion timeout cannot be 0"));
        }

        if self.engine_min_timeout_secs == 0
            || self.engine_min_timeout_secs > self.engine_max_timeout_secs
        {
            return Err(TranscribeError::config(format!(
                "Engine timeout bounds are invalid: min={}s max={}s",
                self.engine_min_timeout_secs, self.engine_max_timeout_secs
            )));
        }

        if self.engine_secs_per_mb == 0 || self.engine_secs_per_mb > MAX_ENGINE_SECS_PER_MB {
            return Err(TranscribeError::config(format!(
                "Engine seconds per MB must be between 1 and {}, got {}",
                MAX_ENGINE_SECS_PER_MB, self.engine_secs_per_mb
            )));
        }

        if self.engine_threads == 0 {
            return Err(TranscribeError::config("Engine thread count cannot be 0"));
        }

        // Validate port range
        if self.server_port == 0 {
            return Err(TranscribeError::config("Server port cannot be 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server_port, 8000);
        assert_eq!(config.conversion_timeout_secs, 180);
        assert_eq!(config.engine_secs_per_mb, 60);
        assert_eq!(config.engine_min_timeout_secs, 300);
        assert_eq!(config.engine_max_timeout_secs, 7200);
        assert_eq!(config.engine_threads, 4);
    }

    #[test]
    fn test_server_bind_address() {
        let config = AppConfig::default();
        assert_eq!(config.server_bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_max_upload_bytes() {
        let config = AppConfig {
            max_upload_mb: 2,
            ..AppConfig::default()
        };
        assert_eq!(config.max_upload_bytes(), 2 * 1024 * 1024);
    }

    #[test]
    fn test_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid_config = AppConfig::default();
        invalid_config.whisper_bin = String::new();
        assert!(invalid_config.validate().is_err());

        let mut inverted = AppConfig::default();
        inverted.engine_min_timeout_secs = 8000;
        assert!(inverted.validate().is_err());

        let mut huge_coefficient = AppConfig::default();
        huge_coefficient.engine_secs_per_mb = u64::MAX;
        assert!(huge_coefficient.validate().is_err());

        let mut no_threads = AppConfig::default();
        no_threads.engine_threads = 0;
        assert!(no_threads.validate().is_err());
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig {
            workspace_root: dir.path().join("work"),
            log_dir: dir.path().join("log"),
            ..AppConfig::default()
        };

        config.ensure_directories().unwrap();
        assert!(dir.path().join("work").is_dir());
        assert!(dir.path().join("log").is_dir());
    }
}

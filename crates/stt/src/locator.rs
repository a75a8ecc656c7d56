//! Engine output discovery
//!
//! Engine versions disagree on how the `-of` base is suffixed (some append
//! `.json`, some keep the audio extension too), so the exact path is only the
//! first guess.

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};
use voxrelay_common::{Result, TranscribeError};

/// Extension of the engine's structured output
pub const OUTPUT_EXTENSION: &str = "json";

/// Resolves the artifact an engine run actually produced
pub trait OutputLocator: Send + Sync {
    fn locate(&self, dir: &Path, expected_base: &Path) -> Result<PathBuf>;
}

/// Exact path first, then the newest `<base>*.json` in the directory
#[derive(Debug, Default, Clone, Copy)]
pub struct DriftTolerantLocator;

impl OutputLocator for DriftTolerantLocator {
    fn locate(&self, dir: &Path, expected_base: &Path) -> Result<PathBuf> {
        let expected = with_output_extension(expected_base);
        if expected.is_file() {
            return Ok(expected);
        }

        let base_name = expected_base
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut available = Vec::new();
        let mut best: Option<(SystemTime, PathBuf)> = None;

        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            available.push(name.clone());

            let is_candidate = !base_name.is_empty()
                && name.starts_with(&base_name)
                && path.extension().and_then(|e| e.to_str()) == Some(OUTPUT_EXTENSION)
                && entry.file_type()?.is_file();
            if !is_candidate {
                continue;
            }

            let modified = entry.metadata()?.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            debug!("Output candidate {} (modified {:?})", name, modified);
            let newer = best.as_ref().map_or(true, |(t, _)| modified > *t);
            if newer {
                best = Some((modified, path));
            }
        }

        match best {
            Some((_, path)) => {
                warn!(
                    "Engine output not at {}, using {}",
                    expected.display(),
                    path.display()
                );
                Ok(path)
            }
            None => {
                available.sort();
                Err(TranscribeError::OutputNotFound {
                    expected_path: expected.display().to_string(),
                    available_files: available,
                })
            }
        }
    }
}

fn with_output_extension(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(OUTPUT_EXTENSION);
    PathBuf::from(name)
}

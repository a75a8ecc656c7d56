//! Engine output decoding
//!
//! The JSON layout varies between engine builds. Each field is read through an
//! ordered list of extraction strategies; the first one that yields a value
//! wins.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;
use voxrelay_common::{Result, TranscribeError};

use crate::process::head_excerpt;
use crate::types::{Segment, Transcript, UNKNOWN_LANGUAGE};

/// Keys that may hold the segment list, in preference order
pub const SEGMENT_KEYS: &[&str] = &["segments", "transcription"];

/// Default bound on raw content quoted in errors
pub const DEFAULT_EXCERPT_BYTES: usize = 512;

type LanguageStrategy = fn(&Map<String, Value>) -> Option<String>;
type TimingStrategy = fn(&Map<String, Value>) -> Option<(Option<f32>, Option<f32>)>;

const LANGUAGE_STRATEGIES: &[LanguageStrategy] = &[
    language_as_string,
    language_as_object,
    language_in_result,
];

const TIMING_STRATEGIES: &[TimingStrategy] = &[timing_in_seconds, timing_from_offsets];

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `"language": "en"`
fn language_as_string(root: &Map<String, Value>) -> Option<String> {
    non_empty(root.get("language")?)
}

/// `"language": {"language": "en"}`
fn language_as_object(root: &Map<String, Value>) -> Option<String> {
    non_empty(root.get("language")?.as_object()?.get("language")?)
}

/// whisper.cpp: `"result": {"language": "en"}`
fn language_in_result(root: &Map<String, Value>) -> Option<String> {
    non_empty(root.get("result")?.as_object()?.get("language")?)
}

/// `"start": 0.0, "end": 1.5` in seconds
fn timing_in_seconds(segment: &Map<String, Value>) -> Option<(Option<f32>, Option<f32>)> {
    let start = segment.get("start").and_then(Value::as_f64);
    let end = segment.get("end").and_then(Value::as_f64);
    if start.is_none() && end.is_none() {
        return None;
    }
    Some((start.map(|v| v as f32), end.map(|v| v as f32)))
}

/// whisper.cpp: `"offsets": {"from": 0, "to": 1500}` in milliseconds
fn timing_from_offsets(segment: &Map<String, Value>) -> Option<(Option<f32>, Option<f32>)> {
    let offsets = segment.get("offsets")?.as_object()?;
    let from = offsets.get("from").and_then(Value::as_f64);
    let to = offsets.get("to").and_then(Value::as_f64);
    if from.is_none() && to.is_none() {
        return None;
    }
    let secs = |ms: f64| (ms / 1000.0) as f32;
    Some((from.map(secs), to.map(secs)))
}

/// Decodes engine JSON into a [`Transcript`]
#[derive(Debug, Clone, Copy)]
pub struct ResultParser {
    excerpt_bytes: usize,
}

impl Default for ResultParser {
    fn default() -> Self {
        Self {
            excerpt_bytes: DEFAULT_EXCERPT_BYTES,
        }
    }
}

impl ResultParser {
    pub fn new(excerpt_bytes: usize) -> Self {
        Self { excerpt_bytes }
    }

    /// Read and decode the artifact at `path`
    pub async fn parse(&self, path: &Path) -> Result<Transcript> {
        let bytes = tokio::fs::read(path).await?;
        debug!("Parsing engine output {} ({} bytes)", path.display(), bytes.len());
        self.parse_bytes(&bytes)
    }

    /// Decode raw artifact bytes
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Transcript> {
        // Engines can split a multi-byte character across tokens
        self.parse_str(&String::from_utf8_lossy(bytes))
    }

    /// Decode engine JSON text
    pub fn parse_str(&self, raw: &str) -> Result<Transcript> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| self.unparseable(e.to_string(), raw))?;

        let root = value
            .as_object()
            .ok_or_else(|| self.unparseable("top level is not an object", raw))?;

        let items = SEGMENT_KEYS
            .iter()
            .find_map(|key| root.get(*key).and_then(Value::as_array))
            .ok_or_else(|| {
                self.unparseable(
                    format!("no segment list under any of {:?}", SEGMENT_KEYS),
                    raw,
                )
            })?;

        let segments = items
            .iter()
            .enumerate()
            .map(|(index, item)| self.segment(index, item, raw))
            .collect::<Result<Vec<_>>>()?;

        let language = LANGUAGE_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(root))
            .unwrap_or_else(|| UNKNOWN_LANGUAGE.to_string());

        let transcript = Transcript::from_segments(language, segments);
        if transcript.full_text.is_empty() {
            return Err(self.unparseable("engine output contains no speech segments", raw));
        }

        Ok(transcript)
    }

    fn segment(&self, index: usize, item: &Value, raw: &str) -> Result<Segment> {
        let fields = item
            .as_object()
            .ok_or_else(|| self.unparseable(format!("segment {} is not an object", index), raw))?;

        let text = fields
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| self.unparseable(format!("segment {} has no text", index), raw))?;

        let (start, end) = TIMING_STRATEGIES
            .iter()
            .find_map(|strategy| strategy(fields))
            .unwrap_or((None, None));

        Ok(Segment::new(text.trim(), start, end))
    }

    fn unparseable(&self, reason: impl Into<String>, raw: &str) -> TranscribeError {
        TranscribeError::OutputUnparseable {
            reason: reason.into(),
            excerpt: head_excerpt(raw, self.excerpt_bytes),
        }
    }
}

use serde::{Deserialize, Serialize};

/// Language reported when the engine emits none
pub const UNKNOWN_LANGUAGE: &str = "unknown";

/// Single transcription segment with optional timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Transcribed text
    pub text: String,

    /// Start time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<f32>,

    /// End time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<f32>,
}

impl Segment {
    /// Create a new segment
    pub fn new(text: impl Into<String>, start: Option<f32>, end: Option<f32>) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }

    /// Get duration in seconds, when both bounds are known
    pub fn duration(&self) -> Option<f32> {
        Some(self.end? - self.start?)
    }

    /// Format timestamp as HH:MM:SS
    pub fn format_timestamp(seconds: f32) -> String {
        let seconds = seconds as u32;
        let h = seconds / 3600;
        let m = (seconds % 3600) / 60;
        let s = seconds % 60;
        format!("{:02}:{:02}:{:02}", h, m, s)
    }

    /// Get formatted time range string
    pub fn time_range(&self) -> Option<String> {
        Some(format!(
            "{} - {}",
            Self::format_timestamp(self.start?),
            Self::format_timestamp(self.end?)
        ))
    }
}

/// Complete transcription result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    /// Detected language, or "unknown"
    pub language: String,

    /// Segment texts joined with single spaces
    pub full_text: String,

    /// Segments in engine emission order
    pub segments: Vec<Segment>,
}

impl Transcript {
    /// Build a transcript, deriving `full_text` from the segments
    ///
    /// Each segment's text is trimmed; blank segments add nothing to the join.
    pub fn from_segments(language: impl Into<String>, segments: Vec<Segment>) -> Self {
        let full_text = segments
            .iter()
            .map(|s| s.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            language: language.into(),
            full_text,
            segments,
        }
    }

    /// Get total duration
    pub fn duration(&self) -> f32 {
        self.segments
            .iter()
            .rev()
            .find_map(|seg| seg.end)
            .unwrap_or(0.0)
    }

    /// Export to markdown format
    pub fn to_markdown(&self, title: &str) -> String {
        let mut md = format!("# {}\n\n", title);
        md.push_str(&format!("Language: {}\n\n", self.language));

        let timed = self.segments.iter().all(|s| s.time_range().is_some());
        if self.segments.is_empty() || !timed {
            md.push_str(&self.full_text);
            md.push('\n');
        } else {
            for segment in &self.segments {
                if let Some(range) = segment.time_range() {
                    md.push_str(&format!("[{}] {}\n", range, segment.text.trim()));
                }
            }
        }

        md
    }
}

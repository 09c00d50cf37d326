use serde::{Deserialize, Serialize};

/// A contiguous span of decoded text as emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in engine ticks (10ms).
    pub start: i64,
    /// End time in engine ticks (10ms).
    pub end: i64,
    pub text: String,
    /// Rendered speaker label, when diarization was requested on stereo input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

impl TranscriptSegment {
    pub fn new(start: i64, end: i64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            speaker: None,
        }
    }

    /// Start time in seconds.
    pub fn start_secs(&self) -> f64 {
        self.start as f64 / 100.0
    }

    /// End time in seconds.
    pub fn end_secs(&self) -> f64 {
        self.end as f64 / 100.0
    }

    fn display_text(&self) -> String {
        let text = self.text.trim();
        match &self.speaker {
            Some(speaker) => format!("{} {}", speaker, text),
            None => text.to_string(),
        }
    }
}

/// Result of a transcription request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Segment texts joined by a single space.
    pub text: String,
    /// Language the request was decoded with.
    pub language: String,
    /// Segments in engine emission order.
    pub segments: Vec<TranscriptSegment>,
    /// Non-fatal notes raised while building the decoding configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Wall-clock processing time in milliseconds.
    pub duration_ms: u64,
}

impl Transcript {
    /// Reduce ordered segments into a transcript.
    pub fn from_segments(
        segments: Vec<TranscriptSegment>,
        language: String,
        warnings: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        let text = segments
            .iter()
            .map(TranscriptSegment::display_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Self {
            text,
            language,
            segments,
            warnings,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_joined_with_single_space() {
        let transcript = Transcript::from_segments(
            vec![
                TranscriptSegment::new(0, 150, " Hello there."),
                TranscriptSegment::new(150, 300, " General Kenobi."),
            ],
            "en".to_string(),
            Vec::new(),
            12,
        );

        assert_eq!(transcript.text, "Hello there. General Kenobi.");
        assert_eq!(transcript.segments.len(), 2);
    }

    #[test]
    fn test_speaker_prefix_and_empty_segments() {
        let mut first = TranscriptSegment::new(0, 100, " yes");
        first.speaker = Some("(speaker 0)".to_string());
        let transcript = Transcript::from_segments(
            vec![first, TranscriptSegment::new(100, 120, "  ")],
            "en".to_string(),
            Vec::new(),
            0,
        );

        assert_eq!(transcript.text, "(speaker 0) yes");
    }

    #[test]
    fn test_segment_seconds() {
        let segment = TranscriptSegment::new(150, 275, "x");
        assert!((segment.start_secs() - 1.5).abs() < f64::EPSILON);
        assert!((segment.end_secs() - 2.75).abs() < f64::EPSILON);
    }
}
